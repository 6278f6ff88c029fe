use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::sysvar;
use anchor_lang::system_program;
use anchor_spl::token;

use crate::klend::accounts::Reserve;
use crate::klend::client::accounts::{
  BorrowObligationLiquidity, DepositReserveLiquidityAndObligationCollateral,
  FlashBorrowReserveLiquidity, FlashRepayReserveLiquidity, InitObligation,
  InitObligationFarmsForReserve, InitUserMetadata, RefreshObligation,
  RefreshObligationFarmsForReserve, RefreshReserve, RepayObligationLiquidity,
  SetObligationOrder, WithdrawObligationCollateralAndRedeemReserveCollateral,
};
use crate::klend::client::args::FarmMode;
use crate::obligation_type::ObligationType;
use crate::{ata, farms, pda};

/// Builds account context for a reserve price refresh.
#[must_use]
pub fn refresh_reserve(
  reserve_address: Pubkey,
  reserve: &Reserve,
) -> RefreshReserve {
  RefreshReserve {
    reserve: reserve_address,
    lending_market: reserve.lending_market,
    pyth_oracle: reserve.pyth_oracle(),
    switchboard_price_oracle: reserve.switchboard_price_oracle(),
    switchboard_twap_oracle: reserve.switchboard_twap_oracle(),
    scope_prices: reserve.scope_prices(),
  }
}

#[must_use]
pub fn refresh_obligation(
  lending_market: Pubkey,
  obligation: Pubkey,
) -> RefreshObligation {
  RefreshObligation {
    lending_market,
    obligation,
  }
}

/// Farm selected by `mode`, if the reserve has one.
#[must_use]
pub fn reserve_farm(reserve: &Reserve, mode: FarmMode) -> Option<Pubkey> {
  match mode {
    FarmMode::Collateral => reserve.collateral_farm(),
    FarmMode::Debt => reserve.debt_farm(),
  }
}

/// Builds account context for an obligation farm refresh, or `None` when the
/// reserve has no farm of the given kind.
#[must_use]
pub fn refresh_obligation_farms(
  crank: Pubkey,
  obligation: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  mode: FarmMode,
) -> Option<RefreshObligationFarmsForReserve> {
  let farm = reserve_farm(reserve, mode)?;
  Some(RefreshObligationFarmsForReserve {
    crank,
    obligation,
    lending_market_authority: pda::lending_market_auth(reserve.lending_market),
    reserve: reserve_address,
    reserve_farm_state: farm,
    obligation_farm_user_state: pda::obligation_farm_state(farm, obligation),
    lending_market: reserve.lending_market,
    farms_program: farms::ID,
    rent: sysvar::rent::ID,
    system_program: system_program::ID,
  })
}

#[must_use]
pub fn init_obligation_farms(
  payer: Pubkey,
  owner: Pubkey,
  obligation: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  mode: FarmMode,
) -> Option<InitObligationFarmsForReserve> {
  let farm = reserve_farm(reserve, mode)?;
  Some(InitObligationFarmsForReserve {
    payer,
    owner,
    obligation,
    lending_market_authority: pda::lending_market_auth(reserve.lending_market),
    reserve: reserve_address,
    reserve_farm_state: farm,
    obligation_farm: pda::obligation_farm_state(farm, obligation),
    lending_market: reserve.lending_market,
    farms_program: farms::ID,
    rent: sysvar::rent::ID,
    system_program: system_program::ID,
  })
}

#[must_use]
pub fn init_user_metadata(
  owner: Pubkey,
  fee_payer: Pubkey,
  referrer: Option<Pubkey>,
) -> InitUserMetadata {
  InitUserMetadata {
    owner,
    fee_payer,
    user_metadata: pda::user_metadata(owner),
    referrer_user_metadata: referrer.map(pda::user_metadata),
    rent: sysvar::rent::ID,
    system_program: system_program::ID,
  }
}

#[must_use]
pub fn init_obligation(
  owner: Pubkey,
  fee_payer: Pubkey,
  lending_market: Pubkey,
  obligation_type: &ObligationType,
) -> InitObligation {
  let (seed1_account, seed2_account) = obligation_type.seeds();
  InitObligation {
    obligation_owner: owner,
    fee_payer,
    obligation: obligation_type.to_pda(lending_market, owner),
    lending_market,
    seed1_account,
    seed2_account,
    owner_user_metadata: pda::user_metadata(owner),
    rent: sysvar::rent::ID,
    system_program: system_program::ID,
  }
}

#[must_use]
pub fn set_obligation_order(
  owner: Pubkey,
  obligation: Pubkey,
  lending_market: Pubkey,
) -> SetObligationOrder {
  SetObligationOrder {
    owner,
    obligation,
    lending_market,
  }
}

/// Builds account context for depositing liquidity as obligation collateral.
#[must_use]
pub fn deposit(
  owner: Pubkey,
  obligation: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
) -> DepositReserveLiquidityAndObligationCollateral {
  DepositReserveLiquidityAndObligationCollateral {
    owner,
    obligation,
    lending_market: reserve.lending_market,
    lending_market_authority: pda::lending_market_auth(reserve.lending_market),
    reserve: reserve_address,
    reserve_liquidity_mint: reserve.mint(),
    reserve_liquidity_supply: reserve.liquidity.supply_vault,
    reserve_collateral_mint: reserve.collateral.mint_pubkey,
    reserve_destination_deposit_collateral: reserve.collateral.supply_vault,
    user_source_liquidity: ata!(owner, reserve.mint(), reserve.token_program()),
    placeholder_user_destination_collateral: None,
    collateral_token_program: token::ID,
    liquidity_token_program: reserve.token_program(),
    instruction_sysvar_account: sysvar::instructions::ID,
  }
}

/// Builds account context for borrowing against the obligation. A referrer
/// receives its share of the origination fee through its token state.
#[must_use]
pub fn borrow(
  owner: Pubkey,
  obligation: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  referrer: Option<Pubkey>,
) -> BorrowObligationLiquidity {
  BorrowObligationLiquidity {
    owner,
    obligation,
    lending_market: reserve.lending_market,
    lending_market_authority: pda::lending_market_auth(reserve.lending_market),
    borrow_reserve: reserve_address,
    borrow_reserve_liquidity_mint: reserve.mint(),
    reserve_source_liquidity: reserve.liquidity.supply_vault,
    borrow_reserve_liquidity_fee_receiver: reserve.liquidity.fee_vault,
    user_destination_liquidity: ata!(
      owner,
      reserve.mint(),
      reserve.token_program()
    ),
    referrer_token_state: referrer
      .map(|referrer| pda::referrer_token_state(referrer, reserve_address)),
    token_program: reserve.token_program(),
    instruction_sysvar_account: sysvar::instructions::ID,
  }
}

#[must_use]
pub fn repay(
  owner: Pubkey,
  obligation: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
) -> RepayObligationLiquidity {
  RepayObligationLiquidity {
    owner,
    obligation,
    lending_market: reserve.lending_market,
    repay_reserve: reserve_address,
    reserve_liquidity_mint: reserve.mint(),
    reserve_destination_liquidity: reserve.liquidity.supply_vault,
    user_source_liquidity: ata!(owner, reserve.mint(), reserve.token_program()),
    token_program: reserve.token_program(),
    instruction_sysvar_account: sysvar::instructions::ID,
  }
}

#[must_use]
pub fn withdraw(
  owner: Pubkey,
  obligation: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
) -> WithdrawObligationCollateralAndRedeemReserveCollateral {
  WithdrawObligationCollateralAndRedeemReserveCollateral {
    owner,
    obligation,
    lending_market: reserve.lending_market,
    lending_market_authority: pda::lending_market_auth(reserve.lending_market),
    withdraw_reserve: reserve_address,
    reserve_liquidity_mint: reserve.mint(),
    reserve_source_collateral: reserve.collateral.supply_vault,
    reserve_collateral_mint: reserve.collateral.mint_pubkey,
    reserve_liquidity_supply: reserve.liquidity.supply_vault,
    user_destination_liquidity: ata!(
      owner,
      reserve.mint(),
      reserve.token_program()
    ),
    placeholder_user_destination_collateral: None,
    collateral_token_program: token::ID,
    liquidity_token_program: reserve.token_program(),
    instruction_sysvar_account: sysvar::instructions::ID,
  }
}

fn referrer_accounts(
  reserve_address: Pubkey,
  referrer: Option<Pubkey>,
) -> (Option<Pubkey>, Option<Pubkey>) {
  referrer.map_or((None, None), |referrer| {
    (
      Some(pda::referrer_token_state(referrer, reserve_address)),
      Some(pda::user_metadata(referrer)),
    )
  })
}

#[must_use]
pub fn flash_borrow(
  user: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  referrer: Option<Pubkey>,
) -> FlashBorrowReserveLiquidity {
  let (referrer_token_state, referrer_account) =
    referrer_accounts(reserve_address, referrer);
  FlashBorrowReserveLiquidity {
    user_transfer_authority: user,
    lending_market_authority: pda::lending_market_auth(reserve.lending_market),
    lending_market: reserve.lending_market,
    reserve: reserve_address,
    reserve_liquidity_mint: reserve.mint(),
    reserve_source_liquidity: reserve.liquidity.supply_vault,
    user_destination_liquidity: ata!(
      user,
      reserve.mint(),
      reserve.token_program()
    ),
    reserve_liquidity_fee_receiver: reserve.liquidity.fee_vault,
    referrer_token_state,
    referrer_account,
    sysvar_info: sysvar::instructions::ID,
    token_program: reserve.token_program(),
  }
}

#[must_use]
pub fn flash_repay(
  user: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  referrer: Option<Pubkey>,
) -> FlashRepayReserveLiquidity {
  let (referrer_token_state, referrer_account) =
    referrer_accounts(reserve_address, referrer);
  FlashRepayReserveLiquidity {
    user_transfer_authority: user,
    lending_market_authority: pda::lending_market_auth(reserve.lending_market),
    lending_market: reserve.lending_market,
    reserve: reserve_address,
    reserve_liquidity_mint: reserve.mint(),
    reserve_destination_liquidity: reserve.liquidity.supply_vault,
    user_source_liquidity: ata!(user, reserve.mint(), reserve.token_program()),
    reserve_liquidity_fee_receiver: reserve.liquidity.fee_vault,
    referrer_token_state,
    referrer_account,
    sysvar_info: sysvar::instructions::ID,
    token_program: reserve.token_program(),
  }
}
