//! Instruction builders for Kamino Lend.

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::{AccountMeta, Instruction};
use anchor_lang::{InstructionData, ToAccountMetas};
use klend_core::obligation_order::ObligationOrderAtIndex;

use crate::klend::accounts::Reserve;
use crate::klend::client::args::{self, FarmMode};
use crate::klend::{self, account_builders};
use crate::obligation_type::ObligationType;

fn build(
  accounts: &impl ToAccountMetas,
  args: &impl InstructionData,
) -> Instruction {
  Instruction {
    program_id: klend::ID,
    accounts: accounts.to_account_metas(None),
    data: args.data(),
  }
}

#[must_use]
pub fn refresh_reserve(
  reserve_address: Pubkey,
  reserve: &Reserve,
) -> Instruction {
  let accounts = account_builders::refresh_reserve(reserve_address, reserve);
  build(&accounts, &args::RefreshReserve {})
}

/// Refreshes an obligation. `reserves` must list every deposit reserve, then
/// every borrow reserve, in the obligation's slot order.
#[must_use]
pub fn refresh_obligation(
  lending_market: Pubkey,
  obligation: Pubkey,
  reserves: &[Pubkey],
) -> Instruction {
  let accounts =
    account_builders::refresh_obligation(lending_market, obligation);
  let mut instruction = build(&accounts, &args::RefreshObligation {});
  instruction.accounts.extend(
    reserves
      .iter()
      .map(|reserve| AccountMeta::new_readonly(*reserve, false)),
  );
  instruction
}

/// Refreshes the obligation's stake in one of the reserve's farms; `None`
/// when the reserve has no such farm.
#[must_use]
pub fn refresh_obligation_farms(
  crank: Pubkey,
  obligation: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  mode: FarmMode,
) -> Option<Instruction> {
  let accounts = account_builders::refresh_obligation_farms(
    crank,
    obligation,
    reserve_address,
    reserve,
    mode,
  )?;
  let args = args::RefreshObligationFarmsForReserve { mode: mode.as_u8() };
  Some(build(&accounts, &args))
}

#[must_use]
pub fn init_obligation_farms(
  payer: Pubkey,
  owner: Pubkey,
  obligation: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  mode: FarmMode,
) -> Option<Instruction> {
  let accounts = account_builders::init_obligation_farms(
    payer,
    owner,
    obligation,
    reserve_address,
    reserve,
    mode,
  )?;
  let args = args::InitObligationFarmsForReserve { mode: mode.as_u8() };
  Some(build(&accounts, &args))
}

#[must_use]
pub fn init_user_metadata(
  owner: Pubkey,
  fee_payer: Pubkey,
  user_lookup_table: Pubkey,
  referrer: Option<Pubkey>,
) -> Instruction {
  let accounts =
    account_builders::init_user_metadata(owner, fee_payer, referrer);
  build(&accounts, &args::InitUserMetadata { user_lookup_table })
}

#[must_use]
pub fn init_obligation(
  owner: Pubkey,
  fee_payer: Pubkey,
  lending_market: Pubkey,
  obligation_type: &ObligationType,
) -> Instruction {
  let accounts = account_builders::init_obligation(
    owner,
    fee_payer,
    lending_market,
    obligation_type,
  );
  let args = args::InitObligation {
    args: obligation_type.to_args(),
  };
  build(&accounts, &args)
}

/// Writes (or clears) one of the obligation's two order slots.
pub fn set_obligation_order(
  owner: Pubkey,
  obligation: Pubkey,
  lending_market: Pubkey,
  order: &ObligationOrderAtIndex,
) -> klend_core::error::Result<Instruction> {
  let accounts =
    account_builders::set_obligation_order(owner, obligation, lending_market);
  let args = args::SetObligationOrder {
    index: order.index,
    order: order.order_state()?,
  };
  Ok(build(&accounts, &args))
}

#[must_use]
pub fn deposit(
  owner: Pubkey,
  obligation: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  liquidity_amount: u64,
) -> Instruction {
  let accounts =
    account_builders::deposit(owner, obligation, reserve_address, reserve);
  let args =
    args::DepositReserveLiquidityAndObligationCollateral { liquidity_amount };
  build(&accounts, &args)
}

#[must_use]
pub fn borrow(
  owner: Pubkey,
  obligation: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  referrer: Option<Pubkey>,
  liquidity_amount: u64,
) -> Instruction {
  let accounts = account_builders::borrow(
    owner,
    obligation,
    reserve_address,
    reserve,
    referrer,
  );
  build(&accounts, &args::BorrowObligationLiquidity { liquidity_amount })
}

#[must_use]
pub fn repay(
  owner: Pubkey,
  obligation: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  liquidity_amount: u64,
) -> Instruction {
  let accounts =
    account_builders::repay(owner, obligation, reserve_address, reserve);
  build(&accounts, &args::RepayObligationLiquidity { liquidity_amount })
}

/// Withdraws `collateral_amount` collateral tokens and redeems them for
/// liquidity in one step.
#[must_use]
pub fn withdraw(
  owner: Pubkey,
  obligation: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  collateral_amount: u64,
) -> Instruction {
  let accounts =
    account_builders::withdraw(owner, obligation, reserve_address, reserve);
  let args = args::WithdrawObligationCollateralAndRedeemReserveCollateral {
    collateral_amount,
  };
  build(&accounts, &args)
}

#[must_use]
pub fn flash_borrow(
  user: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  referrer: Option<Pubkey>,
  liquidity_amount: u64,
) -> Instruction {
  let accounts =
    account_builders::flash_borrow(user, reserve_address, reserve, referrer);
  build(&accounts, &args::FlashBorrowReserveLiquidity { liquidity_amount })
}

/// Repays a flash loan. `borrow_instruction_index` is the absolute position
/// of the matching flash borrow in the transaction.
#[must_use]
pub fn flash_repay(
  user: Pubkey,
  reserve_address: Pubkey,
  reserve: &Reserve,
  referrer: Option<Pubkey>,
  liquidity_amount: u64,
  borrow_instruction_index: u8,
) -> Instruction {
  let accounts =
    account_builders::flash_repay(user, reserve_address, reserve, referrer);
  let args = args::FlashRepayReserveLiquidity {
    liquidity_amount,
    borrow_instruction_index,
  };
  build(&accounts, &args)
}

#[cfg(test)]
mod tests {
  use super::*;

  use anchor_lang::{AccountDeserialize, Discriminator};
  use anyhow::Result;

  use crate::{ata, pda};

  fn reserve_with_farm() -> Result<(Pubkey, Reserve)> {
    let mut bytes = vec![0; 8624];
    bytes[..8].copy_from_slice(Reserve::DISCRIMINATOR);
    let mut reserve = Reserve::try_deserialize(&mut bytes.as_slice())?;
    reserve.lending_market = Pubkey::new_unique();
    reserve.farm_debt = Pubkey::new_unique();
    reserve.liquidity.mint_pubkey = Pubkey::new_unique();
    reserve.liquidity.token_program = anchor_spl::token::ID;
    reserve.liquidity.supply_vault = Pubkey::new_unique();
    reserve.liquidity.fee_vault = Pubkey::new_unique();
    Ok((Pubkey::new_unique(), reserve))
  }

  #[test]
  fn refresh_obligation_appends_reserves() -> Result<()> {
    let market = Pubkey::new_unique();
    let obligation = Pubkey::new_unique();
    let reserves = [Pubkey::new_unique(), Pubkey::new_unique()];
    let ix = refresh_obligation(market, obligation, &reserves);
    assert_eq!(ix.accounts.len(), 4);
    assert!(ix.accounts[1].is_writable);
    assert_eq!(ix.accounts[2].pubkey, reserves[0]);
    assert_eq!(ix.accounts[3].pubkey, reserves[1]);
    assert!(!ix.accounts[3].is_writable);
    Ok(())
  }

  #[test]
  fn farm_refresh_only_for_existing_farm() -> Result<()> {
    let (address, reserve) = reserve_with_farm()?;
    let owner = Pubkey::new_unique();
    let obligation = Pubkey::new_unique();
    assert!(refresh_obligation_farms(
      owner,
      obligation,
      address,
      &reserve,
      FarmMode::Collateral
    )
    .is_none());
    let ix = refresh_obligation_farms(
      owner,
      obligation,
      address,
      &reserve,
      FarmMode::Debt,
    )
    .ok_or_else(|| anyhow::anyhow!("debt farm expected"))?;
    assert_eq!(ix.data[8], 1);
    assert_eq!(
      ix.accounts[5].pubkey,
      pda::obligation_farm_state(reserve.farm_debt, obligation)
    );
    Ok(())
  }

  #[test]
  fn flash_loan_without_referrer_uses_placeholders() -> Result<()> {
    let (address, reserve) = reserve_with_farm()?;
    let user = Pubkey::new_unique();
    let ix = flash_repay(user, address, &reserve, None, 1_000, 2);
    assert_eq!(ix.accounts.len(), 12);
    assert_eq!(ix.accounts[8].pubkey, klend::ID);
    assert!(!ix.accounts[8].is_writable);
    assert_eq!(
      ix.accounts[6].pubkey,
      ata!(user, reserve.mint(), anchor_spl::token::ID)
    );
    assert_eq!(
      &ix.data[..8],
      args::FlashRepayReserveLiquidity::DISCRIMINATOR
    );
    assert_eq!(ix.data[16], 2);
    Ok(())
  }

  #[test]
  fn borrow_with_referrer_is_writable() -> Result<()> {
    let (address, reserve) = reserve_with_farm()?;
    let referrer = Pubkey::new_unique();
    let ix = borrow(
      Pubkey::new_unique(),
      Pubkey::new_unique(),
      address,
      &reserve,
      Some(referrer),
      5,
    );
    assert_eq!(
      ix.accounts[9].pubkey,
      pda::referrer_token_state(referrer, address)
    );
    assert!(ix.accounts[9].is_writable);
    assert!(ix.accounts[0].is_signer);
    Ok(())
  }
}
