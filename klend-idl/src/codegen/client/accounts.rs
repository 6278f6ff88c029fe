use anchor_lang::prelude::{AccountMeta, Pubkey};
use anchor_lang::ToAccountMetas;

use crate::klend;

macro_rules! field_type {
  (opt) => { Option<Pubkey> };
  (opt_mut) => { Option<Pubkey> };
  ($kind:ident) => { Pubkey };
}

/// Absent optional accounts are passed as the program id, read-only.
macro_rules! account_meta {
  (ro, $key:expr) => {
    AccountMeta::new_readonly($key, false)
  };
  (mut, $key:expr) => {
    AccountMeta::new($key, false)
  };
  (signer, $key:expr) => {
    AccountMeta::new_readonly($key, true)
  };
  (signer_mut, $key:expr) => {
    AccountMeta::new($key, true)
  };
  (opt, $key:expr) => {
    AccountMeta::new_readonly($key.unwrap_or(klend::ID), false)
  };
  (opt_mut, $key:expr) => {
    match $key {
      Some(key) => AccountMeta::new(key, false),
      None => AccountMeta::new_readonly(klend::ID, false),
    }
  };
}

macro_rules! instruction_accounts {
  ($name:ident { $($field:ident: $kind:tt),* $(,)? }) => {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct $name {
      $(pub $field: field_type!($kind)),*
    }

    impl ToAccountMetas for $name {
      fn to_account_metas(&self, _is_signer: Option<bool>) -> Vec<AccountMeta> {
        vec![$(account_meta!($kind, self.$field)),*]
      }
    }
  };
}

instruction_accounts!(RefreshReserve {
  reserve: mut,
  lending_market: ro,
  pyth_oracle: opt,
  switchboard_price_oracle: opt,
  switchboard_twap_oracle: opt,
  scope_prices: opt,
});

instruction_accounts!(RefreshObligation {
  lending_market: ro,
  obligation: mut,
});

instruction_accounts!(RefreshObligationFarmsForReserve {
  crank: signer,
  obligation: ro,
  lending_market_authority: ro,
  reserve: ro,
  reserve_farm_state: mut,
  obligation_farm_user_state: mut,
  lending_market: ro,
  farms_program: ro,
  rent: ro,
  system_program: ro,
});

instruction_accounts!(InitObligationFarmsForReserve {
  payer: signer_mut,
  owner: ro,
  obligation: mut,
  lending_market_authority: ro,
  reserve: mut,
  reserve_farm_state: mut,
  obligation_farm: mut,
  lending_market: ro,
  farms_program: ro,
  rent: ro,
  system_program: ro,
});

instruction_accounts!(InitUserMetadata {
  owner: signer,
  fee_payer: signer_mut,
  user_metadata: mut,
  referrer_user_metadata: opt,
  rent: ro,
  system_program: ro,
});

instruction_accounts!(InitObligation {
  obligation_owner: signer,
  fee_payer: signer_mut,
  obligation: mut,
  lending_market: ro,
  seed1_account: ro,
  seed2_account: ro,
  owner_user_metadata: ro,
  rent: ro,
  system_program: ro,
});

instruction_accounts!(SetObligationOrder {
  owner: signer,
  obligation: mut,
  lending_market: ro,
});

instruction_accounts!(DepositReserveLiquidityAndObligationCollateral {
  owner: signer_mut,
  obligation: mut,
  lending_market: ro,
  lending_market_authority: ro,
  reserve: mut,
  reserve_liquidity_mint: ro,
  reserve_liquidity_supply: mut,
  reserve_collateral_mint: mut,
  reserve_destination_deposit_collateral: mut,
  user_source_liquidity: mut,
  placeholder_user_destination_collateral: opt,
  collateral_token_program: ro,
  liquidity_token_program: ro,
  instruction_sysvar_account: ro,
});

instruction_accounts!(BorrowObligationLiquidity {
  owner: signer,
  obligation: mut,
  lending_market: ro,
  lending_market_authority: ro,
  borrow_reserve: mut,
  borrow_reserve_liquidity_mint: ro,
  reserve_source_liquidity: mut,
  borrow_reserve_liquidity_fee_receiver: mut,
  user_destination_liquidity: mut,
  referrer_token_state: opt_mut,
  token_program: ro,
  instruction_sysvar_account: ro,
});

instruction_accounts!(RepayObligationLiquidity {
  owner: signer,
  obligation: mut,
  lending_market: ro,
  repay_reserve: mut,
  reserve_liquidity_mint: ro,
  reserve_destination_liquidity: mut,
  user_source_liquidity: mut,
  token_program: ro,
  instruction_sysvar_account: ro,
});

instruction_accounts!(WithdrawObligationCollateralAndRedeemReserveCollateral {
  owner: signer_mut,
  obligation: mut,
  lending_market: ro,
  lending_market_authority: ro,
  withdraw_reserve: mut,
  reserve_liquidity_mint: ro,
  reserve_source_collateral: mut,
  reserve_collateral_mint: mut,
  reserve_liquidity_supply: mut,
  user_destination_liquidity: mut,
  placeholder_user_destination_collateral: opt,
  collateral_token_program: ro,
  liquidity_token_program: ro,
  instruction_sysvar_account: ro,
});

instruction_accounts!(FlashBorrowReserveLiquidity {
  user_transfer_authority: signer,
  lending_market_authority: ro,
  lending_market: ro,
  reserve: mut,
  reserve_liquidity_mint: ro,
  reserve_source_liquidity: mut,
  user_destination_liquidity: mut,
  reserve_liquidity_fee_receiver: mut,
  referrer_token_state: opt_mut,
  referrer_account: opt_mut,
  sysvar_info: ro,
  token_program: ro,
});

instruction_accounts!(FlashRepayReserveLiquidity {
  user_transfer_authority: signer,
  lending_market_authority: ro,
  lending_market: ro,
  reserve: mut,
  reserve_liquidity_mint: ro,
  reserve_destination_liquidity: mut,
  user_source_liquidity: mut,
  reserve_liquidity_fee_receiver: mut,
  referrer_token_state: opt_mut,
  referrer_account: opt_mut,
  sysvar_info: ro,
  token_program: ro,
});
