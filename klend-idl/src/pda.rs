use anchor_lang::prelude::Pubkey;

use crate::{farms, klend};

macro_rules! pda {
  ($program_id:expr, $base:expr, $key:expr) => {
    Pubkey::find_program_address(&[$base.as_ref(), $key.as_ref()], &$program_id)
      .0
  };
  ($program_id:expr, $base:expr, $key:expr, $key2:expr) => {
    Pubkey::find_program_address(
      &[$base.as_ref(), $key.as_ref(), $key2.as_ref()],
      &$program_id,
    )
    .0
  };
}

/// Associated token account, optionally under a non-default token program.
#[macro_export]
macro_rules! ata {
  ($auth:expr, $mint:expr) => {
    anchor_spl::associated_token::get_associated_token_address(&$auth, &$mint)
  };
  ($auth:expr, $mint:expr, $token_program:expr) => {
    anchor_spl::associated_token::get_associated_token_address_with_program_id(
      &$auth,
      &$mint,
      &$token_program,
    )
  };
}

#[must_use]
pub fn lending_market_auth(market: Pubkey) -> Pubkey {
  pda!(klend::ID, klend::constants::LENDING_MARKET_AUTH, market)
}

#[must_use]
pub fn reserve_liquidity_supply(market: Pubkey, mint: Pubkey) -> Pubkey {
  pda!(klend::ID, klend::constants::RESERVE_LIQ_SUPPLY, market, mint)
}

#[must_use]
pub fn reserve_fee_vault(market: Pubkey, mint: Pubkey) -> Pubkey {
  pda!(klend::ID, klend::constants::FEE_RECEIVER, market, mint)
}

#[must_use]
pub fn reserve_collateral_mint(market: Pubkey, mint: Pubkey) -> Pubkey {
  pda!(klend::ID, klend::constants::RESERVE_COLL_MINT, market, mint)
}

#[must_use]
pub fn reserve_collateral_supply(market: Pubkey, mint: Pubkey) -> Pubkey {
  pda!(klend::ID, klend::constants::RESERVE_COLL_SUPPLY, market, mint)
}

#[must_use]
pub fn user_metadata(owner: Pubkey) -> Pubkey {
  pda!(klend::ID, klend::constants::USER_METADATA, owner)
}

#[must_use]
pub fn referrer_token_state(referrer: Pubkey, reserve: Pubkey) -> Pubkey {
  pda!(klend::ID, klend::constants::REFERRER_TOKEN_STATE, referrer, reserve)
}

/// Farm stake account of an obligation.
#[must_use]
pub fn obligation_farm_state(farm: Pubkey, obligation: Pubkey) -> Pubkey {
  pda!(farms::ID, farms::constants::USER_STATE, farm, obligation)
}
