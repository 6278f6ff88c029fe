//! Zero-initialized klend accounts for unit tests.

use std::collections::HashMap;

use anchor_lang::prelude::Pubkey;
use anchor_lang::{AccountDeserialize, Discriminator};
use anchor_spl::token::spl_token;
use anyhow::Result;
use klend_clients::klend_client::ObligationState;
use klend_core::fraction::Fraction;
use klend_idl::klend::accounts::{Obligation, Reserve};

const OBLIGATION_SIZE: usize = 3344;
const RESERVE_SIZE: usize = 8624;

fn zeroed<T: Discriminator + AccountDeserialize>(size: usize) -> Result<T> {
  let mut bytes = vec![0; size];
  bytes[..8].copy_from_slice(T::DISCRIMINATOR);
  Ok(T::try_deserialize(&mut bytes.as_slice())?)
}

/// Reserve with a 1:1 collateral exchange rate, updated at `slot`.
pub(crate) fn reserve(
  market: Pubkey,
  mint: Pubkey,
  decimals: u64,
  slot: u64,
) -> Result<Reserve> {
  let mut reserve: Reserve = zeroed(RESERVE_SIZE)?;
  reserve.lending_market = market;
  reserve.last_update.slot = slot;
  reserve.liquidity.mint_pubkey = mint;
  reserve.liquidity.mint_decimals = decimals;
  reserve.liquidity.token_program = spl_token::ID;
  reserve.collateral.mint_pubkey = Pubkey::new_unique();
  Ok(reserve)
}

pub(crate) fn obligation(
  market: Pubkey,
  owner: Pubkey,
  deposit: Option<(Pubkey, u64)>,
  borrow: Option<(Pubkey, u64)>,
) -> Result<Obligation> {
  let mut obligation: Obligation = zeroed(OBLIGATION_SIZE)?;
  obligation.lending_market = market;
  obligation.owner = owner;
  if let Some((reserve, amount)) = deposit {
    obligation.deposits[0].deposit_reserve = reserve;
    obligation.deposits[0].deposited_amount = amount;
  }
  if let Some((reserve, amount)) = borrow {
    obligation.borrows[0].borrow_reserve = reserve;
    obligation.borrows[0].borrowed_amount_sf =
      Fraction::from_lamports(amount).to_bits();
  }
  Ok(obligation)
}

pub(crate) fn state(
  obligation: Option<Obligation>,
  reserves: Vec<(Pubkey, Reserve)>,
) -> ObligationState {
  ObligationState {
    address: Pubkey::new_unique(),
    obligation,
    reserves: reserves.into_iter().collect::<HashMap<_, _>>(),
  }
}
