//! Swap aggregator seam.
//!
//! The engine never talks to an aggregator directly. A quote provider prices
//! the swap, an instructions provider turns a quote into one or more
//! candidate routes. Both carry an opaque provider payload through
//! [`Quote`].

use anchor_client::solana_sdk::compute_budget;
use anchor_client::solana_sdk::instruction::Instruction;
use anchor_lang::prelude::Pubkey;
use async_trait::async_trait;
use itertools::Itertools;
use klend_clients::util::MAX_TRANSACTION_ACCOUNTS;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What to swap. Amounts are in lamports of the respective mint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapInputs {
  pub input_mint: Pubkey,
  pub output_mint: Pubkey,
  pub input_amount_lamports: u64,
  /// Smallest output the leverage plan can tolerate, absent on the sizing
  /// quote.
  pub min_out_amount_lamports: Option<u64>,
}

/// Price of the input mint in the output mint, in whole tokens.
#[derive(Clone, Debug, PartialEq)]
pub struct Quote<T> {
  pub price_a_in_b: Decimal,
  pub payload: T,
}

/// One executable way to perform a swap.
#[derive(Clone, Debug)]
pub struct Route<T> {
  /// Run before the flash loan opens, e.g. token account setup.
  pub pre_action_ixs: Vec<Instruction>,
  pub swap_ixs: Vec<Instruction>,
  pub lookup_tables: Vec<Pubkey>,
  pub quote: Quote<T>,
  pub input_amount_lamports: u64,
  /// The route's guaranteed minimum output. Sizing only ever relies on this.
  pub min_out_amount_lamports: u64,
}

#[async_trait]
pub trait SwapQuoteProvider: Send + Sync {
  type Quote: Clone + Send + Sync;

  /// Prices `inputs`. The quoted route must fit in the account slots left
  /// by `reserved_accounts`, see [`max_swap_accounts`].
  ///
  /// # Errors
  /// - Aggregator unreachable or without a route
  async fn quote(
    &self,
    inputs: &SwapInputs,
    reserved_accounts: &[Pubkey],
  ) -> anyhow::Result<Quote<Self::Quote>>;
}

#[async_trait]
pub trait SwapIxsProvider: Send + Sync {
  type Quote: Clone + Send + Sync;

  /// Builds candidate routes for a previously obtained quote.
  ///
  /// # Errors
  /// - Aggregator unreachable or without a route
  async fn swap(
    &self,
    inputs: &SwapInputs,
    reserved_accounts: &[Pubkey],
    quote: &Quote<Self::Quote>,
  ) -> anyhow::Result<Vec<Route<Self::Quote>>>;
}

/// Account slots a swap route may use next to `reserved_accounts` klend
/// accounts.
#[must_use]
pub fn max_swap_accounts(
  reserved_accounts: usize,
  safety_buffer: usize,
) -> usize {
  MAX_TRANSACTION_ACCOUNTS
    .saturating_sub(reserved_accounts)
    .saturating_sub(safety_buffer)
}

/// Drops compute budget instructions; the engine emits its own.
#[must_use]
pub fn remove_budget_instructions(
  instructions: Vec<Instruction>,
) -> Vec<Instruction> {
  instructions
    .into_iter()
    .filter(|ix| !compute_budget::check_id(&ix.program_id))
    .collect()
}

/// Every distinct account, program ids included, in first-seen order.
#[must_use]
pub fn unique_accounts(instructions: &[Instruction]) -> Vec<Pubkey> {
  instructions
    .iter()
    .flat_map(|ix| {
      std::iter::once(ix.program_id)
        .chain(ix.accounts.iter().map(|meta| meta.pubkey))
    })
    .unique()
    .collect()
}

/// Inflates a sizing quote's input so the final, re-priced route still
/// fits under it.
#[must_use]
pub fn buffered_amount(amount: u64, buffer_bps: u16) -> u64 {
  let buffered =
    u128::from(amount) * (10_000 + u128::from(buffer_bps)) / 10_000;
  u64::try_from(buffered).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
  use anchor_client::solana_sdk::compute_budget::ComputeBudgetInstruction;
  use anchor_client::solana_sdk::instruction::AccountMeta;

  use super::*;

  #[test]
  fn budget_instructions_removed() {
    let swap = Instruction {
      program_id: Pubkey::new_unique(),
      accounts: vec![],
      data: vec![1],
    };
    let ixs = vec![
      ComputeBudgetInstruction::set_compute_unit_limit(200_000),
      swap.clone(),
      ComputeBudgetInstruction::set_compute_unit_price(5),
    ];
    assert_eq!(remove_budget_instructions(ixs), vec![swap]);
  }

  #[test]
  fn swap_account_budget() {
    assert_eq!(max_swap_accounts(30, 4), 30);
    assert_eq!(max_swap_accounts(70, 4), 0);
  }

  #[test]
  fn unique_accounts_include_programs() {
    let [program, a, b] = [(); 3].map(|()| Pubkey::new_unique());
    let ix = Instruction {
      program_id: program,
      accounts: vec![
        AccountMeta::new(a, true),
        AccountMeta::new_readonly(b, false),
        AccountMeta::new_readonly(a, false),
      ],
      data: vec![],
    };
    assert_eq!(unique_accounts(&[ix.clone(), ix]), vec![program, a, b]);
  }

  #[test]
  fn quote_buffer() {
    assert_eq!(buffered_amount(1_000_000, 50), 1_005_000);
    assert_eq!(buffered_amount(u64::MAX, 10_000), u64::MAX);
  }
}
