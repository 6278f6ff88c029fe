//! Refresh instructions wrapped around each economic klend instruction.
//!
//! The program reads reserve prices and obligation health only from
//! accounts refreshed earlier in the same slot, so every deposit, borrow,
//! repay or withdraw is preceded by reserve refreshes, then an obligation
//! refresh, then farm refreshes, and followed by the same farm refreshes.

use anchor_client::solana_sdk::instruction::Instruction;
use anchor_lang::prelude::Pubkey;
use klend_clients::klend_client::ObligationState;
use klend_idl::klend::client::args::FarmMode;
use klend_idl::klend::instruction_builders;

use crate::error::{LeverageError, Result};

/// Deposit and borrow reserves of an obligation in slot order, as seen by
/// the program at some point within the transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObligationReserves {
  pub deposits: Vec<Pubkey>,
  pub borrows: Vec<Pubkey>,
}

impl ObligationReserves {
  #[must_use]
  pub fn of(state: &ObligationState) -> Self {
    state
      .obligation
      .as_ref()
      .map(|obligation| ObligationReserves {
        deposits: obligation
          .active_deposits()
          .map(|d| d.deposit_reserve)
          .collect(),
        borrows: obligation
          .active_borrows()
          .map(|b| b.borrow_reserve)
          .collect(),
      })
      .unwrap_or_default()
  }

  /// Deposits then borrows, the obligation refresh's remaining accounts.
  #[must_use]
  pub fn refresh_accounts(&self) -> Vec<Pubkey> {
    self.deposits.iter().chain(&self.borrows).copied().collect()
  }

  pub fn add_deposit(&mut self, reserve: Pubkey) {
    if !self.deposits.contains(&reserve) {
      self.deposits.push(reserve);
    }
  }

  pub fn remove_borrow(&mut self, reserve: &Pubkey) {
    self.borrows.retain(|r| r != reserve);
  }
}

/// Builds refresh prefixes and farm suffixes for one obligation.
pub struct RefreshSequencer<'a> {
  lending_market: Pubkey,
  owner: Pubkey,
  state: &'a ObligationState,
}

impl<'a> RefreshSequencer<'a> {
  #[must_use]
  pub fn new(
    lending_market: Pubkey,
    owner: Pubkey,
    state: &'a ObligationState,
  ) -> Self {
    Self {
      lending_market,
      owner,
      state,
    }
  }

  /// Distinct reserves to refresh: those already in the obligation but not
  /// part of the action first, then the action reserves.
  #[must_use]
  pub fn reserve_order(
    current: &ObligationReserves,
    action_reserves: &[Pubkey],
  ) -> Vec<Pubkey> {
    let mut order: Vec<Pubkey> = Vec::new();
    let untouched = current
      .refresh_accounts()
      .into_iter()
      .filter(|r| !action_reserves.contains(r));
    for reserve in untouched.chain(action_reserves.iter().copied()) {
      if !order.contains(&reserve) {
        order.push(reserve);
      }
    }
    order
  }

  /// Reserve refreshes, the obligation refresh and the pre-action farm
  /// refreshes for an action on `farms`.
  ///
  /// # Errors
  /// - A touched reserve was not fetched
  pub fn prefix(
    &self,
    current: &ObligationReserves,
    action_reserves: &[Pubkey],
    farms: &[(Pubkey, FarmMode)],
  ) -> Result<Vec<Instruction>> {
    let mut ixs = Self::reserve_order(current, action_reserves)
      .into_iter()
      .map(|address| {
        let reserve = self.reserve(&address)?;
        Ok(instruction_builders::refresh_reserve(address, reserve))
      })
      .collect::<Result<Vec<_>>>()?;
    ixs.push(instruction_builders::refresh_obligation(
      self.lending_market,
      self.state.address,
      &current.refresh_accounts(),
    ));
    ixs.extend(self.farm_refreshes(farms)?);
    Ok(ixs)
  }

  /// Farm refreshes for reserves with a farm on the given side, debt side
  /// first.
  ///
  /// # Errors
  /// - A touched reserve was not fetched
  pub fn farm_refreshes(
    &self,
    farms: &[(Pubkey, FarmMode)],
  ) -> Result<Vec<Instruction>> {
    let debt_first = farms
      .iter()
      .filter(|(_, mode)| *mode == FarmMode::Debt)
      .chain(farms.iter().filter(|(_, mode)| *mode == FarmMode::Collateral));
    let mut ixs = Vec::new();
    for (address, mode) in debt_first {
      let reserve = self.reserve(address)?;
      ixs.extend(instruction_builders::refresh_obligation_farms(
        self.owner,
        self.state.address,
        *address,
        reserve,
        *mode,
      ));
    }
    Ok(ixs)
  }

  /// Farm user state initialization for an obligation created in this
  /// transaction.
  ///
  /// # Errors
  /// - A touched reserve was not fetched
  pub fn init_farms(
    &self,
    farms: &[(Pubkey, FarmMode)],
  ) -> Result<Vec<Instruction>> {
    let mut ixs = Vec::new();
    for (address, mode) in farms {
      let reserve = self.reserve(address)?;
      ixs.extend(instruction_builders::init_obligation_farms(
        self.owner,
        self.owner,
        self.state.address,
        *address,
        reserve,
        *mode,
      ));
    }
    Ok(ixs)
  }

  fn reserve(
    &self,
    address: &Pubkey,
  ) -> Result<&'a klend_idl::klend::accounts::Reserve> {
    self
      .state
      .reserves
      .get(address)
      .ok_or_else(|| {
        LeverageError::StaleState(format!("reserve {address} not loaded"))
      })
  }
}
