//! Fetches lending market state for a single obligation.
//!
//! Nothing is cached: every call re-reads the chain so that position sizing
//! always starts from current amounts.

use std::collections::HashMap;

use anchor_lang::prelude::Pubkey;
use anyhow::{anyhow, Context, Result};
use klend_core::fraction::Fraction;
use klend_core::obligation_order::{OrderContext, PositionEntry};
use klend_idl::klend::accounts::{Obligation, Reserve, UserMetadata};
use klend_idl::pda;
use rust_decimal::Decimal;

use crate::program_client::ProgramClient;
use crate::rpc::RpcProvider;

/// An obligation together with every reserve it, or a pending action,
/// touches.
#[derive(Clone, Debug)]
pub struct ObligationState {
  pub address: Pubkey,
  /// `None` before the obligation is initialized.
  pub obligation: Option<Obligation>,
  pub reserves: HashMap<Pubkey, Reserve>,
}

impl ObligationState {
  /// # Errors
  /// - Reserve was not fetched
  pub fn reserve(&self, address: &Pubkey) -> Result<&Reserve> {
    self
      .reserves
      .get(address)
      .ok_or(anyhow!("Reserve {address} not loaded."))
  }

  /// Reserves the obligation currently uses, deposits first.
  #[must_use]
  pub fn obligation_reserves(&self) -> Vec<Pubkey> {
    self
      .obligation
      .as_ref()
      .map(Obligation::refresh_reserves)
      .unwrap_or_default()
  }

  /// Deposited liquidity in `reserve`, converted from collateral tokens.
  ///
  /// # Errors
  /// - Reserve was not fetched
  /// - Exchange rate arithmetic overflow
  pub fn deposited_lamports(&self, reserve: &Pubkey) -> Result<u64> {
    let Some(obligation) = &self.obligation else {
      return Ok(0);
    };
    let collateral = obligation.deposited_collateral(reserve);
    if collateral == 0 {
      return Ok(0);
    }
    Ok(self.reserve(reserve)?.collateral_to_liquidity(collateral)?)
  }

  #[must_use]
  pub fn borrowed_lamports(&self, reserve: &Pubkey) -> u64 {
    self
      .obligation
      .as_ref()
      .map_or(0, |obligation| obligation.borrowed_lamports(reserve))
  }

  /// Order engine view of the refreshed obligation.
  ///
  /// # Errors
  /// - Obligation not initialized
  /// - A position's reserve was not fetched
  pub fn order_context(&self) -> Result<OrderContext> {
    let obligation = self
      .obligation
      .as_ref()
      .ok_or(anyhow!("Obligation {} does not exist.", self.address))?;
    let deposits = obligation
      .active_deposits()
      .map(|deposit| {
        let reserve = self.reserve(&deposit.deposit_reserve)?;
        Ok(PositionEntry {
          reserve: deposit.deposit_reserve,
          amount_lamports: reserve
            .collateral_to_liquidity(deposit.deposited_amount)?,
          decimals: reserve.decimals(),
          market_value: sf_to_decimal(deposit.market_value_sf)?,
          loan_to_value_pct: reserve.config.loan_to_value_pct,
        })
      })
      .collect::<Result<Vec<_>>>()?;
    let borrows = obligation
      .active_borrows()
      .map(|borrow| {
        let reserve = self.reserve(&borrow.borrow_reserve)?;
        Ok(PositionEntry {
          reserve: borrow.borrow_reserve,
          amount_lamports: obligation.borrowed_lamports(&borrow.borrow_reserve),
          decimals: reserve.decimals(),
          market_value: sf_to_decimal(borrow.market_value_sf)?,
          loan_to_value_pct: 0,
        })
      })
      .collect::<Result<Vec<_>>>()?;
    Ok(OrderContext {
      deposits,
      borrows,
      loan_to_value: obligation.loan_to_value()?,
      liquidation_ltv: obligation.liquidation_ltv()?,
      orders: obligation.orders,
    })
  }
}

fn sf_to_decimal(sf: u128) -> Result<Decimal> {
  Ok(Fraction::from_bits(sf).to_decimal()?)
}

/// Read-only client for the lending program.
pub struct KlendClient<R: RpcProvider> {
  rpc: R,
}

impl<R: RpcProvider> ProgramClient for KlendClient<R> {
  type Rpc = R;

  fn rpc(&self) -> &R {
    &self.rpc
  }
}

impl<R: RpcProvider> KlendClient<R> {
  #[must_use]
  pub fn new(rpc: R) -> Self {
    Self { rpc }
  }

  /// # Errors
  /// - RPC failure
  /// - Malformed account
  pub async fn fetch_obligation(
    &self,
    address: Pubkey,
  ) -> Result<Option<Obligation>> {
    let mut accounts = self.fetch_accounts::<Obligation>(&[address]).await?;
    Ok(accounts.pop().flatten())
  }

  /// # Errors
  /// - RPC failure
  /// - Any reserve missing or malformed
  pub async fn fetch_reserves(
    &self,
    addresses: &[Pubkey],
  ) -> Result<HashMap<Pubkey, Reserve>> {
    let reserves = self.fetch_accounts::<Reserve>(addresses).await?;
    addresses
      .iter()
      .zip(reserves)
      .map(|(address, reserve)| {
        reserve
          .map(|reserve| (*address, reserve))
          .with_context(|| format!("Reserve {address} not found."))
      })
      .collect()
  }

  /// # Errors
  /// - RPC failure
  /// - Malformed account
  pub async fn fetch_user_metadata(
    &self,
    owner: Pubkey,
  ) -> Result<Option<UserMetadata>> {
    let address = pda::user_metadata(owner);
    let mut accounts =
      self.fetch_accounts::<UserMetadata>(&[address]).await?;
    Ok(accounts.pop().flatten())
  }

  /// Fetches the obligation and, in a second round trip, every reserve it
  /// uses plus `action_reserves`.
  ///
  /// # Errors
  /// - RPC failure
  /// - Obligation belongs to another market
  /// - Any reserve missing or malformed
  pub async fn fetch_obligation_state(
    &self,
    lending_market: Pubkey,
    address: Pubkey,
    action_reserves: &[Pubkey],
  ) -> Result<ObligationState> {
    let obligation = self.fetch_obligation(address).await?;
    if let Some(obligation) = &obligation {
      if obligation.lending_market != lending_market {
        return Err(anyhow!(
          "Obligation {address} belongs to market {}, not {lending_market}.",
          obligation.lending_market
        ));
      }
    }
    let mut reserve_addresses = obligation
      .as_ref()
      .map(Obligation::refresh_reserves)
      .unwrap_or_default();
    for reserve in action_reserves {
      if !reserve_addresses.contains(reserve) {
        reserve_addresses.push(*reserve);
      }
    }
    let reserves = self.fetch_reserves(&reserve_addresses).await?;
    Ok(ObligationState {
      address,
      obligation,
      reserves,
    })
  }
}

#[cfg(test)]
mod tests {
  use anchor_lang::{AccountDeserialize, Discriminator};
  use klend_core::obligation_order::{
    create_price_based_order, read_price_based_order, OrderAction,
    OrderSpecification, OrderType, PriceBasedOrderTrigger,
  };
  use rust_decimal_macros::dec;

  use super::*;

  const OBLIGATION_SIZE: usize = 3344;
  const RESERVE_SIZE: usize = 8624;

  fn zeroed<T: Discriminator + AccountDeserialize>(size: usize) -> Result<T> {
    let mut bytes = vec![0; size];
    bytes[..8].copy_from_slice(T::DISCRIMINATOR);
    Ok(T::try_deserialize(&mut bytes.as_slice())?)
  }

  fn reserve(decimals: u64, loan_to_value_pct: u8) -> Result<Reserve> {
    let mut reserve: Reserve = zeroed(RESERVE_SIZE)?;
    reserve.liquidity.mint_pubkey = Pubkey::new_unique();
    reserve.liquidity.mint_decimals = decimals;
    reserve.config.loan_to_value_pct = loan_to_value_pct;
    Ok(reserve)
  }

  /// 1 SOL worth 200 against 50 USDC, liquidatable at 85% LTV.
  fn long_sol() -> Result<(ObligationState, Pubkey, Pubkey)> {
    let (sol, usdc) = (Pubkey::new_unique(), Pubkey::new_unique());
    let mut obligation: Obligation = zeroed(OBLIGATION_SIZE)?;
    obligation.deposits[0].deposit_reserve = sol;
    obligation.deposits[0].deposited_amount = 1_000_000_000;
    obligation.deposits[0].market_value_sf =
      Fraction::from_lamports(200).to_bits();
    obligation.borrows[0].borrow_reserve = usdc;
    obligation.borrows[0].borrowed_amount_sf =
      Fraction::from_lamports(50_000_000).to_bits();
    obligation.borrows[0].market_value_sf =
      Fraction::from_lamports(50).to_bits();
    obligation.deposited_value_sf = Fraction::from_lamports(200).to_bits();
    obligation.borrow_factor_adjusted_debt_value_sf =
      Fraction::from_lamports(50).to_bits();
    obligation.unhealthy_borrow_value_sf =
      Fraction::from_lamports(170).to_bits();
    let state = ObligationState {
      address: Pubkey::new_unique(),
      obligation: Some(obligation),
      reserves: HashMap::from([
        (sol, reserve(9, 75)?),
        (usdc, reserve(6, 80)?),
      ]),
    };
    Ok((state, sol, usdc))
  }

  #[test]
  fn order_context_reads_positions() -> Result<()> {
    let (state, sol, usdc) = long_sol()?;
    assert_eq!(state.obligation_reserves(), vec![sol, usdc]);
    assert_eq!(state.deposited_lamports(&sol)?, 1_000_000_000);
    assert_eq!(state.borrowed_lamports(&usdc), 50_000_000);

    let context = state.order_context()?;
    let [deposit] = context.deposits.as_slice() else {
      panic!("expected one deposit, got {:?}", context.deposits);
    };
    assert_eq!(deposit.reserve, sol);
    assert_eq!(deposit.amount_lamports, 1_000_000_000);
    assert_eq!(deposit.decimals, 9);
    assert_eq!(deposit.market_value, dec!(200));
    assert_eq!(deposit.loan_to_value_pct, 75);
    let [borrow] = context.borrows.as_slice() else {
      panic!("expected one borrow, got {:?}", context.borrows);
    };
    assert_eq!(borrow.reserve, usdc);
    assert_eq!(borrow.amount_lamports, 50_000_000);
    assert_eq!(borrow.decimals, 6);
    assert_eq!(borrow.market_value, dec!(50));
    // Only deposits carry an LTV.
    assert_eq!(borrow.loan_to_value_pct, 0);
    assert_eq!(context.loan_to_value, dec!(0.25));
    assert_eq!(context.liquidation_ltv, dec!(0.85));
    assert!(context.orders.iter().all(|order| !order.is_set()));
    Ok(())
  }

  #[test]
  fn price_order_reads_back_from_obligation() -> Result<()> {
    let (mut state, _, usdc) = long_sol()?;
    let stables = [usdc];
    let context = state.order_context()?;
    assert_eq!(
      read_price_based_order(&context, &stables, OrderType::StopLoss)?,
      None
    );

    let spec = OrderSpecification {
      trigger: PriceBasedOrderTrigger::LongStopLoss {
        when_collateral_price_below: dec!(120),
      },
      action: OrderAction::FullRepay,
      execution_bonus_bps_range: (50, 100),
    };
    let at_index = create_price_based_order(
      &context,
      &stables,
      OrderType::StopLoss,
      Some(&spec),
    )?;
    if let Some(obligation) = state.obligation.as_mut() {
      let slot = usize::from(at_index.index);
      obligation.orders[slot] = at_index.order_state()?;
    }

    let context = state.order_context()?;
    assert_eq!(
      read_price_based_order(&context, &stables, OrderType::StopLoss)?,
      Some(spec)
    );
    assert_eq!(
      read_price_based_order(&context, &stables, OrderType::TakeProfit)?,
      None
    );
    Ok(())
  }

  #[test]
  fn order_context_requires_obligation_and_reserves() -> Result<()> {
    let (mut state, sol, _) = long_sol()?;
    state.reserves.remove(&sol);
    assert!(state.order_context().is_err());
    assert!(state.deposited_lamports(&sol).is_err());

    state.obligation = None;
    assert!(state.order_context().is_err());
    assert!(state.obligation_reserves().is_empty());
    assert_eq!(state.deposited_lamports(&sol)?, 0);
    Ok(())
  }
}
