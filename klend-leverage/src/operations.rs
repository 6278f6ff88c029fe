//! Leverage pipelines.
//!
//! Every request runs the same stages:
//!
//! 1. fetch the obligation, its reserves and the owner's lookup table
//! 2. size the adjustment at the oracle price
//! 3. assemble the klend instructions alone to learn the reserved accounts
//! 4. quote the (buffered) swap
//! 5. re-size at the quoted price and request routes
//! 6. assemble, simulate and select

use std::future::Future;
use std::time::Duration;

use anchor_client::solana_sdk::address_lookup_table::AddressLookupTableAccount;
use anchor_client::solana_sdk::instruction::Instruction;
use anchor_lang::prelude::Pubkey;
use anyhow::anyhow;
use klend_clients::klend_client::{KlendClient, ObligationState};
use klend_clients::program_client::ProgramClient;
use klend_clients::rpc::RpcProvider;
use klend_clients::user_lut::ensure_lut_ready;
use klend_clients::util::lookup_table_last_extended_slot;
use klend_core::error::ValidationError::{
  AdjustmentTooSmall, Arithmetic, UnreachableLeverage,
};
use klend_core::leverage_math::{
  compute_swap_for_target_leverage, compute_withdraw_with_leverage,
  current_leverage, LeverageDirection, MarketPrices, PositionSnapshot,
  SwapPlan, SwapTerms, TokenDecimals,
};
use klend_idl::klend::accounts::Reserve;
use klend_idl::obligation_type::ObligationType;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::LeverageConfig;
use crate::error::{LeverageError, RejectionReason, Result, RouteRejection};
use crate::instruction_assembler::{
  ActionFlags, InstructionAssembler, PositionContext,
};
use crate::route_selector::select_route;
use crate::route_simulator::{Candidate, RouteSimulator};
use crate::swap::{
  buffered_amount, max_swap_accounts, unique_accounts, Quote, SwapInputs,
  SwapIxsProvider, SwapQuoteProvider,
};

/// A single-collateral, single-debt position and how to transact on it.
#[derive(Clone, Debug)]
pub struct LeverageRequest {
  pub owner: Pubkey,
  pub lending_market: Pubkey,
  /// Derives the obligation address. Deposits create the obligation with it
  /// when missing.
  pub obligation_type: ObligationType,
  pub coll_reserve: Pubkey,
  pub debt_reserve: Pubkey,
  /// Liquidity amounts the caller read right before the request.
  pub deposited_lamports: u64,
  pub borrowed_lamports: u64,
  /// Debt tokens per collateral token. Taken from the reserves' last
  /// refreshed prices when `None`.
  pub price_coll_to_debt: Option<Decimal>,
  /// Percentage, `0.5` means half a percent.
  pub slippage_pct: Decimal,
  pub current_slot: u64,
  pub referrer: Option<Pubkey>,
  pub budget_ixs: Option<Vec<Instruction>>,
  /// Owner's lookup table, attached to every candidate transaction.
  pub user_lookup_table: Option<Pubkey>,
}

/// Ready-to-sign transaction contents for the selected route.
#[derive(Clone, Debug)]
pub struct LeverageIxsOutput<T> {
  pub instructions: Vec<Instruction>,
  pub lookup_tables: Vec<AddressLookupTableAccount>,
  pub swap_inputs: SwapInputs,
  pub plan: SwapPlan,
  pub route_index: usize,
  pub quote: Quote<T>,
  /// Routes dropped on the way, by index.
  pub rejections: Vec<RouteRejection>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Adjustment {
  Target {
    leverage: Decimal,
    wallet_deposit_lamports: u64,
  },
  Withdraw {
    lamports: u64,
  },
}

impl Adjustment {
  fn direction(
    &self,
    position: &PositionSnapshot,
    prices: MarketPrices,
    decimals: TokenDecimals,
  ) -> Result<LeverageDirection> {
    match *self {
      Adjustment::Withdraw { .. } => Ok(LeverageDirection::Decrease),
      Adjustment::Target {
        wallet_deposit_lamports,
        ..
      } if wallet_deposit_lamports > 0 => Ok(LeverageDirection::Increase),
      Adjustment::Target { leverage, .. } => {
        let current =
          current_leverage(position, prices.price_debt_to_coll, decimals)?;
        Ok(if leverage > current {
          LeverageDirection::Increase
        } else {
          LeverageDirection::Decrease
        })
      }
    }
  }

  fn plan(
    &self,
    position: &PositionSnapshot,
    terms: &SwapTerms,
  ) -> Result<SwapPlan> {
    Ok(match *self {
      Adjustment::Target {
        leverage,
        wallet_deposit_lamports,
      } => compute_swap_for_target_leverage(
        position,
        leverage,
        terms,
        wallet_deposit_lamports,
      )?,
      Adjustment::Withdraw { lamports } => {
        compute_withdraw_with_leverage(position, lamports, terms)?
      }
    })
  }

  fn flags(
    &self,
    position: &PositionSnapshot,
    plan: &SwapPlan,
  ) -> ActionFlags {
    match *self {
      Adjustment::Target {
        wallet_deposit_lamports,
        ..
      } => ActionFlags {
        wallet_deposit_lamports,
        closing: false,
      },
      Adjustment::Withdraw { .. } => ActionFlags {
        wallet_deposit_lamports: 0,
        closing: plan.collateral_lamports == position.deposited_lamports
          && plan.debt_lamports == position.borrowed_lamports,
      },
    }
  }
}

/// Builds leverage transactions against klend with pluggable swap
/// providers.
pub struct LeverageEngine<R: RpcProvider, Q, S> {
  client: KlendClient<R>,
  quote_provider: Q,
  ixs_provider: S,
  config: LeverageConfig,
}

impl<R, Q, S> LeverageEngine<R, Q, S>
where
  R: RpcProvider,
  Q: SwapQuoteProvider,
  S: SwapIxsProvider<Quote = Q::Quote>,
{
  #[must_use]
  pub fn new(
    client: KlendClient<R>,
    quote_provider: Q,
    ixs_provider: S,
    config: LeverageConfig,
  ) -> Self {
    Self {
      client,
      quote_provider,
      ixs_provider,
      config,
    }
  }

  #[must_use]
  pub fn client(&self) -> &KlendClient<R> {
    &self.client
  }

  #[must_use]
  pub fn config(&self) -> &LeverageConfig {
    &self.config
  }

  /// Moves an existing position to `target_leverage`, in either direction.
  ///
  /// # Errors
  /// - Invalid or unreachable target
  ///   (see [`compute_swap_for_target_leverage`])
  /// - Obligation or reserves disagree with the request
  /// - Quote failure or timeout
  /// - No route survives simulation
  pub async fn adjust_leverage(
    &self,
    request: &LeverageRequest,
    target_leverage: Decimal,
  ) -> Result<LeverageIxsOutput<Q::Quote>> {
    let adjustment = Adjustment::Target {
      leverage: target_leverage,
      wallet_deposit_lamports: 0,
    };
    self.run(request, adjustment, None).await
  }

  /// Adds `deposit_lamports` collateral from the owner's wallet and levers
  /// the whole position up to `target_leverage`. Opens the obligation when
  /// it does not exist yet.
  ///
  /// # Errors
  /// - Zero deposit
  /// - Same as [`LeverageEngine::adjust_leverage`]
  pub async fn deposit_with_leverage(
    &self,
    request: &LeverageRequest,
    deposit_lamports: u64,
    target_leverage: Decimal,
  ) -> Result<LeverageIxsOutput<Q::Quote>> {
    if deposit_lamports == 0 {
      return Err(AdjustmentTooSmall.into());
    }
    let adjustment = Adjustment::Target {
      leverage: target_leverage,
      wallet_deposit_lamports: deposit_lamports,
    };
    self
      .run(request, adjustment, Some(request.obligation_type))
      .await
  }

  /// Withdraws `withdraw_lamports` collateral at unchanged leverage.
  /// Withdrawing everything available closes the position.
  ///
  /// # Errors
  /// - Request above the collateral left after repaying all debt
  /// - Same as [`LeverageEngine::adjust_leverage`]
  pub async fn withdraw_with_leverage(
    &self,
    request: &LeverageRequest,
    withdraw_lamports: u64,
  ) -> Result<LeverageIxsOutput<Q::Quote>> {
    let adjustment = Adjustment::Withdraw {
      lamports: withdraw_lamports,
    };
    self.run(request, adjustment, None).await
  }

  async fn run(
    &self,
    request: &LeverageRequest,
    adjustment: Adjustment,
    create_as: Option<ObligationType>,
  ) -> Result<LeverageIxsOutput<Q::Quote>> {
    let obligation = request
      .obligation_type
      .to_pda(request.lending_market, request.owner);
    let action_reserves = [request.coll_reserve, request.debt_reserve];
    let (state, lookup_table) = tokio::join!(
      self.client.fetch_obligation_state(
        request.lending_market,
        obligation,
        &action_reserves
      ),
      self.lookup_table_extended_slot(request.user_lookup_table)
    );
    let state = state.map_err(LeverageError::Rpc)?;
    if let Some((table, extended_slot)) = lookup_table? {
      ensure_lut_ready(table, extended_slot, request.current_slot)?;
    }
    let position =
      position_of(request, &state, self.config.position_tolerance_bps)?;
    let coll = loaded(&state, &request.coll_reserve)?;
    let debt = loaded(&state, &request.debt_reserve)?;
    let decimals = TokenDecimals {
      collateral: coll.decimals(),
      debt: debt.decimals(),
    };

    // Sizing pass at the oracle price
    let oracle_prices = MarketPrices::from_coll_price(oracle_price(
      request.price_coll_to_debt,
      coll,
      debt,
    )?)?;
    let direction = adjustment.direction(&position, oracle_prices, decimals)?;
    let flash_reserve = match direction {
      LeverageDirection::Increase => coll,
      LeverageDirection::Decrease => debt,
    };
    let oracle_terms = SwapTerms {
      prices: oracle_prices,
      slippage_pct: request.slippage_pct,
      flash_loan_fee: flash_reserve.flash_loan_fee()?,
      decimals,
    };
    let sizing_plan = adjustment.plan(&position, &oracle_terms)?;
    info!(
      %direction,
      notional = sizing_plan.notional_to_swap_lamports,
      expected_output = sizing_plan.expected_output_lamports,
      "plan computed at oracle price"
    );

    let ctx = PositionContext {
      owner: request.owner,
      lending_market: request.lending_market,
      coll_reserve: request.coll_reserve,
      debt_reserve: request.debt_reserve,
      referrer: request.referrer,
      state: &state,
      obligation_type: create_as,
      budget_ixs: request.budget_ixs.clone(),
      current_slot: request.current_slot,
    };
    let assembler = InstructionAssembler::new(&self.config, &ctx);
    let skeleton = assembler.assemble(
      &sizing_plan,
      adjustment.flags(&position, &sizing_plan),
      &[],
      &[],
    )?;
    let reserved = unique_accounts(&skeleton.instructions);
    debug!(
      reserved = reserved.len(),
      swap_budget =
        max_swap_accounts(reserved.len(), self.config.account_safety_buffer),
      "klend accounts reserved"
    );

    // Quote, then re-size at the quoted price
    let (input_mint, output_mint) = match direction {
      LeverageDirection::Increase => (debt.mint(), coll.mint()),
      LeverageDirection::Decrease => (coll.mint(), debt.mint()),
    };
    let sizing_inputs = SwapInputs {
      input_mint,
      output_mint,
      input_amount_lamports: buffered_amount(
        sizing_plan.notional_to_swap_lamports,
        self.config.quote_buffer_bps,
      ),
      min_out_amount_lamports: None,
    };
    let quote = within(
      self.config.simulation_timeout(),
      "quote",
      self.quote_provider.quote(&sizing_inputs, &reserved),
    )
    .await?;
    debug!(price_a_in_b = %quote.price_a_in_b, "quote received");

    let terms = SwapTerms {
      prices: MarketPrices::from_swap_price(direction, quote.price_a_in_b)?,
      ..oracle_terms
    };
    let plan = adjustment.plan(&position, &terms)?;
    if plan.direction != direction {
      return Err(LeverageError::Quote(anyhow!(
        "Quoted price {} turns the {direction} into a {}.",
        quote.price_a_in_b,
        plan.direction
      )));
    }
    self.check_overshoot(adjustment, &position, &plan, &terms)?;
    let flags = adjustment.flags(&position, &plan);
    let swap_inputs = SwapInputs {
      input_amount_lamports: plan.notional_to_swap_lamports,
      min_out_amount_lamports: Some(plan.expected_output_lamports),
      ..sizing_inputs
    };
    let routes = within(
      self.config.simulation_timeout(),
      "route request",
      self.ixs_provider.swap(&swap_inputs, &reserved, &quote),
    )
    .await?;
    info!(
      routes = routes.len(),
      notional = plan.notional_to_swap_lamports,
      min_out = plan.expected_output_lamports,
      "routes received"
    );

    // Assemble, simulate, select
    let mut rejections = Vec::new();
    let mut candidates = Vec::with_capacity(routes.len());
    for (route_index, route) in routes.into_iter().enumerate() {
      match assembler.assemble(
        &plan,
        flags,
        &route.pre_action_ixs,
        &route.swap_ixs,
      ) {
        Ok(assembled) => candidates.push(Candidate {
          route_index,
          route,
          instructions: assembled.instructions,
        }),
        Err(e) => rejections.push(RouteRejection {
          route_index,
          reason: RejectionReason::Compile(e.to_string()),
        }),
      }
    }
    let simulator = RouteSimulator::new(
      &self.client,
      request.owner,
      self.config.simulation_timeout(),
      request.user_lookup_table.into_iter().collect(),
    );
    let outcome = simulator.simulate(candidates).await?;
    rejections.extend(outcome.rejections);
    let (selected, rejections) = select_route(
      outcome.survivors,
      plan.expected_output_lamports,
      rejections,
    )?;

    Ok(LeverageIxsOutput {
      instructions: selected.transaction.instructions,
      lookup_tables: selected.transaction.lookup_tables,
      swap_inputs,
      plan,
      route_index: selected.route_index,
      quote: selected.route.quote,
      rejections,
    })
  }

  /// Rounding only ever lowers leverage; a plan above target plus tolerance
  /// means the inputs are inconsistent.
  fn check_overshoot(
    &self,
    adjustment: Adjustment,
    position: &PositionSnapshot,
    plan: &SwapPlan,
    terms: &SwapTerms,
  ) -> Result<()> {
    let Adjustment::Target { leverage, .. } = adjustment else {
      return Ok(());
    };
    let resulting = current_leverage(
      &plan.apply(position)?,
      terms.prices.price_debt_to_coll,
      terms.decimals,
    )?;
    let ceiling = leverage
      .checked_add(self.config.leverage_tolerance)
      .ok_or(Arithmetic("leverage ceiling"))?;
    if resulting > ceiling {
      warn!(%resulting, target = %leverage, "plan overshoots target");
      return Err(UnreachableLeverage { target: leverage }.into());
    }
    Ok(())
  }

  async fn lookup_table_extended_slot(
    &self,
    table: Option<Pubkey>,
  ) -> Result<Option<(Pubkey, u64)>> {
    let Some(table) = table else {
      return Ok(None);
    };
    let account = self
      .client
      .rpc()
      .get_multiple_accounts(&[table])
      .await
      .map_err(|e| LeverageError::Rpc(e.into()))?
      .pop()
      .flatten()
      .ok_or_else(|| {
        LeverageError::StaleState(format!("lookup table {table} not found"))
      })?;
    let slot =
      lookup_table_last_extended_slot(&account).map_err(LeverageError::Rpc)?;
    Ok(Some((table, slot)))
  }
}

/// The request's amounts, checked against the freshly fetched obligation.
///
/// Each amount may differ from the chain by `tolerance_bps` of the on-chain
/// value, or one lamport, to absorb interest accrued since the caller read
/// the position.
fn position_of(
  request: &LeverageRequest,
  state: &ObligationState,
  tolerance_bps: u16,
) -> Result<PositionSnapshot> {
  let position = PositionSnapshot::new(
    request.deposited_lamports,
    request.borrowed_lamports,
  );
  if state.obligation.is_none() {
    if request.deposited_lamports > 0 || request.borrowed_lamports > 0 {
      return Err(LeverageError::StaleState(format!(
        "obligation {} does not exist",
        state.address
      )));
    }
    return Ok(position);
  }
  let deposited = state
    .deposited_lamports(&request.coll_reserve)
    .map_err(|e| LeverageError::StaleState(e.to_string()))?;
  if !within_tolerance(request.deposited_lamports, deposited, tolerance_bps)
  {
    return Err(LeverageError::StaleState(format!(
      "obligation {} has {deposited} lamports deposited in {}, request has \
       {}",
      state.address, request.coll_reserve, request.deposited_lamports
    )));
  }
  let borrowed = state.borrowed_lamports(&request.debt_reserve);
  if !within_tolerance(request.borrowed_lamports, borrowed, tolerance_bps) {
    return Err(LeverageError::StaleState(format!(
      "obligation {} has {borrowed} lamports borrowed from {}, request has \
       {}",
      state.address, request.debt_reserve, request.borrowed_lamports
    )));
  }
  Ok(position)
}

fn within_tolerance(requested: u64, on_chain: u64, tolerance_bps: u16) -> bool {
  let allowed = (u128::from(on_chain) * u128::from(tolerance_bps) / 10_000)
    .max(1);
  u128::from(requested.abs_diff(on_chain)) <= allowed
}

fn oracle_price(
  requested: Option<Decimal>,
  coll: &Reserve,
  debt: &Reserve,
) -> Result<Decimal> {
  if let Some(price) = requested {
    return Ok(price);
  }
  Ok(
    coll
      .market_price()?
      .checked_div(debt.market_price()?)
      .ok_or(Arithmetic("reserve price ratio"))?,
  )
}

fn loaded<'a>(
  state: &'a ObligationState,
  address: &Pubkey,
) -> Result<&'a Reserve> {
  state.reserves.get(address).ok_or_else(|| {
    LeverageError::StaleState(format!("reserve {address} not loaded"))
  })
}

/// Runs a provider call under `timeout`; both failure kinds are retryable.
async fn within<T>(
  timeout: Duration,
  stage: &str,
  call: impl Future<Output = anyhow::Result<T>>,
) -> Result<T> {
  tokio::time::timeout(timeout, call)
    .await
    .map_err(|_| {
      LeverageError::Quote(anyhow!("{stage} timed out after {timeout:?}"))
    })?
    .map_err(LeverageError::Quote)
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;

  use super::*;
  use crate::fixtures;

  fn request(
    coll_reserve: Pubkey,
    debt_reserve: Pubkey,
    deposited_lamports: u64,
    borrowed_lamports: u64,
  ) -> LeverageRequest {
    LeverageRequest {
      owner: Pubkey::new_unique(),
      lending_market: Pubkey::new_unique(),
      obligation_type: ObligationType::Vanilla { id: 0 },
      coll_reserve,
      debt_reserve,
      deposited_lamports,
      borrowed_lamports,
      price_coll_to_debt: Some(dec!(200)),
      slippage_pct: dec!(0.5),
      current_slot: 100,
      referrer: None,
      budget_ixs: None,
      user_lookup_table: None,
    }
  }

  fn empty_state() -> ObligationState {
    fixtures::state(None, vec![])
  }

  #[test]
  fn missing_obligation_with_position_is_stale() {
    let req = request(Pubkey::new_unique(), Pubkey::new_unique(), 1, 0);
    assert!(matches!(
      position_of(&req, &empty_state(), 10),
      Err(LeverageError::StaleState(_))
    ));
  }

  #[test]
  fn fresh_position_needs_no_obligation() -> anyhow::Result<()> {
    let req = request(Pubkey::new_unique(), Pubkey::new_unique(), 0, 0);
    let position = position_of(&req, &empty_state(), 10)?;
    assert_eq!(position, PositionSnapshot::default());
    Ok(())
  }

  fn held_position(
    req: &LeverageRequest,
    deposited: u64,
    borrowed: (Pubkey, u64),
  ) -> anyhow::Result<ObligationState> {
    let obligation = fixtures::obligation(
      req.lending_market,
      req.owner,
      Some((req.coll_reserve, deposited)),
      Some(borrowed),
    )?;
    let coll =
      fixtures::reserve(req.lending_market, Pubkey::new_unique(), 9, 0)?;
    Ok(fixtures::state(Some(obligation), vec![(req.coll_reserve, coll)]))
  }

  #[test]
  fn borrow_in_other_reserve_is_stale() -> anyhow::Result<()> {
    let req = request(Pubkey::new_unique(), Pubkey::new_unique(), 1_000, 10);
    let state = held_position(&req, 1_000, (Pubkey::new_unique(), 10))?;
    assert!(matches!(
      position_of(&req, &state, 10),
      Err(LeverageError::StaleState(msg)) if msg.contains("0 lamports borrowed")
    ));
    Ok(())
  }

  #[test]
  fn overstated_collateral_is_stale() -> anyhow::Result<()> {
    // chain holds 1 SOL against 100 USDC, the caller claims 3 SOL
    let req = request(
      Pubkey::new_unique(),
      Pubkey::new_unique(),
      3_000_000_000,
      100_000_000,
    );
    let state =
      held_position(&req, 1_000_000_000, (req.debt_reserve, 100_000_000))?;
    assert!(matches!(
      position_of(&req, &state, 10),
      Err(LeverageError::StaleState(msg))
        if msg.contains("1000000000 lamports deposited")
    ));
    Ok(())
  }

  #[test]
  fn accrued_interest_within_tolerance() -> anyhow::Result<()> {
    let req = request(
      Pubkey::new_unique(),
      Pubkey::new_unique(),
      1_000_000_000,
      100_000_000,
    );
    // 0.05% of interest since the caller's read
    let state =
      held_position(&req, 1_000_000_000, (req.debt_reserve, 100_050_000))?;
    let position = position_of(&req, &state, 10)?;
    assert_eq!(position.borrowed_lamports, 100_000_000);

    let drifted =
      held_position(&req, 1_000_000_000, (req.debt_reserve, 100_200_000))?;
    assert!(matches!(
      position_of(&req, &drifted, 10),
      Err(LeverageError::StaleState(_))
    ));
    Ok(())
  }

  #[test]
  fn tolerance_allows_one_lamport() {
    assert!(within_tolerance(1, 0, 10));
    assert!(!within_tolerance(2, 0, 10));
    assert!(within_tolerance(10_010, 10_000, 10));
    assert!(!within_tolerance(10_011, 10_000, 10));
    assert!(within_tolerance(u64::MAX, u64::MAX, 0));
  }

  #[test]
  fn direction_follows_target() -> anyhow::Result<()> {
    let prices = MarketPrices::from_coll_price(dec!(200))?;
    let decimals = TokenDecimals {
      collateral: 9,
      debt: 6,
    };
    // 1 SOL against 100 USDC at 200: leverage 2
    let position = PositionSnapshot::new(1_000_000_000, 100_000_000);
    let up = Adjustment::Target {
      leverage: dec!(3),
      wallet_deposit_lamports: 0,
    };
    let down = Adjustment::Target {
      leverage: dec!(1.5),
      wallet_deposit_lamports: 0,
    };
    assert_eq!(
      up.direction(&position, prices, decimals)?,
      LeverageDirection::Increase
    );
    assert_eq!(
      down.direction(&position, prices, decimals)?,
      LeverageDirection::Decrease
    );
    let open = Adjustment::Target {
      leverage: dec!(3),
      wallet_deposit_lamports: 1,
    };
    assert_eq!(
      open.direction(&PositionSnapshot::default(), prices, decimals)?,
      LeverageDirection::Increase
    );
    Ok(())
  }

  #[test]
  fn full_withdrawal_closes() {
    let position = PositionSnapshot::new(1_000, 100);
    let plan = SwapPlan {
      direction: LeverageDirection::Decrease,
      notional_to_swap_lamports: 600,
      expected_output_lamports: 101,
      flash_borrow_lamports: 100,
      collateral_lamports: 1_000,
      debt_lamports: 100,
    };
    let withdraw = Adjustment::Withdraw { lamports: 400 };
    assert!(withdraw.flags(&position, &plan).closing);
    let partial = SwapPlan {
      collateral_lamports: 500,
      debt_lamports: 50,
      ..plan
    };
    assert!(!withdraw.flags(&position, &partial).closing);
  }

  #[tokio::test]
  async fn provider_timeout_is_quote_error() {
    let result: Result<()> = within(Duration::from_millis(5), "quote", async {
      tokio::time::sleep(Duration::from_secs(5)).await;
      Ok(())
    })
    .await;
    assert!(matches!(result, Err(LeverageError::Quote(_))));
  }
}
