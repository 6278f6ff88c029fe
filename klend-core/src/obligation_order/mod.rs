//! Conditional orders attached to an obligation.
//!
//! An obligation has two order slots: index 0 holds the stop-loss and index 1
//! the take-profit. Once an order's condition holds, a permissionless filler
//! may repay debt for a bonus within the order's execution bonus range. This
//! module only builds and decodes orders. It never fills them.

mod ltv_based;
mod price_based;

use anchor_lang::prelude::*;
use rust_decimal::Decimal;

pub use self::ltv_based::{
  create_ltv_based_order, read_ltv_based_order, LtvBasedOrderTrigger,
};
pub use self::price_based::{
  create_price_based_order, read_price_based_order, PriceBasedOrderTrigger,
};
use crate::conversion::mint_factor;
use crate::error::ValidationError::{
  Arithmetic, InvalidOrderSpec, UnknownConditionType, UnknownOpportunityType,
};
use crate::error::{check_that, Result};
use crate::fraction::Fraction;

pub const FULL_BPS: u16 = 10_000;

/// Significant digits kept when reading thresholds back from scaled
/// fractions.
const READ_SIGNIFICANT_DIGITS: u32 = 10;

/// On-chain order slot layout.
#[derive(
  Clone, Copy, Debug, Default, PartialEq, Eq, AnchorSerialize, AnchorDeserialize,
)]
pub struct ObligationOrder {
  pub condition_threshold_sf: u128,
  pub opportunity_parameter_sf: u128,
  pub min_execution_bonus_bps: u16,
  pub max_execution_bonus_bps: u16,
  pub condition_type: u8,
  pub opportunity_type: u8,
  pub padding1: [u8; 10],
  pub padding2: [u128; 5],
}

impl ObligationOrder {
  /// Zeroed slot, the representation of "no order".
  pub const NULL: ObligationOrder = ObligationOrder {
    condition_threshold_sf: 0,
    opportunity_parameter_sf: 0,
    min_execution_bonus_bps: 0,
    max_execution_bonus_bps: 0,
    condition_type: 0,
    opportunity_type: 0,
    padding1: [0; 10],
    padding2: [0; 5],
  };

  #[must_use]
  pub fn is_set(&self) -> bool {
    self.condition_type != 0
  }
}

/// Which of the two slots an order occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
  StopLoss,
  TakeProfit,
}

impl OrderType {
  #[must_use]
  pub const fn index(self) -> u8 {
    match self {
      OrderType::StopLoss => 0,
      OrderType::TakeProfit => 1,
    }
  }

  #[must_use]
  pub const fn as_str(&self) -> &'static str {
    match self {
      OrderType::StopLoss => "stop-loss",
      OrderType::TakeProfit => "take-profit",
    }
  }
}

impl std::fmt::Display for OrderType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ============================================================================
// Conditions and opportunities
// ============================================================================

/// Condition activating an order. Thresholds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderCondition {
  /// Obligation LTV as a ratio, e.g. `0.7`.
  UserLtvAbove(Decimal),
  UserLtvBelow(Decimal),
  /// Debt token price divided by collateral token price.
  DebtCollPriceRatioAbove(Decimal),
  DebtCollPriceRatioBelow(Decimal),
}

impl OrderCondition {
  #[must_use]
  pub const fn type_id(&self) -> u8 {
    match self {
      OrderCondition::UserLtvAbove(_) => 1,
      OrderCondition::UserLtvBelow(_) => 2,
      OrderCondition::DebtCollPriceRatioAbove(_) => 3,
      OrderCondition::DebtCollPriceRatioBelow(_) => 4,
    }
  }

  #[must_use]
  pub const fn threshold(&self) -> Decimal {
    match self {
      OrderCondition::UserLtvAbove(t)
      | OrderCondition::UserLtvBelow(t)
      | OrderCondition::DebtCollPriceRatioAbove(t)
      | OrderCondition::DebtCollPriceRatioBelow(t) => *t,
    }
  }

  fn from_state(condition_type: u8, threshold: Decimal) -> Result<Self> {
    match condition_type {
      1 => Ok(OrderCondition::UserLtvAbove(threshold)),
      2 => Ok(OrderCondition::UserLtvBelow(threshold)),
      3 => Ok(OrderCondition::DebtCollPriceRatioAbove(threshold)),
      4 => Ok(OrderCondition::DebtCollPriceRatioBelow(threshold)),
      other => Err(UnknownConditionType(other)),
    }
  }

  /// Checks the condition against the obligation's current state.
  ///
  /// # Errors
  /// - Price conditions on anything but a single-deposit, single-borrow
  ///   obligation
  pub fn evaluate(&self, context: &OrderContext) -> Result<Option<ConditionHit>> {
    match *self {
      OrderCondition::UserLtvAbove(threshold) => evaluate_stop_loss(
        context.loan_to_value,
        threshold,
        context.liquidation_ltv,
      ),
      OrderCondition::UserLtvBelow(threshold) => {
        evaluate_take_profit(context.loan_to_value, threshold)
      }
      OrderCondition::DebtCollPriceRatioAbove(threshold) => {
        let ratio = context.debt_coll_price_ratio()?;
        // Ratio scales linearly with LTV on single-pair obligations.
        let liquidation_ratio = ratio
          .checked_mul(context.liquidation_ltv)
          .and_then(|r| r.checked_div(context.loan_to_value))
          .ok_or(Arithmetic("liquidation price ratio"))?;
        evaluate_stop_loss(ratio, threshold, liquidation_ratio)
      }
      OrderCondition::DebtCollPriceRatioBelow(threshold) => {
        evaluate_take_profit(context.debt_coll_price_ratio()?, threshold)
      }
    }
  }
}

/// Trade made available once the condition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOpportunity {
  DeleverageDebtAmount { amount_lamports: u64 },
  DeleverageAllDebt,
}

impl OrderOpportunity {
  #[must_use]
  pub const fn type_id(&self) -> u8 {
    match self {
      OrderOpportunity::DeleverageDebtAmount { .. } => 0,
      OrderOpportunity::DeleverageAllDebt => 1,
    }
  }

  #[must_use]
  pub fn parameter(&self) -> Fraction {
    match self {
      OrderOpportunity::DeleverageDebtAmount { amount_lamports } => {
        Fraction::from_lamports(*amount_lamports)
      }
      OrderOpportunity::DeleverageAllDebt => Fraction::MAX,
    }
  }

  fn from_state(opportunity_type: u8, parameter: Fraction) -> Result<Self> {
    match opportunity_type {
      0 => Ok(OrderOpportunity::DeleverageDebtAmount {
        amount_lamports: parameter.to_lamports_floor(),
      }),
      1 => {
        check_that(parameter == Fraction::MAX, || {
          format!(
            "full deleverage parameter must be the maximum fraction, got {}",
            parameter.to_bits()
          )
        })?;
        Ok(OrderOpportunity::DeleverageAllDebt)
      }
      other => Err(UnknownOpportunityType(other)),
    }
  }
}

/// How hard a condition threshold is crossed, within `[0, 1]`.
///
/// 0 at the threshold itself, 1 at the liquidation point for stop-losses
/// (or at zero for take-profits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionHit {
  pub normalized_distance_from_threshold: Decimal,
}

// ============================================================================
// Structured order
// ============================================================================

/// Decoded, active order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionalOrder {
  pub condition: OrderCondition,
  pub opportunity: OrderOpportunity,
  pub min_execution_bonus_bps: u16,
  pub max_execution_bonus_bps: u16,
}

impl ConditionalOrder {
  /// Decodes an order slot, `None` for an empty slot.
  ///
  /// # Errors
  /// - Unknown condition or opportunity type
  pub fn from_state(state: &ObligationOrder) -> Result<Option<Self>> {
    if !state.is_set() {
      return Ok(None);
    }
    let threshold =
      Fraction::from_bits(state.condition_threshold_sf).to_decimal()?;
    let condition = OrderCondition::from_state(state.condition_type, threshold)?;
    let opportunity = OrderOpportunity::from_state(
      state.opportunity_type,
      Fraction::from_bits(state.opportunity_parameter_sf),
    )?;
    Ok(Some(ConditionalOrder {
      condition,
      opportunity,
      min_execution_bonus_bps: state.min_execution_bonus_bps,
      max_execution_bonus_bps: state.max_execution_bonus_bps,
    }))
  }

  pub fn to_state(&self) -> Result<ObligationOrder> {
    Ok(ObligationOrder {
      condition_threshold_sf: Fraction::from_decimal(self.condition.threshold())?
        .to_bits(),
      opportunity_parameter_sf: self.opportunity.parameter().to_bits(),
      min_execution_bonus_bps: self.min_execution_bonus_bps,
      max_execution_bonus_bps: self.max_execution_bonus_bps,
      condition_type: self.condition.type_id(),
      opportunity_type: self.opportunity.type_id(),
      ..ObligationOrder::NULL
    })
  }

  /// Bonus rate offered for a fill at the given hit, interpolated linearly
  /// between the configured min and max.
  pub fn execution_bonus_rate(&self, hit: &ConditionHit) -> Result<Decimal> {
    let min = bps_to_rate(self.min_execution_bonus_bps);
    let max = bps_to_rate(self.max_execution_bonus_bps);
    max
      .checked_sub(min)
      .and_then(|spread| {
        spread.checked_mul(hit.normalized_distance_from_threshold)
      })
      .and_then(|bonus| bonus.checked_add(min))
      .ok_or(Arithmetic("execution bonus"))
  }

  #[must_use]
  pub fn at_index(self, order_type: OrderType) -> ObligationOrderAtIndex {
    ObligationOrderAtIndex {
      index: order_type.index(),
      order: Some(self),
    }
  }
}

/// An order bound to its slot, `None` meaning "cancel".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObligationOrderAtIndex {
  pub index: u8,
  pub order: Option<ConditionalOrder>,
}

impl ObligationOrderAtIndex {
  #[must_use]
  pub fn empty(order_type: OrderType) -> Self {
    ObligationOrderAtIndex {
      index: order_type.index(),
      order: None,
    }
  }

  /// Raw slot contents for `set_obligation_order`.
  pub fn order_state(&self) -> Result<ObligationOrder> {
    self
      .order
      .as_ref()
      .map_or(Ok(ObligationOrder::NULL), ConditionalOrder::to_state)
  }
}

/// Lifecycle of an order slot as seen from the client.
///
/// Filling happens on-chain, so a slot observed here is either empty, set
/// and waiting, or set with its condition currently met.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
  Unset,
  Pending(ConditionalOrder),
  Triggered(ConditionalOrder, ConditionHit),
}

/// Reports the status of the order in the given slot.
pub fn order_status(
  context: &OrderContext,
  order_type: OrderType,
) -> Result<OrderStatus> {
  let Some(order) = context.order(order_type)? else {
    return Ok(OrderStatus::Unset);
  };
  Ok(match order.condition.evaluate(context)? {
    Some(hit) => OrderStatus::Triggered(order, hit),
    None => OrderStatus::Pending(order),
  })
}

// ============================================================================
// High-level specification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
  /// Repay all debt.
  FullRepay,
  /// Repay a fixed amount of the single debt.
  PartialRepay { repay_debt_amount_lamports: u64 },
}

/// What the user asks for: a trigger in their own terms, an action and the
/// bonus range offered to fillers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSpecification<T> {
  pub trigger: T,
  pub action: OrderAction,
  pub execution_bonus_bps_range: (u16, u16),
}

/// A deposit or borrow as seen by the order engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionEntry {
  pub reserve: Pubkey,
  /// Liquidity amount, not collateral tokens.
  pub amount_lamports: u64,
  pub decimals: u8,
  pub market_value: Decimal,
  /// Reserve's loan-to-value percentage. Only meaningful on deposits.
  pub loan_to_value_pct: u8,
}

impl PositionEntry {
  /// Price of one whole token in the market's quote currency.
  fn token_price(&self) -> Result<Decimal> {
    check_that(self.amount_lamports > 0, || {
      format!("cannot price empty position in reserve {}", self.reserve)
    })?;
    self
      .market_value
      .checked_mul(mint_factor(self.decimals)?)
      .and_then(|v| v.checked_div(Decimal::from(self.amount_lamports)))
      .ok_or(Arithmetic("token price"))
  }
}

/// Refreshed obligation state an order is created against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderContext {
  pub deposits: Vec<PositionEntry>,
  pub borrows: Vec<PositionEntry>,
  /// Borrow-factor-adjusted debt over deposit value.
  pub loan_to_value: Decimal,
  /// Unhealthy borrow value over deposit value.
  pub liquidation_ltv: Decimal,
  pub orders: [ObligationOrder; 2],
}

impl OrderContext {
  pub fn order(&self, order_type: OrderType) -> Result<Option<ConditionalOrder>> {
    ConditionalOrder::from_state(&self.orders[usize::from(order_type.index())])
  }

  pub fn single_deposit(&self) -> Result<&PositionEntry> {
    single(&self.deposits, "deposit")
  }

  pub fn single_borrow(&self) -> Result<&PositionEntry> {
    single(&self.borrows, "borrow")
  }

  pub fn debt_coll_price_ratio(&self) -> Result<Decimal> {
    let debt_price = self.single_borrow()?.token_price()?;
    let coll_price = self.single_deposit()?.token_price()?;
    debt_price
      .checked_div(coll_price)
      .ok_or(Arithmetic("debt/coll price ratio"))
  }
}

// ============================================================================
// Shared creation and reading
// ============================================================================

fn single<'a>(
  entries: &'a [PositionEntry],
  kind: &str,
) -> Result<&'a PositionEntry> {
  match entries {
    [entry] => Ok(entry),
    _ => Err(InvalidOrderSpec(format!(
      "expected a single {kind}, found {}",
      entries.len()
    ))),
  }
}

fn bps_to_rate(bps: u16) -> Decimal {
  Decimal::new(i64::from(bps), 4)
}

fn evaluate_stop_loss(
  current: Decimal,
  threshold: Decimal,
  liquidation_threshold: Decimal,
) -> Result<Option<ConditionHit>> {
  if current <= threshold {
    return Ok(None);
  }
  let normalized_distance_from_threshold = if threshold >= liquidation_threshold
  {
    Decimal::ONE
  } else {
    (current - threshold)
      .checked_div(liquidation_threshold - threshold)
      .ok_or(Arithmetic("stop-loss distance"))?
      .min(Decimal::ONE)
  };
  Ok(Some(ConditionHit {
    normalized_distance_from_threshold,
  }))
}

fn evaluate_take_profit(
  current: Decimal,
  threshold: Decimal,
) -> Result<Option<ConditionHit>> {
  if current >= threshold {
    return Ok(None);
  }
  let normalized_distance_from_threshold = (threshold - current)
    .checked_div(threshold)
    .ok_or(Arithmetic("take-profit distance"))?;
  Ok(Some(ConditionHit {
    normalized_distance_from_threshold,
  }))
}

fn create_condition_based_order<T>(
  context: &OrderContext,
  condition: OrderCondition,
  specification: &OrderSpecification<T>,
) -> Result<ConditionalOrder> {
  check_that(condition.evaluate(context)?.is_none(), || {
    "cannot create an immediately-triggered order".to_string()
  })?;
  let opportunity = to_opportunity(context, specification.action)?;
  let (min, max) = specification.execution_bonus_bps_range;
  check_that(min <= max, || {
    format!("max execution bonus {max} bps cannot be lower than min {min} bps")
  })?;
  check_that(max <= FULL_BPS, || {
    format!("max execution bonus {max} bps cannot exceed {FULL_BPS} bps")
  })?;
  Ok(ConditionalOrder {
    condition,
    opportunity,
    min_execution_bonus_bps: min,
    max_execution_bonus_bps: max,
  })
}

fn to_opportunity(
  context: &OrderContext,
  action: OrderAction,
) -> Result<OrderOpportunity> {
  match action {
    OrderAction::FullRepay => Ok(OrderOpportunity::DeleverageAllDebt),
    OrderAction::PartialRepay {
      repay_debt_amount_lamports,
    } => {
      check_that(repay_debt_amount_lamports > 0, || {
        "repay amount must be positive".to_string()
      })?;
      let borrowed = context.single_borrow()?.amount_lamports;
      check_that(repay_debt_amount_lamports <= borrowed, || {
        format!(
          "partial repay amount {repay_debt_amount_lamports} cannot exceed \
           the borrowed amount {borrowed}"
        )
      })?;
      Ok(OrderOpportunity::DeleverageDebtAmount {
        amount_lamports: repay_debt_amount_lamports,
      })
    }
  }
}

fn read_trigger_based_order<T>(
  order: &ConditionalOrder,
  trigger: T,
) -> OrderSpecification<T> {
  let action = match order.opportunity {
    OrderOpportunity::DeleverageAllDebt => OrderAction::FullRepay,
    OrderOpportunity::DeleverageDebtAmount { amount_lamports } => {
      OrderAction::PartialRepay {
        repay_debt_amount_lamports: amount_lamports,
      }
    }
  };
  OrderSpecification {
    trigger,
    action,
    execution_bonus_bps_range: (
      order.min_execution_bonus_bps,
      order.max_execution_bonus_bps,
    ),
  }
}

/// Rounds a threshold decoded from a scaled fraction back to the precision
/// a user would have entered.
fn round_threshold(value: Decimal) -> Result<Decimal> {
  value
    .round_sf(READ_SIGNIFICANT_DIGITS)
    .map(|rounded| rounded.normalize())
    .ok_or(Arithmetic("threshold rounding"))
}

fn invert(value: Decimal) -> Result<Decimal> {
  check_that(value > Decimal::ZERO, || {
    format!("price must be strictly positive, got {value}")
  })?;
  Decimal::ONE
    .checked_div(value)
    .ok_or(Arithmetic("price inversion"))
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  use anyhow::Result;
  use proptest::prelude::*;
  use rust_decimal_macros::dec;

  use crate::util::proptest::bonus_bps_range;

  pub const SOL_RESERVE: Pubkey = Pubkey::new_from_array([1; 32]);
  pub const USDC_RESERVE: Pubkey = Pubkey::new_from_array([2; 32]);

  /// 1 SOL at `sol_price` against 50 USDC, with liquidation at 85% LTV.
  pub fn long_sol_context(sol_price: Decimal) -> OrderContext {
    let deposit_value = sol_price;
    let debt_value = dec!(50);
    OrderContext {
      deposits: vec![PositionEntry {
        reserve: SOL_RESERVE,
        amount_lamports: 1_000_000_000,
        decimals: 9,
        market_value: deposit_value,
        loan_to_value_pct: 75,
      }],
      borrows: vec![PositionEntry {
        reserve: USDC_RESERVE,
        amount_lamports: 50_000_000,
        decimals: 6,
        market_value: debt_value,
        loan_to_value_pct: 0,
      }],
      loan_to_value: debt_value / deposit_value,
      liquidation_ltv: dec!(0.85),
      orders: [ObligationOrder::NULL; 2],
    }
  }

  #[test]
  fn null_slot_decodes_to_none() -> Result<()> {
    assert_eq!(ConditionalOrder::from_state(&ObligationOrder::NULL)?, None);
    assert_eq!(
      ObligationOrderAtIndex::empty(OrderType::TakeProfit).order_state()?,
      ObligationOrder::NULL
    );
    Ok(())
  }

  #[test]
  fn unknown_types_rejected() {
    let state = ObligationOrder {
      condition_type: 9,
      ..ObligationOrder::NULL
    };
    assert_eq!(
      ConditionalOrder::from_state(&state),
      Err(UnknownConditionType(9))
    );
    let state = ObligationOrder {
      condition_type: 1,
      opportunity_type: 7,
      ..ObligationOrder::NULL
    };
    assert_eq!(
      ConditionalOrder::from_state(&state),
      Err(UnknownOpportunityType(7))
    );
  }

  #[test]
  fn full_repay_stored_as_max_fraction() -> Result<()> {
    let order = ConditionalOrder {
      condition: OrderCondition::UserLtvAbove(dec!(0.5)),
      opportunity: OrderOpportunity::DeleverageAllDebt,
      min_execution_bonus_bps: 10,
      max_execution_bonus_bps: 20,
    };
    let state = order.to_state()?;
    assert_eq!(state.opportunity_parameter_sf, u128::MAX);
    assert_eq!(state.condition_type, 1);
    assert_eq!(state.opportunity_type, 1);
    assert_eq!(ConditionalOrder::from_state(&state)?, Some(order));
    Ok(())
  }

  #[test]
  fn borsh_layout_size() -> Result<()> {
    let mut bytes = Vec::new();
    ObligationOrder::NULL.serialize(&mut bytes)?;
    assert_eq!(bytes.len(), 16 + 16 + 2 + 2 + 1 + 1 + 10 + 5 * 16);
    Ok(())
  }

  #[test]
  fn stop_loss_distance_normalized() -> Result<()> {
    let hit = evaluate_stop_loss(dec!(0.8), dec!(0.7), dec!(0.9))?;
    assert_eq!(
      hit.map(|h| h.normalized_distance_from_threshold),
      Some(dec!(0.5))
    );
    assert_eq!(evaluate_stop_loss(dec!(0.7), dec!(0.7), dec!(0.9))?, None);
    Ok(())
  }

  #[test]
  fn bonus_interpolates_between_bounds() -> Result<()> {
    let order = ConditionalOrder {
      condition: OrderCondition::UserLtvAbove(dec!(0.7)),
      opportunity: OrderOpportunity::DeleverageAllDebt,
      min_execution_bonus_bps: 100,
      max_execution_bonus_bps: 300,
    };
    let hit = ConditionHit {
      normalized_distance_from_threshold: dec!(0.5),
    };
    assert_eq!(order.execution_bonus_rate(&hit)?, dec!(0.02));
    Ok(())
  }

  #[test]
  fn inverted_bonus_range_rejected() {
    let context = long_sol_context(dec!(150));
    let spec = OrderSpecification {
      trigger: (),
      action: OrderAction::FullRepay,
      execution_bonus_bps_range: (200, 100),
    };
    let order = create_condition_based_order(
      &context,
      OrderCondition::UserLtvAbove(dec!(0.7)),
      &spec,
    );
    assert!(matches!(order, Err(InvalidOrderSpec(_))));
  }

  #[test]
  fn partial_repay_bounded_by_debt() {
    let context = long_sol_context(dec!(150));
    for amount in [0, 50_000_001] {
      let spec = OrderSpecification {
        trigger: (),
        action: OrderAction::PartialRepay {
          repay_debt_amount_lamports: amount,
        },
        execution_bonus_bps_range: (0, 0),
      };
      let order = create_condition_based_order(
        &context,
        OrderCondition::UserLtvAbove(dec!(0.7)),
        &spec,
      );
      assert!(order.is_err(), "{amount}");
    }
  }

  proptest! {
    #[test]
    fn well_formed_bonus_range_accepted((min, max) in bonus_bps_range()) {
      let context = long_sol_context(dec!(150));
      let spec = OrderSpecification {
        trigger: (),
        action: OrderAction::FullRepay,
        execution_bonus_bps_range: (min, max),
      };
      let order = create_condition_based_order(
        &context,
        OrderCondition::UserLtvAbove(dec!(0.7)),
        &spec,
      ).unwrap();
      let state = order.to_state().unwrap();
      prop_assert_eq!(state.min_execution_bonus_bps, min);
      prop_assert_eq!(state.max_execution_bonus_bps, max);
    }
  }
}
