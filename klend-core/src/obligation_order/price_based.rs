//! Orders on price-based positions.
//!
//! A price-based position is a single-collateral, single-debt obligation
//! where exactly one side is a stablecoin: a long of the collateral token or a
//! short of the debt token. Triggers are expressed as prices of the volatile
//! token and stored as debt/collateral price ratios.

use anchor_lang::prelude::Pubkey;
use rust_decimal::Decimal;

use super::{
  create_condition_based_order, invert, read_trigger_based_order,
  round_threshold, ObligationOrderAtIndex, OrderCondition, OrderContext,
  OrderSpecification, OrderType,
};
use crate::error::ValidationError::InvalidOrderSpec;
use crate::error::{check_that, Result};

/// A trigger in terms of the volatile token's price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceBasedOrderTrigger {
  LongStopLoss { when_collateral_price_below: Decimal },
  LongTakeProfit { when_collateral_price_above: Decimal },
  ShortStopLoss { when_debt_price_above: Decimal },
  ShortTakeProfit { when_debt_price_below: Decimal },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PositionType {
  Long,
  Short,
}

/// Builds the slot update placing (or cancelling, for `None`) the given
/// order on a price-based position.
///
/// # Errors
/// - Obligation is not a single-pair position against exactly one stablecoin
/// - Trigger kind does not match the position and order type
/// - Order would trigger immediately
/// - Malformed bonus range or repay amount
pub fn create_price_based_order(
  context: &OrderContext,
  stablecoin_reserves: &[Pubkey],
  order_type: OrderType,
  specification: Option<&OrderSpecification<PriceBasedOrderTrigger>>,
) -> Result<ObligationOrderAtIndex> {
  let position_type = resolve_position_type(context, stablecoin_reserves)?;
  let Some(specification) = specification else {
    return Ok(ObligationOrderAtIndex::empty(order_type));
  };
  let condition =
    to_condition(position_type, order_type, specification.trigger)?;
  Ok(
    create_condition_based_order(context, condition, specification)?
      .at_index(order_type),
  )
}

/// Reads the order in the given slot back into its price-based form.
///
/// # Errors
/// - Obligation is not a price-based position
/// - Stored condition does not match the position and order type
pub fn read_price_based_order(
  context: &OrderContext,
  stablecoin_reserves: &[Pubkey],
  order_type: OrderType,
) -> Result<Option<OrderSpecification<PriceBasedOrderTrigger>>> {
  let position_type = resolve_position_type(context, stablecoin_reserves)?;
  let Some(order) = context.order(order_type)? else {
    return Ok(None);
  };
  let trigger = to_trigger(position_type, order_type, order.condition)?;
  Ok(Some(read_trigger_based_order(&order, trigger)))
}

fn resolve_position_type(
  context: &OrderContext,
  stablecoin_reserves: &[Pubkey],
) -> Result<PositionType> {
  let collateral = context.single_deposit()?.reserve;
  let debt = context.single_borrow()?.reserve;
  let debt_is_stable = stablecoin_reserves.contains(&debt);
  if stablecoin_reserves.contains(&collateral) {
    check_that(!debt_is_stable, || {
      "cannot resolve long vs short from an all-stablecoin obligation"
        .to_string()
    })?;
    Ok(PositionType::Short)
  } else {
    check_that(debt_is_stable, || {
      "cannot resolve long vs short from a no-stablecoin obligation"
        .to_string()
    })?;
    Ok(PositionType::Long)
  }
}

fn to_condition(
  position_type: PositionType,
  order_type: OrderType,
  trigger: PriceBasedOrderTrigger,
) -> Result<OrderCondition> {
  use PriceBasedOrderTrigger::{
    LongStopLoss, LongTakeProfit, ShortStopLoss, ShortTakeProfit,
  };
  match (position_type, order_type, trigger) {
    (
      PositionType::Long,
      OrderType::StopLoss,
      LongStopLoss {
        when_collateral_price_below,
      },
    ) => Ok(OrderCondition::DebtCollPriceRatioAbove(invert(
      when_collateral_price_below,
    )?)),
    (
      PositionType::Long,
      OrderType::TakeProfit,
      LongTakeProfit {
        when_collateral_price_above,
      },
    ) => Ok(OrderCondition::DebtCollPriceRatioBelow(invert(
      when_collateral_price_above,
    )?)),
    (
      PositionType::Short,
      OrderType::StopLoss,
      ShortStopLoss {
        when_debt_price_above,
      },
    ) => Ok(OrderCondition::DebtCollPriceRatioAbove(when_debt_price_above)),
    (
      PositionType::Short,
      OrderType::TakeProfit,
      ShortTakeProfit {
        when_debt_price_below,
      },
    ) => Ok(OrderCondition::DebtCollPriceRatioBelow(when_debt_price_below)),
    (position_type, order_type, trigger) => Err(InvalidOrderSpec(format!(
      "a {order_type} order on a {position_type:?} position cannot use \
       {trigger:?}"
    ))),
  }
}

fn to_trigger(
  position_type: PositionType,
  order_type: OrderType,
  condition: OrderCondition,
) -> Result<PriceBasedOrderTrigger> {
  use PriceBasedOrderTrigger::{
    LongStopLoss, LongTakeProfit, ShortStopLoss, ShortTakeProfit,
  };
  match (position_type, order_type, condition) {
    (
      PositionType::Long,
      OrderType::StopLoss,
      OrderCondition::DebtCollPriceRatioAbove(ratio),
    ) => Ok(LongStopLoss {
      when_collateral_price_below: round_threshold(invert(ratio)?)?,
    }),
    (
      PositionType::Long,
      OrderType::TakeProfit,
      OrderCondition::DebtCollPriceRatioBelow(ratio),
    ) => Ok(LongTakeProfit {
      when_collateral_price_above: round_threshold(invert(ratio)?)?,
    }),
    (
      PositionType::Short,
      OrderType::StopLoss,
      OrderCondition::DebtCollPriceRatioAbove(ratio),
    ) => Ok(ShortStopLoss {
      when_debt_price_above: round_threshold(ratio)?,
    }),
    (
      PositionType::Short,
      OrderType::TakeProfit,
      OrderCondition::DebtCollPriceRatioBelow(ratio),
    ) => Ok(ShortTakeProfit {
      when_debt_price_below: round_threshold(ratio)?,
    }),
    (position_type, order_type, condition) => Err(InvalidOrderSpec(format!(
      "a {order_type} order on a {position_type:?} position has an \
       incompatible on-chain condition {condition:?}"
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use anyhow::Result;
  use proptest::prelude::*;
  use rust_decimal_macros::dec;

  use crate::obligation_order::tests::{
    long_sol_context, SOL_RESERVE, USDC_RESERVE,
  };
  use crate::obligation_order::{
    order_status, ObligationOrder, OrderAction, OrderStatus, PositionEntry,
  };
  use crate::util::proptest::{bonus_bps_range, coll_price};

  const STABLES: [Pubkey; 1] = [USDC_RESERVE];

  fn stop_loss_below(price: Decimal) -> OrderSpecification<PriceBasedOrderTrigger> {
    OrderSpecification {
      trigger: PriceBasedOrderTrigger::LongStopLoss {
        when_collateral_price_below: price,
      },
      action: OrderAction::FullRepay,
      execution_bonus_bps_range: (50, 300),
    }
  }

  fn place(
    context: &mut OrderContext,
    order_type: OrderType,
    at_index: &ObligationOrderAtIndex,
  ) -> Result<()> {
    assert_eq!(at_index.index, order_type.index());
    context.orders[usize::from(at_index.index)] = at_index.order_state()?;
    Ok(())
  }

  /// 1000 USDC deposited against 2 SOL borrowed at `sol_price`.
  fn short_sol_context(sol_price: Decimal) -> OrderContext {
    let debt_value = sol_price * dec!(2);
    OrderContext {
      deposits: vec![PositionEntry {
        reserve: USDC_RESERVE,
        amount_lamports: 1_000_000_000,
        decimals: 6,
        market_value: dec!(1000),
        loan_to_value_pct: 80,
      }],
      borrows: vec![PositionEntry {
        reserve: SOL_RESERVE,
        amount_lamports: 2_000_000_000,
        decimals: 9,
        market_value: debt_value,
        loan_to_value_pct: 0,
      }],
      loan_to_value: debt_value / dec!(1000),
      liquidation_ltv: dec!(0.9),
      orders: [ObligationOrder::NULL; 2],
    }
  }

  #[test]
  fn stop_loss_below_120_stays_unfilled_at_150() -> Result<()> {
    let mut context = long_sol_context(dec!(150));
    let spec = stop_loss_below(dec!(120));
    let at_index = create_price_based_order(
      &context,
      &STABLES,
      OrderType::StopLoss,
      Some(&spec),
    )?;
    place(&mut context, OrderType::StopLoss, &at_index)?;

    let read =
      read_price_based_order(&context, &STABLES, OrderType::StopLoss)?;
    assert_eq!(read, Some(spec));
    assert!(matches!(
      order_status(&context, OrderType::StopLoss)?,
      OrderStatus::Pending(_)
    ));
    assert_eq!(
      read_price_based_order(&context, &STABLES, OrderType::TakeProfit)?,
      None
    );
    Ok(())
  }

  #[test]
  fn stop_loss_triggers_once_price_drops() -> Result<()> {
    let mut context = long_sol_context(dec!(150));
    let at_index = create_price_based_order(
      &context,
      &STABLES,
      OrderType::StopLoss,
      Some(&stop_loss_below(dec!(120))),
    )?;
    place(&mut context, OrderType::StopLoss, &at_index)?;

    let mut dropped = long_sol_context(dec!(100));
    dropped.orders = context.orders;
    match order_status(&dropped, OrderType::StopLoss)? {
      OrderStatus::Triggered(_, hit) => {
        assert!(hit.normalized_distance_from_threshold > Decimal::ZERO);
        assert!(hit.normalized_distance_from_threshold <= Decimal::ONE);
      }
      other => panic!("unexpected {other:?}"),
    }
    Ok(())
  }

  #[test]
  fn immediately_triggered_order_rejected() {
    let context = long_sol_context(dec!(100));
    let order = create_price_based_order(
      &context,
      &STABLES,
      OrderType::StopLoss,
      Some(&stop_loss_below(dec!(120))),
    );
    assert!(matches!(order, Err(InvalidOrderSpec(_))));
  }

  #[test]
  fn trigger_direction_must_match_order_type() {
    let context = long_sol_context(dec!(150));
    let spec = OrderSpecification {
      trigger: PriceBasedOrderTrigger::LongTakeProfit {
        when_collateral_price_above: dec!(200),
      },
      action: OrderAction::FullRepay,
      execution_bonus_bps_range: (0, 100),
    };
    let order = create_price_based_order(
      &context,
      &STABLES,
      OrderType::StopLoss,
      Some(&spec),
    );
    assert!(matches!(order, Err(InvalidOrderSpec(_))));

    let short_trigger_on_long = OrderSpecification {
      trigger: PriceBasedOrderTrigger::ShortStopLoss {
        when_debt_price_above: dec!(200),
      },
      ..spec
    };
    let order = create_price_based_order(
      &context,
      &STABLES,
      OrderType::StopLoss,
      Some(&short_trigger_on_long),
    );
    assert!(matches!(order, Err(InvalidOrderSpec(_))));
  }

  #[test]
  fn cancel_yields_empty_slot() -> Result<()> {
    let context = long_sol_context(dec!(150));
    let at_index = create_price_based_order(
      &context,
      &STABLES,
      OrderType::TakeProfit,
      None,
    )?;
    assert_eq!(at_index.index, 1);
    assert_eq!(at_index.order_state()?, ObligationOrder::NULL);
    Ok(())
  }

  #[test]
  fn all_stablecoin_obligation_rejected() {
    let context = long_sol_context(dec!(150));
    let order = create_price_based_order(
      &context,
      &[SOL_RESERVE, USDC_RESERVE],
      OrderType::StopLoss,
      Some(&stop_loss_below(dec!(120))),
    );
    assert!(matches!(order, Err(InvalidOrderSpec(_))));
  }

  #[test]
  fn short_take_profit_round_trip() -> Result<()> {
    let mut context = short_sol_context(dec!(150));
    let spec = OrderSpecification {
      trigger: PriceBasedOrderTrigger::ShortTakeProfit {
        when_debt_price_below: dec!(95.5),
      },
      action: OrderAction::PartialRepay {
        repay_debt_amount_lamports: 500_000_000,
      },
      execution_bonus_bps_range: (10, 10),
    };
    let at_index = create_price_based_order(
      &context,
      &STABLES,
      OrderType::TakeProfit,
      Some(&spec),
    )?;
    place(&mut context, OrderType::TakeProfit, &at_index)?;
    assert_eq!(
      read_price_based_order(&context, &STABLES, OrderType::TakeProfit)?,
      Some(spec)
    );
    Ok(())
  }

  proptest! {
    #[test]
    fn long_orders_round_trip(
      price in coll_price(),
      bonus in bonus_bps_range(),
      partial in 1u64..=50_000_000,
    ) {
      for (order_type, trigger, current) in [
        (
          OrderType::StopLoss,
          PriceBasedOrderTrigger::LongStopLoss {
            when_collateral_price_below: price,
          },
          price * dec!(2),
        ),
        (
          OrderType::TakeProfit,
          PriceBasedOrderTrigger::LongTakeProfit {
            when_collateral_price_above: price,
          },
          price / dec!(2),
        ),
      ] {
        let mut context = long_sol_context(current);
        let spec = OrderSpecification {
          trigger,
          action: OrderAction::PartialRepay {
            repay_debt_amount_lamports: partial,
          },
          execution_bonus_bps_range: bonus,
        };
        let at_index = create_price_based_order(
          &context,
          &STABLES,
          order_type,
          Some(&spec),
        ).unwrap();
        place(&mut context, order_type, &at_index).unwrap();
        let read = read_price_based_order(&context, &STABLES, order_type)
          .unwrap();
        prop_assert_eq!(read, Some(spec));
      }
    }
  }
}
