//! Orders triggered by the obligation's overall LTV.

use rust_decimal::Decimal;

use super::{
  create_condition_based_order, read_trigger_based_order, round_threshold,
  ObligationOrderAtIndex, OrderCondition, OrderContext, OrderSpecification,
  OrderType,
};
use crate::error::ValidationError::{Arithmetic, InvalidOrderSpec};
use crate::error::{check_that, Result};

const MIN_LTV_PCT: Decimal = Decimal::ONE;
const MAX_LTV_PCT: Decimal = Decimal::from_parts(99, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LtvBasedOrderTrigger {
  StopLoss { when_ltv_pct_above: Decimal },
  TakeProfit { when_ltv_pct_below: Decimal },
}

/// Builds the slot update placing (or cancelling, for `None`) an LTV-based
/// order.
///
/// # Errors
/// - Any deposit in a 0-LTV reserve
/// - Threshold outside `[1%, 99%]`
/// - Trigger kind does not match the order type
/// - Order would trigger immediately
pub fn create_ltv_based_order(
  context: &OrderContext,
  order_type: OrderType,
  specification: Option<&OrderSpecification<LtvBasedOrderTrigger>>,
) -> Result<ObligationOrderAtIndex> {
  check_compatible(context)?;
  let Some(specification) = specification else {
    return Ok(ObligationOrderAtIndex::empty(order_type));
  };
  let condition = to_condition(order_type, specification.trigger)?;
  Ok(
    create_condition_based_order(context, condition, specification)?
      .at_index(order_type),
  )
}

/// Reads the order in the given slot back into its LTV-based form.
pub fn read_ltv_based_order(
  context: &OrderContext,
  order_type: OrderType,
) -> Result<Option<OrderSpecification<LtvBasedOrderTrigger>>> {
  check_compatible(context)?;
  let Some(order) = context.order(order_type)? else {
    return Ok(None);
  };
  let trigger = to_trigger(order_type, order.condition)?;
  Ok(Some(read_trigger_based_order(&order, trigger)))
}

/// 0-LTV collateral is counted differently by the program's LTV, so orders
/// on such obligations would fire at unexpected levels.
fn check_compatible(context: &OrderContext) -> Result<()> {
  context.deposits.iter().try_for_each(|deposit| {
    check_that(deposit.loan_to_value_pct != 0, || {
      format!(
        "LTV-based orders cannot be used with 0-LTV collateral in reserve {}",
        deposit.reserve
      )
    })
  })
}

fn to_condition(
  order_type: OrderType,
  trigger: LtvBasedOrderTrigger,
) -> Result<OrderCondition> {
  let (pct, condition): (Decimal, fn(Decimal) -> OrderCondition) =
    match (order_type, trigger) {
      (
        OrderType::StopLoss,
        LtvBasedOrderTrigger::StopLoss { when_ltv_pct_above },
      ) => (when_ltv_pct_above, OrderCondition::UserLtvAbove),
      (
        OrderType::TakeProfit,
        LtvBasedOrderTrigger::TakeProfit { when_ltv_pct_below },
      ) => (when_ltv_pct_below, OrderCondition::UserLtvBelow),
      (order_type, trigger) => {
        return Err(InvalidOrderSpec(format!(
          "an LTV-based {order_type} order cannot use {trigger:?}"
        )))
      }
    };
  check_that((MIN_LTV_PCT..=MAX_LTV_PCT).contains(&pct), || {
    format!(
      "LTV-based trigger outside valid range [{MIN_LTV_PCT}%; {MAX_LTV_PCT}%]: \
       {pct}%"
    )
  })?;
  let ratio = pct
    .checked_div(Decimal::ONE_HUNDRED)
    .ok_or(Arithmetic("ltv ratio"))?;
  Ok(condition(ratio))
}

fn to_trigger(
  order_type: OrderType,
  condition: OrderCondition,
) -> Result<LtvBasedOrderTrigger> {
  let to_pct = |ratio: Decimal| {
    ratio
      .checked_mul(Decimal::ONE_HUNDRED)
      .ok_or(Arithmetic("ltv percentage"))
      .and_then(round_threshold)
  };
  match (order_type, condition) {
    (OrderType::StopLoss, OrderCondition::UserLtvAbove(ratio)) => {
      Ok(LtvBasedOrderTrigger::StopLoss {
        when_ltv_pct_above: to_pct(ratio)?,
      })
    }
    (OrderType::TakeProfit, OrderCondition::UserLtvBelow(ratio)) => {
      Ok(LtvBasedOrderTrigger::TakeProfit {
        when_ltv_pct_below: to_pct(ratio)?,
      })
    }
    (order_type, condition) => Err(InvalidOrderSpec(format!(
      "an LTV-based {order_type} order has an incompatible on-chain \
       condition {condition:?}"
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use anyhow::Result;
  use proptest::prelude::*;
  use rust_decimal_macros::dec;

  use crate::obligation_order::tests::long_sol_context;
  use crate::obligation_order::OrderAction;
  use crate::util::proptest::ltv_pct;

  fn spec(trigger: LtvBasedOrderTrigger) -> OrderSpecification<LtvBasedOrderTrigger> {
    OrderSpecification {
      trigger,
      action: OrderAction::FullRepay,
      execution_bonus_bps_range: (100, 200),
    }
  }

  #[test]
  fn stop_loss_round_trip() -> Result<()> {
    // Current LTV is 50 / 150.
    let mut context = long_sol_context(dec!(150));
    let spec = spec(LtvBasedOrderTrigger::StopLoss {
      when_ltv_pct_above: dec!(70),
    });
    let at_index =
      create_ltv_based_order(&context, OrderType::StopLoss, Some(&spec))?;
    context.orders[0] = at_index.order_state()?;
    assert_eq!(
      read_ltv_based_order(&context, OrderType::StopLoss)?,
      Some(spec)
    );
    Ok(())
  }

  #[test]
  fn threshold_outside_range_rejected() {
    let context = long_sol_context(dec!(150));
    for pct in [dec!(0.5), dec!(99.5)] {
      let order = create_ltv_based_order(
        &context,
        OrderType::StopLoss,
        Some(&spec(LtvBasedOrderTrigger::StopLoss {
          when_ltv_pct_above: pct,
        })),
      );
      assert!(matches!(order, Err(InvalidOrderSpec(_))), "{pct}");
    }
  }

  #[test]
  fn zero_ltv_collateral_rejected() {
    let mut context = long_sol_context(dec!(150));
    context.deposits[0].loan_to_value_pct = 0;
    assert!(matches!(
      read_ltv_based_order(&context, OrderType::StopLoss),
      Err(InvalidOrderSpec(_))
    ));
  }

  #[test]
  fn take_profit_already_below_rejected() {
    // Current LTV is a third, so "below 40%" holds right away.
    let context = long_sol_context(dec!(150));
    let order = create_ltv_based_order(
      &context,
      OrderType::TakeProfit,
      Some(&spec(LtvBasedOrderTrigger::TakeProfit {
        when_ltv_pct_below: dec!(40),
      })),
    );
    assert!(matches!(order, Err(InvalidOrderSpec(_))));
  }

  #[test]
  fn mismatched_trigger_rejected() {
    let context = long_sol_context(dec!(150));
    let order = create_ltv_based_order(
      &context,
      OrderType::TakeProfit,
      Some(&spec(LtvBasedOrderTrigger::StopLoss {
        when_ltv_pct_above: dec!(70),
      })),
    );
    assert!(matches!(order, Err(InvalidOrderSpec(_))));
  }

  proptest! {
    #[test]
    fn take_profit_round_trip(pct in ltv_pct()) {
      let mut context = long_sol_context(dec!(150));
      // Keep the current LTV at or above any threshold.
      context.loan_to_value = dec!(0.995);
      let spec = spec(LtvBasedOrderTrigger::TakeProfit {
        when_ltv_pct_below: pct,
      });
      let at_index =
        create_ltv_based_order(&context, OrderType::TakeProfit, Some(&spec))
          .unwrap();
      context.orders[1] = at_index.order_state().unwrap();
      let read = read_ltv_based_order(&context, OrderType::TakeProfit).unwrap();
      prop_assert_eq!(read, Some(spec));
    }
  }
}
