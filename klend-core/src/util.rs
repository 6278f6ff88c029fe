#[cfg(test)]
pub mod proptest {
  use proptest::prelude::*;
  use rust_decimal::Decimal;

  #[macro_export]
  macro_rules! eq_tolerance {
    ($l:expr, $r:expr, $tol:expr) => {{
      let diff: rust_decimal::Decimal = ($l - $r).abs();
      diff <= $tol
    }};
  }

  /// Collateral price in the debt token, from 0.0001 to 100k.
  pub fn coll_price() -> BoxedStrategy<Decimal> {
    (1u64..1_000_000_000u64)
      .prop_map(|raw| Decimal::new(raw.try_into().unwrap_or(i64::MAX), 4))
      .boxed()
  }

  /// Token amounts in lamports, at least one lamport.
  pub fn lamports() -> BoxedStrategy<u64> {
    (1u64..1_000_000_000_000_000u64).boxed()
  }

  /// Percentages with two decimal places within `[1, 99]`.
  pub fn ltv_pct() -> BoxedStrategy<Decimal> {
    (100i64..=9_900i64)
      .prop_map(|raw| Decimal::new(raw, 2))
      .boxed()
  }

  /// Well-formed execution bonus ranges.
  pub fn bonus_bps_range() -> BoxedStrategy<(u16, u16)> {
    (0u16..=10_000u16)
      .prop_flat_map(|min| (Just(min), min..=10_000u16))
      .boxed()
  }
}
