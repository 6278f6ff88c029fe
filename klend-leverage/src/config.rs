//! Engine tuning knobs, overridable from JSON.

use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Most compute units a single transaction may request.
pub const MAX_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeverageConfig {
  /// Requested compute units, clamped to [`MAX_COMPUTE_UNIT_LIMIT`].
  pub compute_unit_limit: u32,
  pub compute_unit_price_micro_lamports: u64,
  /// Headroom added to the first quote's input amount.
  pub quote_buffer_bps: u16,
  /// Oldest reserve update, in slots before the current one, a decrease
  /// will convert withdrawn liquidity against.
  pub withdraw_slot_offset: u64,
  /// Accepted leverage overshoot when checking a plan.
  pub leverage_tolerance: Decimal,
  pub simulation_timeout_ms: u64,
  /// Transaction account slots kept free beyond those reserved by klend.
  pub account_safety_buffer: usize,
  /// Accepted drift between the caller's position amounts and the fetched
  /// obligation, e.g. interest accrued since the caller's read.
  pub position_tolerance_bps: u16,
}

impl Default for LeverageConfig {
  fn default() -> Self {
    LeverageConfig {
      compute_unit_limit: 3_000_000,
      compute_unit_price_micro_lamports: 0,
      quote_buffer_bps: 50,
      withdraw_slot_offset: 150,
      leverage_tolerance: Decimal::new(1, 3),
      simulation_timeout_ms: 10_000,
      account_safety_buffer: 4,
      position_tolerance_bps: 10,
    }
  }
}

impl LeverageConfig {
  /// Parses a JSON object; absent fields keep their defaults.
  ///
  /// # Errors
  /// - Malformed JSON or mistyped field
  pub fn from_json_str(json: &str) -> Result<Self> {
    Ok(serde_json::from_str(json)?)
  }

  #[must_use]
  pub fn effective_compute_unit_limit(&self) -> u32 {
    self.compute_unit_limit.min(MAX_COMPUTE_UNIT_LIMIT)
  }

  #[must_use]
  pub fn simulation_timeout(&self) -> std::time::Duration {
    std::time::Duration::from_millis(self.simulation_timeout_ms)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use rust_decimal_macros::dec;

  #[test]
  fn defaults() {
    let config = LeverageConfig::default();
    assert_eq!(config.compute_unit_limit, 3_000_000);
    assert_eq!(config.effective_compute_unit_limit(), MAX_COMPUTE_UNIT_LIMIT);
    assert_eq!(config.leverage_tolerance, dec!(0.001));
    assert_eq!(config.withdraw_slot_offset, 150);
    assert_eq!(config.position_tolerance_bps, 10);
  }

  #[test]
  fn partial_override() -> Result<()> {
    let config = LeverageConfig::from_json_str(
      r#"{ "quote_buffer_bps": 100, "compute_unit_limit": 600000 }"#,
    )?;
    assert_eq!(config.quote_buffer_bps, 100);
    assert_eq!(config.effective_compute_unit_limit(), 600_000);
    assert_eq!(config.simulation_timeout_ms, 10_000);
    Ok(())
  }

  #[test]
  fn rejects_mistyped_field() {
    assert!(
      LeverageConfig::from_json_str(r#"{ "quote_buffer_bps": "lots" }"#)
        .is_err()
    );
  }
}
