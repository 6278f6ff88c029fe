//! Lamport ⇄ token-unit conversions driven by a mint's decimals.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{Result, ValidationError::Arithmetic};

/// `10^decimals`, the number of lamports in one whole token.
pub fn mint_factor(decimals: u8) -> Result<Decimal> {
  10u64
    .checked_pow(decimals.into())
    .map(Decimal::from)
    .ok_or(Arithmetic("mint_factor"))
}

/// Exact conversion of a lamport amount into token units.
pub fn from_lamports(lamports: u64, decimals: u8) -> Result<Decimal> {
  Decimal::try_from_i128_with_scale(lamports.into(), decimals.into())
    .map(|amount| amount.normalize())
    .map_err(|_| Arithmetic("from_lamports"))
}

/// Token units to lamports, rounding toward zero.
pub fn to_lamports_floor(amount: Decimal, decimals: u8) -> Result<u64> {
  scale(amount, decimals)?
    .floor()
    .to_u64()
    .ok_or(Arithmetic("to_lamports_floor"))
}

/// Token units to lamports, rounding away from zero.
pub fn to_lamports_ceil(amount: Decimal, decimals: u8) -> Result<u64> {
  scale(amount, decimals)?
    .ceil()
    .to_u64()
    .ok_or(Arithmetic("to_lamports_ceil"))
}

fn scale(amount: Decimal, decimals: u8) -> Result<Decimal> {
  amount
    .checked_mul(mint_factor(decimals)?)
    .ok_or(Arithmetic("lamport scaling"))
}

#[cfg(test)]
mod tests {
  use super::*;

  use anyhow::Result;
  use rust_decimal_macros::dec;

  #[test]
  fn lamports_roundtrip_exact() -> Result<()> {
    let ui = from_lamports(1_234_567_891, 9)?;
    assert_eq!(ui, dec!(1.234567891));
    assert_eq!(to_lamports_floor(ui, 9)?, 1_234_567_891);
    Ok(())
  }

  #[test]
  fn rounding_directions() -> Result<()> {
    let amount = dec!(1.0000005);
    assert_eq!(to_lamports_floor(amount, 6)?, 1_000_000);
    assert_eq!(to_lamports_ceil(amount, 6)?, 1_000_001);
    Ok(())
  }

  #[test]
  fn negative_amount_rejected() {
    assert!(to_lamports_floor(dec!(-1), 6).is_err());
  }

  #[test]
  fn mint_factor_overflow() {
    assert!(mint_factor(20).is_err());
    assert_eq!(mint_factor(6), Ok(dec!(1_000_000)));
  }
}
