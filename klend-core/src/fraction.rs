//! Scaled fractions as stored by the lending program.
//!
//! On-chain values suffixed `_sf` are unsigned 128-bit fixed point numbers
//! with 60 fractional bits.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::error::{Result, ValidationError::Arithmetic};

pub const FRACTION_BITS: u32 = 60;

const FRACTIONAL_MASK: u128 = (1 << FRACTION_BITS) - 1;

/// Raw scaled fraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fraction(u128);

impl Fraction {
  pub const ZERO: Fraction = Fraction(0);
  pub const ONE: Fraction = Fraction(1 << FRACTION_BITS);
  pub const MAX: Fraction = Fraction(u128::MAX);

  #[must_use]
  pub const fn from_bits(sf: u128) -> Fraction {
    Fraction(sf)
  }

  #[must_use]
  pub const fn to_bits(self) -> u128 {
    self.0
  }

  /// Whole lamport amount stored without a fractional part.
  #[must_use]
  pub const fn from_lamports(amount: u64) -> Fraction {
    Fraction((amount as u128) << FRACTION_BITS)
  }

  /// Integer part, saturating at `u64::MAX`.
  #[must_use]
  pub fn to_lamports_floor(self) -> u64 {
    u64::try_from(self.0 >> FRACTION_BITS).unwrap_or(u64::MAX)
  }

  /// Integer part rounded up when any fractional bits are set.
  #[must_use]
  pub fn to_lamports_ceil(self) -> u64 {
    let floor = self.to_lamports_floor();
    if self.0 & FRACTIONAL_MASK == 0 {
      floor
    } else {
      floor.saturating_add(1)
    }
  }

  /// Encodes a non-negative decimal, truncating bits beyond the 60th.
  pub fn from_decimal(value: Decimal) -> Result<Fraction> {
    if value.is_sign_negative() && !value.is_zero() {
      return Err(Arithmetic("negative fraction"));
    }
    let int = value.trunc();
    let frac = value - int;
    let int_bits = int
      .to_u128()
      .filter(|i| *i <= u128::MAX >> FRACTION_BITS)
      .map(|i| i << FRACTION_BITS)
      .ok_or(Arithmetic("fraction integer part"))?;
    let frac_bits = frac
      .checked_mul(one_decimal())
      .map(|scaled| scaled.trunc())
      .and_then(|scaled| scaled.to_u128())
      .ok_or(Arithmetic("fraction fractional part"))?;
    int_bits
      .checked_add(frac_bits)
      .map(Fraction)
      .ok_or(Arithmetic("fraction"))
  }

  /// Decodes into a decimal.
  ///
  /// `Decimal` holds 28 significant digits, so the result is within one
  /// 2^-60 step only while the integer part is small. Beyond that the error
  /// is bounded by the last representable digit, about `|value| * 1e-27`.
  pub fn to_decimal(self) -> Result<Decimal> {
    let int = Decimal::from_u128(self.0 >> FRACTION_BITS)
      .ok_or(Arithmetic("fraction to decimal"))?;
    let frac = Decimal::from_u128(self.0 & FRACTIONAL_MASK)
      .and_then(|bits| bits.checked_div(one_decimal()))
      .ok_or(Arithmetic("fraction to decimal"))?;
    int.checked_add(frac).ok_or(Arithmetic("fraction to decimal"))
  }
}

fn one_decimal() -> Decimal {
  Decimal::from(1u64 << FRACTION_BITS)
}

#[cfg(test)]
mod tests {
  use super::*;

  use anyhow::Result;
  use proptest::prelude::*;
  use rust_decimal_macros::dec;

  #[test]
  fn one_is_two_pow_sixty() -> Result<()> {
    assert_eq!(Fraction::ONE.to_bits(), 1_152_921_504_606_846_976);
    assert_eq!(Fraction::ONE.to_decimal()?, Decimal::ONE);
    assert_eq!(Fraction::from_decimal(Decimal::ONE)?, Fraction::ONE);
    Ok(())
  }

  #[test]
  fn half_is_exact() -> Result<()> {
    let half = Fraction::from_decimal(dec!(0.5))?;
    assert_eq!(half.to_bits(), 1 << 59);
    assert_eq!(half.to_decimal()?, dec!(0.5));
    Ok(())
  }

  #[test]
  fn max_decodes() -> Result<()> {
    let max = Fraction::MAX.to_decimal()?;
    assert!(max > dec!(295147905179352825855));
    Ok(())
  }

  #[test]
  fn lamports_ceil() {
    let sf = Fraction::from_bits((7u128 << FRACTION_BITS) + 1);
    assert_eq!(sf.to_lamports_floor(), 7);
    assert_eq!(sf.to_lamports_ceil(), 8);
    assert_eq!(Fraction::from_lamports(7).to_lamports_ceil(), 7);
  }

  /// One 2^-60 step plus the last digit `Decimal` can hold at this size.
  fn tolerance(value: Decimal) -> Decimal {
    Decimal::ONE / one_decimal() + value.abs() * Decimal::new(1, 27)
  }

  #[test]
  fn large_integer_part_round_trips_within_precision() -> Result<()> {
    let value = Decimal::from_i128_with_scale(480_561_479_156, 1);
    let back = Fraction::from_decimal(value)?.to_decimal()?;
    assert!((value - back).abs() <= tolerance(value), "{value} vs {back}");
    assert_eq!(back.trunc(), value.trunc());
    Ok(())
  }

  #[test]
  fn negative_rejected() {
    assert!(Fraction::from_decimal(dec!(-0.1)).is_err());
  }

  proptest! {
    #[test]
    fn lamports_survive(amount in any::<u64>()) {
      prop_assert_eq!(Fraction::from_lamports(amount).to_lamports_floor(), amount);
    }

    #[test]
    fn decimal_error_within_precision(
      mantissa in 1u64..1_000_000_000_000,
      scale in 0u32..12,
    ) {
      let value = Decimal::from_i128_with_scale(mantissa.into(), scale);
      let back = Fraction::from_decimal(value).unwrap().to_decimal().unwrap();
      prop_assert!((value - back).abs() <= tolerance(value));
    }
  }
}
