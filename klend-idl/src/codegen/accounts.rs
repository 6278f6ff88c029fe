//! On-chain state of the lending program.
//!
//! Reserves are decoded up to the end of their oracle configuration, which
//! is everything the client reads; the remainder of the account is ignored.

use anchor_lang::error::ErrorCode;
use anchor_lang::prelude::*;
use anchor_lang::{AccountDeserialize, AccountSerialize, Discriminator};
use klend_core::error::{Result as MathResult, ValidationError::Arithmetic};
use klend_core::fraction::Fraction;
use rust_decimal::Decimal;

use super::types::{
  LastUpdate, ObligationCollateral, ObligationLiquidity, ObligationOrder,
  ReserveCollateral, ReserveConfig, ReserveLiquidity,
};

macro_rules! account_state {
  ($name:ident, [$($byte:literal),*]) => {
    impl Discriminator for $name {
      const DISCRIMINATOR: &'static [u8] = &[$($byte),*];
    }

    impl AccountDeserialize for $name {
      fn try_deserialize(buf: &mut &[u8]) -> anchor_lang::Result<Self> {
        if !buf.starts_with(Self::DISCRIMINATOR) {
          return Err(ErrorCode::AccountDiscriminatorMismatch.into());
        }
        Self::try_deserialize_unchecked(buf)
      }

      fn try_deserialize_unchecked(
        buf: &mut &[u8],
      ) -> anchor_lang::Result<Self> {
        let mut data = buf
          .get(Self::DISCRIMINATOR.len()..)
          .ok_or(ErrorCode::AccountDidNotDeserialize)?;
        AnchorDeserialize::deserialize(&mut data)
          .map_err(|_| ErrorCode::AccountDidNotDeserialize.into())
      }
    }

    impl AccountSerialize for $name {
      fn try_serialize<W: std::io::Write>(
        &self,
        writer: &mut W,
      ) -> anchor_lang::Result<()> {
        writer
          .write_all(Self::DISCRIMINATOR)
          .map_err(|_| ErrorCode::AccountDidNotSerialize)?;
        AnchorSerialize::serialize(self, writer)
          .map_err(|_| ErrorCode::AccountDidNotSerialize.into())
      }
    }
  };
}

// ============================================================================
// Obligation
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, AnchorSerialize, AnchorDeserialize)]
pub struct Obligation {
  pub tag: u64,
  pub last_update: LastUpdate,
  pub lending_market: Pubkey,
  pub owner: Pubkey,
  pub deposits: [ObligationCollateral; 8],
  pub lowest_reserve_deposit_liquidation_ltv: u64,
  pub deposited_value_sf: u128,
  pub borrows: [ObligationLiquidity; 5],
  pub borrow_factor_adjusted_debt_value_sf: u128,
  pub borrowed_assets_market_value_sf: u128,
  pub allowed_borrow_value_sf: u128,
  pub unhealthy_borrow_value_sf: u128,
  pub deposits_asset_tiers: [u8; 8],
  pub borrows_asset_tiers: [u8; 5],
  pub elevation_group: u8,
  pub num_of_obsolete_deposit_reserves: u8,
  pub has_debt: u8,
  pub referrer: Pubkey,
  pub borrowing_disabled: u8,
  pub autodeleverage_target_ltv_pct: u8,
  pub lowest_reserve_deposit_max_ltv_pct: u8,
  pub num_of_obsolete_borrow_reserves: u8,
  pub reserved: [u8; 4],
  pub highest_borrow_factor_pct: u64,
  pub autodeleverage_margin_call_started_timestamp: u64,
  pub orders: [ObligationOrder; 2],
  pub padding3: [u64; 93],
}

account_state!(Obligation, [168, 206, 141, 106, 88, 76, 172, 167]);

impl Obligation {
  pub fn active_deposits(&self) -> impl Iterator<Item = &ObligationCollateral> {
    self
      .deposits
      .iter()
      .filter(|d| d.deposit_reserve != Pubkey::default())
  }

  pub fn active_borrows(&self) -> impl Iterator<Item = &ObligationLiquidity> {
    self
      .borrows
      .iter()
      .filter(|b| b.borrow_reserve != Pubkey::default())
  }

  /// Reserves passed to `refresh_obligation`: deposits first, then borrows.
  #[must_use]
  pub fn refresh_reserves(&self) -> Vec<Pubkey> {
    self
      .active_deposits()
      .map(|d| d.deposit_reserve)
      .chain(self.active_borrows().map(|b| b.borrow_reserve))
      .collect()
  }

  #[must_use]
  pub fn deposit(&self, reserve: &Pubkey) -> Option<&ObligationCollateral> {
    self.active_deposits().find(|d| d.deposit_reserve == *reserve)
  }

  #[must_use]
  pub fn borrow(&self, reserve: &Pubkey) -> Option<&ObligationLiquidity> {
    self.active_borrows().find(|b| b.borrow_reserve == *reserve)
  }

  /// Collateral tokens deposited in the given reserve.
  #[must_use]
  pub fn deposited_collateral(&self, reserve: &Pubkey) -> u64 {
    self.deposit(reserve).map_or(0, |d| d.deposited_amount)
  }

  /// Debt owed to the given reserve, rounded up to whole lamports.
  #[must_use]
  pub fn borrowed_lamports(&self, reserve: &Pubkey) -> u64 {
    self.borrow(reserve).map_or(0, |b| {
      Fraction::from_bits(b.borrowed_amount_sf).to_lamports_ceil()
    })
  }

  /// Borrow-factor adjusted debt over deposited value, as of the last
  /// refresh. Zero for an obligation without deposits.
  pub fn loan_to_value(&self) -> MathResult<Decimal> {
    value_ratio(
      self.borrow_factor_adjusted_debt_value_sf,
      self.deposited_value_sf,
    )
  }

  /// LTV at which the obligation becomes liquidatable.
  pub fn liquidation_ltv(&self) -> MathResult<Decimal> {
    value_ratio(self.unhealthy_borrow_value_sf, self.deposited_value_sf)
  }

  #[must_use]
  pub fn has_debt(&self) -> bool {
    self.has_debt != 0 || self.active_borrows().next().is_some()
  }
}

fn value_ratio(numerator_sf: u128, denominator_sf: u128) -> MathResult<Decimal> {
  if denominator_sf == 0 {
    return Ok(Decimal::ZERO);
  }
  let numerator = Fraction::from_bits(numerator_sf).to_decimal()?;
  let denominator = Fraction::from_bits(denominator_sf).to_decimal()?;
  numerator
    .checked_div(denominator)
    .ok_or(Arithmetic("value ratio"))
}

// ============================================================================
// Reserve
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, AnchorSerialize, AnchorDeserialize)]
pub struct Reserve {
  pub version: u64,
  pub last_update: LastUpdate,
  pub lending_market: Pubkey,
  pub farm_collateral: Pubkey,
  pub farm_debt: Pubkey,
  pub liquidity: ReserveLiquidity,
  pub reserve_liquidity_padding: [u64; 150],
  pub collateral: ReserveCollateral,
  pub reserve_collateral_padding: [u64; 150],
  pub config: ReserveConfig,
}

account_state!(Reserve, [43, 242, 204, 202, 26, 247, 59, 127]);

impl Reserve {
  #[must_use]
  pub fn mint(&self) -> Pubkey {
    self.liquidity.mint_pubkey
  }

  #[must_use]
  pub fn token_program(&self) -> Pubkey {
    self.liquidity.token_program
  }

  /// Mint decimals, saturating for malformed reserves.
  #[must_use]
  pub fn decimals(&self) -> u8 {
    u8::try_from(self.liquidity.mint_decimals).unwrap_or(u8::MAX)
  }

  #[must_use]
  pub fn collateral_farm(&self) -> Option<Pubkey> {
    non_default(self.farm_collateral)
  }

  #[must_use]
  pub fn debt_farm(&self) -> Option<Pubkey> {
    non_default(self.farm_debt)
  }

  #[must_use]
  pub fn pyth_oracle(&self) -> Option<Pubkey> {
    non_default(self.config.token_info.pyth_configuration.price)
  }

  #[must_use]
  pub fn switchboard_price_oracle(&self) -> Option<Pubkey> {
    non_default(
      self
        .config
        .token_info
        .switchboard_configuration
        .price_aggregator,
    )
  }

  #[must_use]
  pub fn switchboard_twap_oracle(&self) -> Option<Pubkey> {
    non_default(
      self
        .config
        .token_info
        .switchboard_configuration
        .twap_aggregator,
    )
  }

  #[must_use]
  pub fn scope_prices(&self) -> Option<Pubkey> {
    non_default(self.config.token_info.scope_configuration.price_feed)
  }

  /// Flash loan fee as a rate, e.g. `0.001` for 10 bps.
  pub fn flash_loan_fee(&self) -> MathResult<Decimal> {
    Fraction::from_bits(u128::from(self.config.fees.flash_loan_fee_sf))
      .to_decimal()
  }

  /// Liquidity owned by collateral holders: available plus borrowed, net of
  /// accrued fees.
  #[must_use]
  pub fn total_liquidity(&self) -> Fraction {
    let liquidity = &self.liquidity;
    let gross = Fraction::from_lamports(liquidity.available_amount)
      .to_bits()
      .saturating_add(liquidity.borrowed_amount_sf);
    Fraction::from_bits(
      gross
        .saturating_sub(liquidity.accumulated_protocol_fees_sf)
        .saturating_sub(liquidity.accumulated_referrer_fees_sf)
        .saturating_sub(liquidity.pending_referrer_fees_sf),
    )
  }

  /// Collateral tokens minted per unit of liquidity. 1 for an empty
  /// reserve.
  pub fn collateral_exchange_rate(&self) -> MathResult<Decimal> {
    let total = self.total_liquidity();
    if self.collateral.mint_total_supply == 0 || total == Fraction::ZERO {
      return Ok(Decimal::ONE);
    }
    Decimal::from(self.collateral.mint_total_supply)
      .checked_div(total.to_decimal()?)
      .ok_or(Arithmetic("collateral exchange rate"))
  }

  /// Collateral tokens redeemable for `liquidity_lamports`, rounded down.
  pub fn liquidity_to_collateral(
    &self,
    liquidity_lamports: u64,
  ) -> MathResult<u64> {
    let collateral = Decimal::from(liquidity_lamports)
      .checked_mul(self.collateral_exchange_rate()?)
      .ok_or(Arithmetic("liquidity to collateral"))?;
    u64::try_from(collateral.floor())
      .map_err(|_| Arithmetic("liquidity to collateral"))
  }

  /// Liquidity redeemed by `collateral_amount` collateral tokens, rounded
  /// down.
  pub fn collateral_to_liquidity(
    &self,
    collateral_amount: u64,
  ) -> MathResult<u64> {
    let liquidity = Decimal::from(collateral_amount)
      .checked_div(self.collateral_exchange_rate()?)
      .ok_or(Arithmetic("collateral to liquidity"))?;
    u64::try_from(liquidity.floor())
      .map_err(|_| Arithmetic("collateral to liquidity"))
  }

  /// Oracle price of one whole token in the market's quote currency.
  pub fn market_price(&self) -> MathResult<Decimal> {
    Fraction::from_bits(self.liquidity.market_price_sf).to_decimal()
  }
}

fn non_default(key: Pubkey) -> Option<Pubkey> {
  (key != Pubkey::default()).then_some(key)
}

// ============================================================================
// User metadata
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, AnchorSerialize, AnchorDeserialize)]
pub struct UserMetadata {
  pub referrer: Pubkey,
  pub bump: u64,
  pub user_lookup_table: Pubkey,
  pub owner: Pubkey,
  pub padding1: [u64; 51],
  pub padding2: [u64; 64],
}

account_state!(UserMetadata, [157, 214, 220, 235, 98, 135, 171, 28]);

#[cfg(test)]
mod tests {
  use super::*;

  use anyhow::Result;
  use rust_decimal_macros::dec;

  const OBLIGATION_SIZE: usize = 3344;
  const RESERVE_SIZE: usize = 8624;

  fn zeroed<T: Discriminator + AccountDeserialize>(size: usize) -> Result<T> {
    let mut bytes = vec![0; size];
    bytes[..8].copy_from_slice(T::DISCRIMINATOR);
    Ok(T::try_deserialize(&mut bytes.as_slice())?)
  }

  #[test]
  fn obligation_layout_fills_account() -> Result<()> {
    let obligation: Obligation = zeroed(OBLIGATION_SIZE)?;
    let mut bytes = Vec::new();
    obligation.try_serialize(&mut bytes)?;
    assert_eq!(bytes.len(), OBLIGATION_SIZE);
    Ok(())
  }

  #[test]
  fn wrong_discriminator_rejected() {
    let bytes = vec![0; OBLIGATION_SIZE];
    assert!(Obligation::try_deserialize(&mut bytes.as_slice()).is_err());
    let mut reserve = vec![0; RESERVE_SIZE];
    reserve[..8].copy_from_slice(Obligation::DISCRIMINATOR);
    assert!(Reserve::try_deserialize(&mut reserve.as_slice()).is_err());
  }

  #[test]
  fn truncated_account_rejected() {
    let bytes = Obligation::DISCRIMINATOR.to_vec();
    assert!(Obligation::try_deserialize(&mut bytes.as_slice()).is_err());
  }

  #[test]
  fn obligation_positions_and_ltv() -> Result<()> {
    let sol = Pubkey::new_unique();
    let usdc = Pubkey::new_unique();
    let mut obligation: Obligation = zeroed(OBLIGATION_SIZE)?;
    obligation.deposits[1].deposit_reserve = sol;
    obligation.deposits[1].deposited_amount = 1_000;
    obligation.borrows[0].borrow_reserve = usdc;
    obligation.borrows[0].borrowed_amount_sf =
      Fraction::from_lamports(50).to_bits() + 1;
    obligation.deposited_value_sf = Fraction::from_lamports(200).to_bits();
    obligation.borrow_factor_adjusted_debt_value_sf =
      Fraction::from_lamports(50).to_bits();
    obligation.unhealthy_borrow_value_sf = Fraction::from_lamports(170).to_bits();

    assert_eq!(obligation.refresh_reserves(), vec![sol, usdc]);
    assert_eq!(obligation.deposited_collateral(&sol), 1_000);
    assert_eq!(obligation.deposited_collateral(&usdc), 0);
    assert_eq!(obligation.borrowed_lamports(&usdc), 51);
    assert!(obligation.has_debt());
    assert_eq!(obligation.loan_to_value()?, dec!(0.25));
    assert_eq!(obligation.liquidation_ltv()?, dec!(0.85));
    Ok(())
  }

  #[test]
  fn empty_obligation_has_zero_ltv() -> Result<()> {
    let obligation: Obligation = zeroed(OBLIGATION_SIZE)?;
    assert_eq!(obligation.loan_to_value()?, Decimal::ZERO);
    assert!(!obligation.has_debt());
    assert!(obligation.refresh_reserves().is_empty());
    Ok(())
  }

  #[test]
  fn reserve_exchange_rate() -> Result<()> {
    let mut reserve: Reserve = zeroed(RESERVE_SIZE)?;
    assert_eq!(reserve.liquidity_to_collateral(1_000)?, 1_000);

    reserve.liquidity.available_amount = 800;
    reserve.liquidity.borrowed_amount_sf = Fraction::from_lamports(300).to_bits();
    reserve.liquidity.accumulated_protocol_fees_sf =
      Fraction::from_lamports(100).to_bits();
    reserve.collateral.mint_total_supply = 800;
    // 1000 liquidity backs 800 cTokens.
    assert_eq!(reserve.total_liquidity(), Fraction::from_lamports(1_000));
    assert_eq!(reserve.collateral_exchange_rate()?, dec!(0.8));
    assert_eq!(reserve.liquidity_to_collateral(1_001)?, 800);
    assert_eq!(reserve.collateral_to_liquidity(800)?, 1_000);
    Ok(())
  }

  #[test]
  fn reserve_optional_accounts() -> Result<()> {
    let mut reserve: Reserve = zeroed(RESERVE_SIZE)?;
    assert_eq!(reserve.collateral_farm(), None);
    assert_eq!(reserve.scope_prices(), None);
    let scope = Pubkey::new_unique();
    reserve.config.token_info.scope_configuration.price_feed = scope;
    reserve.config.fees.flash_loan_fee_sf =
      u64::try_from(Fraction::ONE.to_bits() / 1000)?;
    reserve.liquidity.mint_decimals = 9;
    assert_eq!(reserve.scope_prices(), Some(scope));
    assert_eq!(reserve.decimals(), 9);
    assert!((reserve.flash_loan_fee()? - dec!(0.001)).abs() < dec!(0.000001));
    Ok(())
  }
}
