//! Sizing of leverage adjustments.
//!
//! Leverage is equity-normalized and measured in collateral terms:
//!   `leverage = collateral / (collateral - debt * price_debt_to_coll)`
//!
//! A debt-free position has leverage 1. Every plan is sized against the
//! swap's guaranteed minimum output, and every rounding step moves the result
//! toward lower leverage, so plans never overshoot their target by more than
//! lamport dust.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::conversion::{from_lamports, to_lamports_ceil, to_lamports_floor};
use crate::error::ValidationError::{
  AdjustmentTooSmall, Arithmetic, InvalidFlashLoanFee, InvalidLeverage,
  InvalidPrice, InvalidSlippage, NothingToDeleverage, StaleState,
  UnreachableLeverage, WithdrawExceedsCollateral,
};
use crate::error::Result;

/// Which way a position moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeverageDirection {
  /// Borrow debt, swap debt to collateral, deposit collateral.
  Increase,
  /// Withdraw collateral, swap collateral to debt, repay debt.
  Decrease,
}

impl LeverageDirection {
  #[must_use]
  pub const fn as_str(&self) -> &'static str {
    match self {
      LeverageDirection::Increase => "increase",
      LeverageDirection::Decrease => "decrease",
    }
  }
}

impl std::fmt::Display for LeverageDirection {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Liquidity amounts of a single-collateral, single-debt position, read
/// fresh from chain right before sizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionSnapshot {
  pub deposited_lamports: u64,
  pub borrowed_lamports: u64,
}

impl PositionSnapshot {
  #[must_use]
  pub fn new(deposited_lamports: u64, borrowed_lamports: u64) -> Self {
    PositionSnapshot {
      deposited_lamports,
      borrowed_lamports,
    }
  }
}

/// Conversion rates between the two sides of a position, in whole tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketPrices {
  /// Debt tokens per collateral token.
  pub price_coll_to_debt: Decimal,
  /// Collateral tokens per debt token.
  pub price_debt_to_coll: Decimal,
}

impl MarketPrices {
  #[must_use]
  pub fn new(price_coll_to_debt: Decimal, price_debt_to_coll: Decimal) -> Self {
    MarketPrices {
      price_coll_to_debt,
      price_debt_to_coll,
    }
  }

  /// Derives both legs from a collateral price quoted in the debt token.
  pub fn from_coll_price(price_coll_to_debt: Decimal) -> Result<Self> {
    check_price(price_coll_to_debt)?;
    let price_debt_to_coll = Decimal::ONE
      .checked_div(price_coll_to_debt)
      .ok_or(Arithmetic("price inversion"))?;
    Ok(MarketPrices::new(price_coll_to_debt, price_debt_to_coll))
  }

  /// Derives both legs from a swap quote of `A` in `B`, where `A` is the swap
  /// input for the given direction.
  pub fn from_swap_price(
    direction: LeverageDirection,
    price_a_in_b: Decimal,
  ) -> Result<Self> {
    check_price(price_a_in_b)?;
    let inverse = Decimal::ONE
      .checked_div(price_a_in_b)
      .ok_or(Arithmetic("price inversion"))?;
    Ok(match direction {
      LeverageDirection::Increase => MarketPrices::new(inverse, price_a_in_b),
      LeverageDirection::Decrease => MarketPrices::new(price_a_in_b, inverse),
    })
  }

  fn validate(&self) -> Result<()> {
    check_price(self.price_coll_to_debt)?;
    check_price(self.price_debt_to_coll)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDecimals {
  pub collateral: u8,
  pub debt: u8,
}

/// Everything that prices a swap between the two legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapTerms {
  pub prices: MarketPrices,
  /// Percentage, `0.5` means half a percent.
  pub slippage_pct: Decimal,
  /// Fee ratio charged by the flash-loan reserve, `0.001` means 10 bps.
  pub flash_loan_fee: Decimal,
  pub decimals: TokenDecimals,
}

impl SwapTerms {
  fn validate(&self) -> Result<()> {
    self.prices.validate()?;
    if self.slippage_pct.is_sign_negative()
      || self.slippage_pct >= Decimal::ONE_HUNDRED
    {
      return Err(InvalidSlippage(self.slippage_pct));
    }
    if self.flash_loan_fee.is_sign_negative()
      || self.flash_loan_fee >= Decimal::ONE
    {
      return Err(InvalidFlashLoanFee(self.flash_loan_fee));
    }
    Ok(())
  }

  /// `1 - slippage`, the guaranteed share of a swap's fair output.
  fn guaranteed_share(&self) -> Result<Decimal> {
    self
      .slippage_pct
      .checked_div(Decimal::ONE_HUNDRED)
      .and_then(|s| Decimal::ONE.checked_sub(s))
      .ok_or(Arithmetic("guaranteed share"))
  }

  /// `(1 - slippage) / (1 + fee)`, the share of a swap's fair output left
  /// after repaying the flash loan that funded it.
  fn retained_share(&self) -> Result<Decimal> {
    Decimal::ONE
      .checked_add(self.flash_loan_fee)
      .and_then(|fee_factor| self.guaranteed_share().ok()?.checked_div(fee_factor))
      .ok_or(Arithmetic("retained share"))
  }
}

/// Concrete amounts moving a position toward a leverage target.
///
/// On `Increase` the flash loan is drawn on the collateral reserve and the
/// swap goes debt to collateral. On `Decrease` the flash loan is drawn on the
/// debt reserve and the swap goes collateral to debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPlan {
  pub direction: LeverageDirection,
  /// Swap input amount.
  pub notional_to_swap_lamports: u64,
  /// Guaranteed minimum swap output. Sizing never relies on more than this.
  pub expected_output_lamports: u64,
  /// Flash-loan principal, repaid from the swap output.
  pub flash_borrow_lamports: u64,
  /// Collateral deposited on `Increase`, withdrawn on `Decrease`.
  pub collateral_lamports: u64,
  /// Debt borrowed on `Increase`, repaid on `Decrease`.
  pub debt_lamports: u64,
}

impl SwapPlan {
  /// Position after the plan executes at its guaranteed output.
  pub fn apply(&self, position: &PositionSnapshot) -> Result<PositionSnapshot> {
    let (deposited, borrowed) = match self.direction {
      LeverageDirection::Increase => (
        position
          .deposited_lamports
          .checked_add(self.collateral_lamports),
        position.borrowed_lamports.checked_add(self.debt_lamports),
      ),
      LeverageDirection::Decrease => (
        position
          .deposited_lamports
          .checked_sub(self.collateral_lamports),
        position.borrowed_lamports.checked_sub(self.debt_lamports),
      ),
    };
    deposited
      .zip(borrowed)
      .map(|(d, b)| PositionSnapshot::new(d, b))
      .ok_or(Arithmetic("plan application"))
  }
}

/// Leverage of a position, 1 when it has no debt.
///
/// # Errors
/// - Debt value reaching or exceeding collateral value
pub fn current_leverage(
  position: &PositionSnapshot,
  price_debt_to_coll: Decimal,
  decimals: TokenDecimals,
) -> Result<Decimal> {
  check_price(price_debt_to_coll)?;
  let deposited = from_lamports(position.deposited_lamports, decimals.collateral)?;
  let borrowed = from_lamports(position.borrowed_lamports, decimals.debt)?;
  leverage_of(deposited, borrowed, price_debt_to_coll)
}

/// Leverage after `plan` executes at its guaranteed output.
pub fn resulting_leverage(
  position: &PositionSnapshot,
  plan: &SwapPlan,
  price_debt_to_coll: Decimal,
  decimals: TokenDecimals,
) -> Result<Decimal> {
  current_leverage(&plan.apply(position)?, price_debt_to_coll, decimals)
}

/// Computes the swap and lending amounts that move `position` to
/// `target_leverage`.
///
/// `additional_deposit_lamports` is fresh collateral supplied by the user on
/// top of the current deposit. It makes opening a position from zero
/// possible and is only valid when leverage increases.
///
/// # Errors
/// - Target leverage at or below 1, or unreachable under slippage and fees
/// - Non-positive prices, slippage outside `[0, 100)`, fee outside `[0, 1)`
/// - Underwater position
/// - Adjustment rounding to zero lamports
pub fn compute_swap_for_target_leverage(
  position: &PositionSnapshot,
  target_leverage: Decimal,
  terms: &SwapTerms,
  additional_deposit_lamports: u64,
) -> Result<SwapPlan> {
  terms.validate()?;
  if target_leverage <= Decimal::ONE {
    return Err(InvalidLeverage(target_leverage));
  }
  let collateral_lamports = position
    .deposited_lamports
    .checked_add(additional_deposit_lamports)
    .ok_or(Arithmetic("deposit total"))?;
  let deposited = from_lamports(collateral_lamports, terms.decimals.collateral)?;
  let borrowed = from_lamports(position.borrowed_lamports, terms.decimals.debt)?;
  let price = terms.prices.price_debt_to_coll;
  let current = leverage_of(deposited, borrowed, price)?;
  let equity = deposited
    .checked_sub(borrowed.checked_mul(price).ok_or(Arithmetic("debt value"))?)
    .ok_or(Arithmetic("equity"))?;

  if target_leverage > current {
    size_increase(
      deposited,
      equity,
      target_leverage,
      terms,
      additional_deposit_lamports,
    )
  } else if target_leverage < current {
    if additional_deposit_lamports > 0 {
      return Err(InvalidLeverage(target_leverage));
    }
    size_decrease(
      position,
      deposited,
      equity,
      target_leverage,
      terms,
    )
  } else {
    Err(AdjustmentTooSmall)
  }
}

/// Computes a withdrawal of `withdraw_lamports` collateral that keeps the
/// position's leverage, repaying debt pro-rata. Requesting everything
/// available closes the position.
///
/// # Errors
/// - Request above the collateral left after repaying all debt
/// - Position without debt
pub fn compute_withdraw_with_leverage(
  position: &PositionSnapshot,
  withdraw_lamports: u64,
  terms: &SwapTerms,
) -> Result<SwapPlan> {
  terms.validate()?;
  if withdraw_lamports == 0 {
    return Err(AdjustmentTooSmall);
  }
  if position.borrowed_lamports == 0 {
    return Err(NothingToDeleverage);
  }
  let close_cost = collateral_to_buy_back(position.borrowed_lamports, terms)?;
  let available = position.deposited_lamports.saturating_sub(close_cost);
  if withdraw_lamports > available {
    return Err(WithdrawExceedsCollateral {
      requested: withdraw_lamports,
      available,
    });
  }

  let (repay, swap_in, total_withdraw) = if withdraw_lamports == available {
    (
      position.borrowed_lamports,
      close_cost,
      position.deposited_lamports,
    )
  } else {
    let share = Decimal::from(withdraw_lamports)
      .checked_div(Decimal::from(available))
      .ok_or(Arithmetic("withdraw share"))?;
    let repay = to_lamports_floor(
      share
        .checked_mul(Decimal::from(position.borrowed_lamports))
        .ok_or(Arithmetic("pro-rata repay"))?,
      0,
    )?;
    let swap_in = collateral_to_buy_back(repay, terms)?;
    let total = withdraw_lamports
      .checked_add(swap_in)
      .ok_or(Arithmetic("withdraw total"))?;
    (repay, swap_in, total)
  };
  if repay == 0 {
    return Err(AdjustmentTooSmall);
  }
  let min_out = guaranteed_output(
    swap_in,
    terms.decimals.collateral,
    terms.prices.price_coll_to_debt,
    terms.decimals.debt,
    terms,
  )?;

  Ok(SwapPlan {
    direction: LeverageDirection::Decrease,
    notional_to_swap_lamports: swap_in,
    expected_output_lamports: min_out,
    flash_borrow_lamports: repay,
    collateral_lamports: total_withdraw,
    debt_lamports: repay,
  })
}

// ============================================================================
// Closed forms
// ============================================================================

/// Borrowing `B` debt and keeping `B * p * g` collateral after the flash
/// repay (with `g` the retained share) solves
///   `(D + B*p*g) / (E - B*p*(1 - g)) = L`
/// for `B = (L*E - D) / (p * (g + L*(1 - g)))`.
fn size_increase(
  deposited: Decimal,
  equity: Decimal,
  target: Decimal,
  terms: &SwapTerms,
  additional_deposit_lamports: u64,
) -> Result<SwapPlan> {
  let price = terms.prices.price_debt_to_coll;
  let retained = terms.retained_share()?;
  let numerator = target
    .checked_mul(equity)
    .and_then(|le| le.checked_sub(deposited))
    .ok_or(Arithmetic("increase numerator"))?;
  let denominator = Decimal::ONE
    .checked_sub(retained)
    .and_then(|cost| cost.checked_mul(target))
    .and_then(|lc| lc.checked_add(retained))
    .and_then(|d| d.checked_mul(price))
    .ok_or(Arithmetic("increase denominator"))?;
  let borrow = numerator
    .checked_div(denominator)
    .ok_or(Arithmetic("increase borrow"))?;
  let borrow_lamports = to_lamports_floor(borrow, terms.decimals.debt)?;
  if borrow_lamports == 0 {
    return Err(AdjustmentTooSmall);
  }
  let min_out = guaranteed_output(
    borrow_lamports,
    terms.decimals.debt,
    price,
    terms.decimals.collateral,
    terms,
  )?;
  let flash = flash_principal(min_out, terms.flash_loan_fee)?;
  if flash == 0 {
    return Err(AdjustmentTooSmall);
  }
  Ok(SwapPlan {
    direction: LeverageDirection::Increase,
    notional_to_swap_lamports: borrow_lamports,
    expected_output_lamports: min_out,
    flash_borrow_lamports: flash,
    collateral_lamports: flash
      .checked_add(additional_deposit_lamports)
      .ok_or(Arithmetic("deposit total"))?,
    debt_lamports: borrow_lamports,
  })
}

/// Withdrawing `W` collateral and repaying `W * q * g` debt with its swap
/// output solves
///   `(D - W) / (E - W*(1 - q*p*g)) = L`
/// for `W = (D - L*E) / (1 - L*(1 - q*p*g))`.
fn size_decrease(
  position: &PositionSnapshot,
  deposited: Decimal,
  equity: Decimal,
  target: Decimal,
  terms: &SwapTerms,
) -> Result<SwapPlan> {
  let retained = terms.retained_share()?;
  let round_trip = terms
    .prices
    .price_coll_to_debt
    .checked_mul(terms.prices.price_debt_to_coll)
    .and_then(|qp| qp.checked_mul(retained))
    .and_then(|qpg| Decimal::ONE.checked_sub(qpg))
    .ok_or(Arithmetic("decrease cost"))?;
  let denominator = target
    .checked_mul(round_trip)
    .and_then(|lc| Decimal::ONE.checked_sub(lc))
    .ok_or(Arithmetic("decrease denominator"))?;
  if denominator <= Decimal::ZERO {
    return Err(UnreachableLeverage { target });
  }
  let numerator = target
    .checked_mul(equity)
    .and_then(|le| deposited.checked_sub(le))
    .ok_or(Arithmetic("decrease numerator"))?;
  let withdraw = numerator
    .checked_div(denominator)
    .ok_or(Arithmetic("decrease withdraw"))?;
  let withdraw_lamports = to_lamports_ceil(withdraw, terms.decimals.collateral)?;
  if withdraw_lamports > position.deposited_lamports {
    return Err(WithdrawExceedsCollateral {
      requested: withdraw_lamports,
      available: position.deposited_lamports,
    });
  }
  let min_out = guaranteed_output(
    withdraw_lamports,
    terms.decimals.collateral,
    terms.prices.price_coll_to_debt,
    terms.decimals.debt,
    terms,
  )?;
  let repay =
    flash_principal(min_out, terms.flash_loan_fee)?.min(position.borrowed_lamports);
  if repay == 0 {
    return Err(AdjustmentTooSmall);
  }
  Ok(SwapPlan {
    direction: LeverageDirection::Decrease,
    notional_to_swap_lamports: withdraw_lamports,
    expected_output_lamports: min_out,
    flash_borrow_lamports: repay,
    collateral_lamports: withdraw_lamports,
    debt_lamports: repay,
  })
}

// ============================================================================
// Helpers
// ============================================================================

fn check_price(price: Decimal) -> Result<()> {
  if price > Decimal::ZERO {
    Ok(())
  } else {
    Err(InvalidPrice(price))
  }
}

fn leverage_of(
  deposited: Decimal,
  borrowed: Decimal,
  price_debt_to_coll: Decimal,
) -> Result<Decimal> {
  if borrowed.is_zero() {
    return Ok(Decimal::ONE);
  }
  let equity = borrowed
    .checked_mul(price_debt_to_coll)
    .and_then(|debt_value| deposited.checked_sub(debt_value))
    .ok_or(Arithmetic("equity"))?;
  if equity <= Decimal::ZERO {
    return Err(StaleState(format!(
      "debt value reaches collateral value ({deposited} deposited)"
    )));
  }
  deposited
    .checked_div(equity)
    .ok_or(Arithmetic("leverage"))
}

/// Guaranteed swap output in lamports of the output mint.
fn guaranteed_output(
  input_lamports: u64,
  input_decimals: u8,
  price_in_to_out: Decimal,
  output_decimals: u8,
  terms: &SwapTerms,
) -> Result<u64> {
  let fair = from_lamports(input_lamports, input_decimals)?
    .checked_mul(price_in_to_out)
    .ok_or(Arithmetic("swap output"))?;
  let guaranteed = fair
    .checked_mul(terms.guaranteed_share()?)
    .ok_or(Arithmetic("swap output"))?;
  to_lamports_floor(guaranteed, output_decimals)
}

/// Largest flash-loan principal whose principal plus fee (rounded up) fits in
/// `available_lamports`.
fn flash_principal(available_lamports: u64, fee: Decimal) -> Result<u64> {
  let principal = Decimal::from(available_lamports)
    .checked_div(Decimal::ONE + fee)
    .ok_or(Arithmetic("flash principal"))?;
  to_lamports_floor(principal, 0)
}

/// Collateral lamports whose guaranteed swap output covers `debt_lamports`
/// plus the flash-loan fee on them.
fn collateral_to_buy_back(debt_lamports: u64, terms: &SwapTerms) -> Result<u64> {
  let with_fee = Decimal::from(debt_lamports)
    .checked_mul(Decimal::ONE + terms.flash_loan_fee)
    .ok_or(Arithmetic("buy back"))?;
  let owed = from_lamports(to_lamports_ceil(with_fee, 0)?, terms.decimals.debt)?;
  let rate = terms
    .prices
    .price_coll_to_debt
    .checked_mul(terms.guaranteed_share()?)
    .ok_or(Arithmetic("buy back"))?;
  let collateral = owed.checked_div(rate).ok_or(Arithmetic("buy back"))?;
  // One extra lamport absorbs the floor applied to the swap output.
  to_lamports_ceil(collateral, terms.decimals.collateral)?
    .checked_add(1)
    .ok_or(Arithmetic("buy back"))
}
