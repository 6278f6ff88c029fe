use rust_decimal::Decimal;
use thiserror::Error;

/// Input rejected before any instruction is built or any network call is
/// made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  // `leverage_math`
  #[error("Target leverage {0} must be strictly greater than 1.")]
  InvalidLeverage(Decimal),
  #[error("Target leverage {target} is unreachable with slippage and fees.")]
  UnreachableLeverage { target: Decimal },
  #[error("Price must be strictly positive, got {0}.")]
  InvalidPrice(Decimal),
  #[error("Slippage percentage {0} must be within [0, 100).")]
  InvalidSlippage(Decimal),
  #[error("Flash loan fee {0} must be within [0, 1).")]
  InvalidFlashLoanFee(Decimal),
  #[error("Leverage adjustment rounds to zero lamports.")]
  AdjustmentTooSmall,
  #[error(
    "Withdrawal of {requested} lamports exceeds the {available} lamports \
     available after full debt repayment."
  )]
  WithdrawExceedsCollateral { requested: u64, available: u64 },
  #[error("Position has no debt to repay.")]
  NothingToDeleverage,
  #[error("Position state is inconsistent: {0}")]
  StaleState(String),
  // `obligation_order`
  #[error("Invalid order specification: {0}")]
  InvalidOrderSpec(String),
  #[error("Unknown on-chain order condition type {0}.")]
  UnknownConditionType(u8),
  #[error("Unknown on-chain order opportunity type {0}.")]
  UnknownOpportunityType(u8),
  // shared
  #[error("Arithmetic overflow in {0}.")]
  Arithmetic(&'static str),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Short-hand for order validation failures.
pub(crate) fn check_that(
  condition: bool,
  message: impl FnOnce() -> String,
) -> Result<()> {
  if condition {
    Ok(())
  } else {
    Err(ValidationError::InvalidOrderSpec(message()))
  }
}
