use anchor_lang::prelude::Pubkey;
use itertools::Itertools;
use klend_clients::user_lut::LookupTableNotReady;
use klend_core::error::ValidationError;
use thiserror::Error;

/// Why a candidate route was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
  #[error("simulation failed: {0}")]
  Simulation(String),
  #[error("simulation timed out")]
  Timeout,
  #[error("message does not compile: {0}")]
  Compile(String),
  #[error("transaction is {size} bytes, over the {limit} byte limit")]
  Oversized { size: usize, limit: usize },
  #[error("rpc error: {0}")]
  Rpc(String),
  #[error("guaranteed output {guaranteed} is below the required {required}")]
  InsufficientOutput { guaranteed: u64, required: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("route {route_index}: {reason}")]
pub struct RouteRejection {
  pub route_index: usize,
  pub reason: RejectionReason,
}

#[derive(Debug, Error)]
pub enum LeverageError {
  #[error(transparent)]
  Validation(#[from] ValidationError),
  /// Quote or route request failed; retryable.
  #[error("Swap quote failed: {0}")]
  Quote(anyhow::Error),
  #[error("No route survived simulation: [{}]", .rejections.iter().join("; "))]
  NoRouteAvailable { rejections: Vec<RouteRejection> },
  /// Chain state moved under the request; re-fetch and retry.
  #[error("Stale state: {0}")]
  StaleState(String),
  #[error(
    "Lookup table {table} created at slot {created_slot} is not usable at \
     slot {current_slot}."
  )]
  LookupTableNotReady {
    table: Pubkey,
    created_slot: u64,
    current_slot: u64,
  },
  #[error("RPC failure: {0}")]
  Rpc(anyhow::Error),
}

impl From<LookupTableNotReady> for LeverageError {
  fn from(err: LookupTableNotReady) -> Self {
    LeverageError::LookupTableNotReady {
      table: err.table,
      created_slot: err.created_slot,
      current_slot: err.current_slot,
    }
  }
}

pub type Result<T> = std::result::Result<T, LeverageError>;
