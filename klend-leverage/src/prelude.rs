//! Common imports for klend-leverage.

pub use anchor_lang::prelude::Pubkey;
pub use klend_clients::prelude::{
  KlendClient, RpcClient, RpcProvider, SolanaRpcProvider,
};
pub use klend_core::leverage_math::{LeverageDirection, SwapPlan};
pub use klend_idl::obligation_type::ObligationType;

pub use crate::config::LeverageConfig;
pub use crate::error::{LeverageError, RejectionReason, RouteRejection};
pub use crate::operations::{
  LeverageEngine, LeverageIxsOutput, LeverageRequest,
};
pub use crate::swap::{
  max_swap_accounts, Quote, Route, SwapInputs, SwapIxsProvider,
  SwapQuoteProvider,
};
