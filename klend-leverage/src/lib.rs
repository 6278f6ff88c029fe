//! Leveraged position adjustment for Kamino Lend.
//!
//! Turns "move this obligation to leverage X" into a single flash-loan
//! transaction: the lending instructions come from `klend-idl`, the swap
//! from any aggregator behind [`SwapQuoteProvider`] and
//! [`SwapIxsProvider`].
//!
//! Sizing happens twice. A first plan at the oracle price learns how many
//! accounts the lending side needs and how much to quote. The quoted price
//! then re-sizes the plan, routes are requested for it, and every route is
//! simulated as a full transaction. The route with the best guaranteed rate
//! wins.
//!
//! # Example
//!
//! ```rust,no_run
//! use klend_leverage::prelude::*;
//! use rust_decimal_macros::dec;
//!
//! # async fn example<Q, S>(
//! #   quotes: Q,
//! #   routes: S,
//! #   request: LeverageRequest,
//! # ) -> anyhow::Result<()>
//! # where
//! #   Q: SwapQuoteProvider,
//! #   S: SwapIxsProvider<Quote = Q::Quote>,
//! # {
//! let rpc = SolanaRpcProvider::new(std::sync::Arc::new(RpcClient::new(
//!   "https://api.mainnet-beta.solana.com".to_string(),
//! )));
//! let engine = LeverageEngine::new(
//!   KlendClient::new(rpc),
//!   quotes,
//!   routes,
//!   LeverageConfig::default(),
//! );
//!
//! // Deposit 1 SOL and lever the position to 3x
//! let output = engine
//!   .deposit_with_leverage(&request, 1_000_000_000, dec!(3))
//!   .await?;
//! println!(
//!   "{} instructions, {} routes rejected",
//!   output.instructions.len(),
//!   output.rejections.len()
//! );
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod instruction_assembler;
pub mod operations;
pub mod prelude;
pub mod refresh_sequencer;
pub mod route_selector;
pub mod route_simulator;
pub mod swap;

#[cfg(test)]
mod fixtures;

pub use swap::{SwapIxsProvider, SwapQuoteProvider};
