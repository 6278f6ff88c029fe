//! # Kamino Lend Clients
//!
//! Offchain clients for reading Kamino Lend state and preparing the
//! transactions leverage adjustments depend on.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use klend_clients::prelude::*;
//!
//! # async fn example(owner: Pubkey, market: Pubkey, pair: (Pubkey, Pubkey)) -> Result<()> {
//! let rpc = SolanaRpcProvider::new(std::sync::Arc::new(RpcClient::new(
//!     "https://api.mainnet-beta.solana.com".to_string(),
//! )));
//! let client = KlendClient::new(rpc);
//!
//! // Instruction groups that bring the owner's lookup table up to date
//! let setup = UserLookupTableManager::new(&client)
//!     .get_user_lut_address_and_setup_ixs(market, owner, None, false, &[pair])
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Clients
//!
//! - [`KlendClient`](klend_client::KlendClient) - Obligation, reserve and
//!   user metadata fetching
//! - [`UserLookupTableManager`](user_lut::UserLookupTableManager) - Per-user
//!   lookup table synchronization

pub mod klend_client;
pub mod prelude;
pub mod program_client;
pub mod rpc;
pub mod transaction;
pub mod user_lut;
pub mod util;
