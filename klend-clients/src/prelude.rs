pub use anchor_client::solana_sdk::commitment_config::CommitmentConfig;
pub use anchor_lang::prelude::Pubkey;
pub use anyhow::Result;
pub use solana_rpc_client::nonblocking::rpc_client::RpcClient;

pub use crate::klend_client::{KlendClient, ObligationState};
pub use crate::program_client::ProgramClient;
pub use crate::rpc::{RpcProvider, SolanaRpcProvider};
pub use crate::transaction::VersionedTransactionData;
pub use crate::user_lut::{
  ensure_lut_ready, LookupTableNotReady, UserLookupTableManager,
  UserLookupTableSetup,
};
