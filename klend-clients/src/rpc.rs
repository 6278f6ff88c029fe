//! RPC provider abstraction (enables testing)

use std::sync::Arc;

use solana_rpc_client_api::client_error::Result;
use solana_rpc_client_api::config::RpcSimulateTransactionConfig;
use solana_rpc_client_api::response::{
  Response, RpcSimulateTransactionResult,
};
use anchor_client::solana_sdk::account::Account;
use anchor_client::solana_sdk::commitment_config::CommitmentConfig;
use anchor_client::solana_sdk::hash::Hash;
use anchor_client::solana_sdk::transaction::VersionedTransaction;
use anchor_lang::prelude::Pubkey;
use async_trait::async_trait;
use solana_rpc_client::nonblocking::rpc_client::RpcClient;

/// Chain reads and simulation needed to build leverage transactions.
#[async_trait]
#[allow(clippy::result_large_err)]
pub trait RpcProvider: Send + Sync {
  /// # Errors
  /// Returns error if RPC call fails.
  async fn get_latest_blockhash(&self) -> Result<Hash>;

  /// Finalized slot, used to derive new lookup table addresses.
  ///
  /// # Errors
  /// Returns error if RPC call fails.
  async fn get_slot(&self) -> Result<u64>;

  /// # Errors
  /// Returns error if RPC call fails.
  async fn get_multiple_accounts(
    &self,
    pubkeys: &[Pubkey],
  ) -> Result<Vec<Option<Account>>>;

  /// # Errors
  /// Returns error if RPC simulation fails.
  async fn simulate_transaction_with_config(
    &self,
    transaction: VersionedTransaction,
    config: RpcSimulateTransactionConfig,
  ) -> Result<Response<RpcSimulateTransactionResult>>;
}

#[async_trait]
impl<T: RpcProvider + ?Sized> RpcProvider for Arc<T> {
  async fn get_latest_blockhash(&self) -> Result<Hash> {
    (**self).get_latest_blockhash().await
  }

  async fn get_slot(&self) -> Result<u64> {
    (**self).get_slot().await
  }

  async fn get_multiple_accounts(
    &self,
    pubkeys: &[Pubkey],
  ) -> Result<Vec<Option<Account>>> {
    (**self).get_multiple_accounts(pubkeys).await
  }

  async fn simulate_transaction_with_config(
    &self,
    transaction: VersionedTransaction,
    config: RpcSimulateTransactionConfig,
  ) -> Result<Response<RpcSimulateTransactionResult>> {
    (**self)
      .simulate_transaction_with_config(transaction, config)
      .await
  }
}

/// Real RPC provider wrapping Solana's `RpcClient`
pub struct SolanaRpcProvider {
  client: Arc<RpcClient>,
}

impl SolanaRpcProvider {
  #[must_use]
  pub fn new(client: Arc<RpcClient>) -> Self {
    Self { client }
  }
}

#[async_trait]
impl RpcProvider for SolanaRpcProvider {
  async fn get_latest_blockhash(&self) -> Result<Hash> {
    self.client.get_latest_blockhash().await
  }

  async fn get_slot(&self) -> Result<u64> {
    self
      .client
      .get_slot_with_commitment(CommitmentConfig::finalized())
      .await
  }

  async fn get_multiple_accounts(
    &self,
    pubkeys: &[Pubkey],
  ) -> Result<Vec<Option<Account>>> {
    self.client.get_multiple_accounts(pubkeys).await
  }

  async fn simulate_transaction_with_config(
    &self,
    transaction: VersionedTransaction,
    config: RpcSimulateTransactionConfig,
  ) -> Result<Response<RpcSimulateTransactionResult>> {
    self
      .client
      .simulate_transaction_with_config(&transaction, config)
      .await
  }
}
