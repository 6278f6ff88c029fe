use solana_rpc_client_api::response::{
  Response, RpcSimulateTransactionResult,
};
use anchor_client::solana_sdk::address_lookup_table::AddressLookupTableAccount;
use anchor_client::solana_sdk::transaction::VersionedTransaction;
use anchor_lang::prelude::Pubkey;
use anchor_lang::AccountDeserialize;
use anyhow::Result;
use itertools::Itertools;

use crate::rpc::RpcProvider;
use crate::util::{
  deserialize_account, deserialize_lookup_table, simulation_config,
};

/// Chain access shared by the lending clients, on top of an [`RpcProvider`].
#[async_trait::async_trait]
pub trait ProgramClient: Send + Sync {
  type Rpc: RpcProvider;

  fn rpc(&self) -> &Self::Rpc;

  /// Simulates a transaction with [`simulation_config`].
  ///
  /// # Errors
  /// - RPC failure (a failing transaction is reported in the response)
  async fn simulate_transaction(
    &self,
    tx: VersionedTransaction,
  ) -> Result<Response<RpcSimulateTransactionResult>> {
    Ok(
      self
        .rpc()
        .simulate_transaction_with_config(tx, simulation_config())
        .await?,
    )
  }

  /// Fetches and decodes anchor accounts; absent accounts are `None`.
  ///
  /// # Errors
  /// - RPC failure
  /// - Present account fails to deserialize
  async fn fetch_accounts<T: AccountDeserialize + Send>(
    &self,
    pubkeys: &[Pubkey],
  ) -> Result<Vec<Option<T>>> {
    self
      .rpc()
      .get_multiple_accounts(pubkeys)
      .await?
      .iter()
      .zip(pubkeys)
      .map(|(opt, key)| {
        opt
          .as_ref()
          .map(|account| deserialize_account(key, account))
          .transpose()
      })
      .try_collect()
  }

  /// Loads address lookup tables at given addresses. Absent tables are
  /// `None`, in input order.
  ///
  /// # Errors
  /// - Failed to fetch lookup table accounts
  /// - Present account fails to deserialize
  async fn load_multiple_lookup_tables(
    &self,
    pubkeys: &[Pubkey],
  ) -> Result<Vec<Option<AddressLookupTableAccount>>> {
    self
      .rpc()
      .get_multiple_accounts(pubkeys)
      .await?
      .iter()
      .zip(pubkeys)
      .map(|(opt, key)| {
        opt
          .as_ref()
          .map(|account| deserialize_lookup_table(key, account))
          .transpose()
      })
      .try_collect()
  }
}
