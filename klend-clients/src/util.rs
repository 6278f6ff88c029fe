use solana_rpc_client_api::config::RpcSimulateTransactionConfig;
use anchor_client::solana_sdk::account::Account;
use anchor_client::solana_sdk::address_lookup_table::state::AddressLookupTable;
use anchor_client::solana_sdk::address_lookup_table::AddressLookupTableAccount;
use anchor_client::solana_sdk::commitment_config::CommitmentConfig;
use anchor_client::solana_sdk::transaction::VersionedTransaction;
use anchor_lang::prelude::Pubkey;
use anchor_lang::AccountDeserialize;
use anyhow::{anyhow, Result};

/// Maximum serialized transaction size accepted by validators.
pub const PACKET_DATA_SIZE: usize = 1232;

/// Maximum number of accounts a transaction may lock.
pub const MAX_TRANSACTION_ACCOUNTS: usize = 64;

/// Default configuration to use in simulated transactions.
#[must_use]
pub fn simulation_config() -> RpcSimulateTransactionConfig {
  RpcSimulateTransactionConfig {
    sig_verify: false,
    replace_recent_blockhash: true,
    commitment: Some(CommitmentConfig::confirmed()),
    inner_instructions: true,
    ..Default::default()
  }
}

/// Deserializes an account into an address lookup table.
///
/// # Errors
/// - Account data cannot be deserialized
pub fn deserialize_lookup_table(
  key: &Pubkey,
  account: &Account,
) -> Result<AddressLookupTableAccount> {
  let table = AddressLookupTable::deserialize(&account.data)?;
  Ok(AddressLookupTableAccount {
    key: *key,
    addresses: table.addresses.to_vec(),
  })
}

/// Slot of the table's last extension. Addresses appended in that slot cannot
/// be resolved by transactions until a later slot.
///
/// # Errors
/// - Account data cannot be deserialized
pub fn lookup_table_last_extended_slot(account: &Account) -> Result<u64> {
  let table = AddressLookupTable::deserialize(&account.data)?;
  Ok(table.meta.last_extended_slot)
}

/// Deserializes an anchor account, naming the address on failure.
///
/// # Errors
/// - Discriminator mismatch or malformed data
pub fn deserialize_account<T: AccountDeserialize>(
  key: &Pubkey,
  account: &Account,
) -> Result<T> {
  T::try_deserialize(&mut account.data.as_slice())
    .map_err(|e| anyhow!("Failed to deserialize account {key}: {e}"))
}

/// Wire size of a signed transaction.
///
/// # Errors
/// - Serialization fails
pub fn transaction_size(tx: &VersionedTransaction) -> Result<usize> {
  let size = bincode::serialized_size(tx)?;
  Ok(usize::try_from(size)?)
}
