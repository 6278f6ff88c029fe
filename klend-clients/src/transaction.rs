use anchor_client::solana_sdk::address_lookup_table::AddressLookupTableAccount;
use anchor_client::solana_sdk::hash::Hash;
use anchor_client::solana_sdk::instruction::Instruction;
use anchor_client::solana_sdk::message::{v0, VersionedMessage};
use anchor_client::solana_sdk::signature::Signature;
use anchor_client::solana_sdk::transaction::VersionedTransaction;
use anchor_lang::prelude::Pubkey;
use anyhow::Result;

/// Components from which a [`VersionedTransaction`] can be built.
#[derive(Clone, Debug, Default)]
pub struct VersionedTransactionData {
  pub instructions: Vec<Instruction>,
  pub lookup_tables: Vec<AddressLookupTableAccount>,
}

impl VersionedTransactionData {
  #[must_use]
  pub fn no_lookup(instructions: Vec<Instruction>) -> VersionedTransactionData {
    VersionedTransactionData {
      instructions,
      lookup_tables: vec![],
    }
  }

  #[must_use]
  pub fn new(
    instructions: Vec<Instruction>,
    lookup_tables: Vec<AddressLookupTableAccount>,
  ) -> VersionedTransactionData {
    VersionedTransactionData {
      instructions,
      lookup_tables,
    }
  }

  /// Compiles a v0 message paid for by `payer`.
  ///
  /// # Errors
  /// - Message does not compile (e.g. too many account keys)
  pub fn compile(
    &self,
    payer: &Pubkey,
    blockhash: Hash,
  ) -> Result<v0::Message> {
    Ok(v0::Message::try_compile(
      payer,
      &self.instructions,
      &self.lookup_tables,
      blockhash,
    )?)
  }

  /// Builds a transaction with dummy signatures for simulation.
  ///
  /// # Errors
  /// - Message does not compile
  pub fn to_simulation_transaction(
    &self,
    for_user: &Pubkey,
    blockhash: Hash,
  ) -> Result<VersionedTransaction> {
    let message = self.compile(for_user, blockhash)?;
    let num_sigs = message.header.num_required_signatures.into();
    Ok(VersionedTransaction {
      signatures: vec![Signature::default(); num_sigs],
      message: VersionedMessage::V0(message),
    })
  }
}

#[cfg(test)]
mod tests {
  use anchor_client::solana_sdk::instruction::AccountMeta;

  use super::*;
  use crate::util::{transaction_size, PACKET_DATA_SIZE};

  fn touching(accounts: usize) -> Instruction {
    Instruction {
      program_id: Pubkey::new_unique(),
      accounts: (0..accounts)
        .map(|_| AccountMeta::new(Pubkey::new_unique(), false))
        .collect(),
      data: vec![],
    }
  }

  #[test]
  fn simulation_transaction_has_placeholder_signatures() -> Result<()> {
    let payer = Pubkey::new_unique();
    let data = VersionedTransactionData::no_lookup(vec![touching(2)]);
    let tx = data.to_simulation_transaction(&payer, Hash::default())?;
    assert_eq!(tx.signatures, vec![Signature::default()]);
    assert!(transaction_size(&tx)? < PACKET_DATA_SIZE);
    Ok(())
  }

  #[test]
  fn oversized_transaction_measured() -> Result<()> {
    let payer = Pubkey::new_unique();
    let data = VersionedTransactionData::no_lookup(vec![touching(40)]);
    let tx = data.to_simulation_transaction(&payer, Hash::default())?;
    assert!(transaction_size(&tx)? > PACKET_DATA_SIZE);
    Ok(())
  }
}
