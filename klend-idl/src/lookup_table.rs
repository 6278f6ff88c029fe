//! Address lookup table maintenance for per-user tables.

use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::instruction::Instruction;
use solana_address_lookup_table_interface::instruction::{
  create_lookup_table, extend_lookup_table,
};

/// Addresses appended per extend instruction, keeping each one well inside
/// the transaction size limit.
pub const MAX_ADDRESSES_PER_EXTEND: usize = 25;

/// Builds the create instruction for a table derived from `recent_slot`,
/// returning it with the table address.
#[must_use]
pub fn create(
  authority: Pubkey,
  payer: Pubkey,
  recent_slot: u64,
) -> (Instruction, Pubkey) {
  create_lookup_table(authority, payer, recent_slot)
}

/// Builds extend instructions appending `addresses` in chunks.
#[must_use]
pub fn extend(
  table: Pubkey,
  authority: Pubkey,
  payer: Pubkey,
  addresses: &[Pubkey],
) -> Vec<Instruction> {
  addresses
    .chunks(MAX_ADDRESSES_PER_EXTEND)
    .map(|chunk| {
      extend_lookup_table(table, authority, Some(payer), chunk.to_vec())
    })
    .collect()
}

/// Addresses in `required` that are absent from `existing`, deduplicated and
/// in first-seen order.
#[must_use]
pub fn missing_addresses(
  existing: &[Pubkey],
  required: &[Pubkey],
) -> Vec<Pubkey> {
  let mut missing: Vec<Pubkey> = Vec::new();
  for address in required {
    if !existing.contains(address) && !missing.contains(address) {
      missing.push(*address);
    }
  }
  missing
}
