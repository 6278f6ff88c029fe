//! Per-user address lookup table synchronization.
//!
//! Every leverage transaction references the owner's lookup table so that
//! the swap route gets as many account slots as possible. The table holds
//! the owner's token accounts, the reserves of each position pair, their
//! farm states and the obligation addresses derived for the pair. Calls are
//! idempotent: once the table holds every required address no setup
//! instructions are returned.

use std::collections::HashMap;

use anchor_client::solana_sdk::instruction::Instruction;
use anchor_lang::prelude::Pubkey;
use anyhow::{anyhow, Result};
use itertools::Itertools;
use klend_idl::klend::accounts::Reserve;
use klend_idl::klend::instruction_builders;
use klend_idl::obligation_type::ObligationType;
use klend_idl::{ata, lookup_table, pda};
use thiserror::Error;
use tracing::debug;

use crate::klend_client::KlendClient;
use crate::program_client::ProgramClient;
use crate::rpc::RpcProvider;
use crate::util::deserialize_lookup_table;

/// Table addresses cannot be resolved in the slot they were appended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
  "Lookup table {table} created at slot {created_slot} is not usable at slot \
   {current_slot}."
)]
pub struct LookupTableNotReady {
  pub table: Pubkey,
  pub created_slot: u64,
  pub current_slot: u64,
}

/// # Errors
/// - `current_slot` has not advanced past `created_slot`
pub fn ensure_lut_ready(
  table: Pubkey,
  created_slot: u64,
  current_slot: u64,
) -> std::result::Result<(), LookupTableNotReady> {
  if current_slot > created_slot {
    Ok(())
  } else {
    Err(LookupTableNotReady {
      table,
      created_slot,
      current_slot,
    })
  }
}

/// Lookup table address plus the transactions, one instruction group each,
/// that bring it up to date.
#[derive(Debug, Clone, Default)]
pub struct UserLookupTableSetup {
  pub address: Pubkey,
  pub setup_ixs: Vec<Vec<Instruction>>,
}

pub struct UserLookupTableManager<'a, R: RpcProvider> {
  client: &'a KlendClient<R>,
  referrer: Option<Pubkey>,
}

impl<'a, R: RpcProvider> UserLookupTableManager<'a, R> {
  #[must_use]
  pub fn new(client: &'a KlendClient<R>) -> Self {
    Self {
      client,
      referrer: None,
    }
  }

  /// Referrer recorded when the user metadata is initialized here.
  #[must_use]
  pub fn with_referrer(mut self, referrer: Option<Pubkey>) -> Self {
    self.referrer = referrer;
    self
  }

  /// Resolves the owner's lookup table and the instruction groups needed to
  /// create it and extend it with every address the given
  /// `(collateral reserve, debt reserve)` pairs use.
  ///
  /// Without user metadata a fresh table is derived from the latest
  /// finalized slot, unless `existing_lut` names one. With `always_extend`
  /// the table's current contents are ignored.
  ///
  /// # Errors
  /// - RPC failure
  /// - A reserve is missing or malformed
  /// - Existing table is malformed
  pub async fn get_user_lut_address_and_setup_ixs(
    &self,
    market: Pubkey,
    owner: Pubkey,
    existing_lut: Option<Pubkey>,
    always_extend: bool,
    coll_debt_pairs: &[(Pubkey, Pubkey)],
  ) -> Result<UserLookupTableSetup> {
    let metadata = self.client.fetch_user_metadata(owner).await?;
    let mut setup_ixs = Vec::new();
    let (address, referrer) = match metadata {
      Some(metadata) => (
        existing_lut.unwrap_or(metadata.user_lookup_table),
        Some(metadata.referrer).filter(|r| *r != Pubkey::default()),
      ),
      None => {
        let mut init = Vec::new();
        let address = match existing_lut {
          Some(address) => address,
          None => {
            let slot = self.client.rpc().get_slot().await?;
            let (create, address) = lookup_table::create(owner, owner, slot);
            init.push(create);
            address
          }
        };
        init.push(instruction_builders::init_user_metadata(
          owner,
          owner,
          address,
          self.referrer,
        ));
        setup_ixs.push(init);
        (address, self.referrer)
      }
    };

    let required = self
      .required_addresses(market, owner, referrer, coll_debt_pairs)
      .await?;
    let existing = if always_extend {
      Vec::new()
    } else {
      self.table_contents(address).await?
    };
    let missing = lookup_table::missing_addresses(&existing, &required);
    debug!(
      table = %address,
      required = required.len(),
      missing = missing.len(),
      "user lookup table diff"
    );
    setup_ixs.extend(
      lookup_table::extend(address, owner, owner, &missing)
        .into_iter()
        .map(|ix| vec![ix]),
    );
    Ok(UserLookupTableSetup { address, setup_ixs })
  }

  /// Every address leverage transactions for `coll_debt_pairs` touch that is
  /// worth keeping in the owner's table, deduplicated.
  ///
  /// # Errors
  /// - RPC failure
  /// - A reserve is missing or malformed
  pub async fn required_addresses(
    &self,
    market: Pubkey,
    owner: Pubkey,
    referrer: Option<Pubkey>,
    coll_debt_pairs: &[(Pubkey, Pubkey)],
  ) -> Result<Vec<Pubkey>> {
    let reserve_addresses = coll_debt_pairs
      .iter()
      .flat_map(|(coll, debt)| [*coll, *debt])
      .unique()
      .collect_vec();
    let reserves = self.client.fetch_reserves(&reserve_addresses).await?;

    let mut required = vec![owner, pda::user_metadata(owner)];
    for address in &reserve_addresses {
      required.extend(reserve_addresses_for(
        owner,
        *address,
        loaded(&reserves, address)?,
        referrer,
      ));
    }
    for (coll, debt) in coll_debt_pairs {
      let coll_reserve = loaded(&reserves, coll)?;
      let debt_reserve = loaded(&reserves, debt)?;
      let (coll_mint, debt_mint) = (coll_reserve.mint(), debt_reserve.mint());
      for obligation_type in [
        ObligationType::Multiply {
          coll_mint,
          debt_mint,
          id: 0,
        },
        ObligationType::Leverage {
          coll_mint,
          debt_mint,
          id: 0,
        },
      ] {
        let obligation = obligation_type.to_pda(market, owner);
        required.push(obligation);
        if let Some(farm) = coll_reserve.collateral_farm() {
          required.push(pda::obligation_farm_state(farm, obligation));
        }
        if let Some(farm) = debt_reserve.debt_farm() {
          required.push(pda::obligation_farm_state(farm, obligation));
        }
      }
    }
    Ok(required.into_iter().unique().collect())
  }

  async fn table_contents(&self, address: Pubkey) -> Result<Vec<Pubkey>> {
    let accounts = self.client.rpc().get_multiple_accounts(&[address]).await?;
    match accounts.first() {
      Some(Some(account)) => {
        Ok(deserialize_lookup_table(&address, account)?.addresses)
      }
      _ => Ok(Vec::new()),
    }
  }
}

fn loaded<'a>(
  reserves: &'a HashMap<Pubkey, Reserve>,
  address: &Pubkey,
) -> Result<&'a Reserve> {
  reserves
    .get(address)
    .ok_or(anyhow!("Reserve {address} not loaded."))
}

fn reserve_addresses_for(
  owner: Pubkey,
  address: Pubkey,
  reserve: &Reserve,
  referrer: Option<Pubkey>,
) -> Vec<Pubkey> {
  let mut addresses = vec![
    address,
    ata!(owner, reserve.mint(), reserve.token_program()),
    ata!(owner, reserve.collateral.mint_pubkey),
  ];
  addresses.extend(reserve.collateral_farm());
  addresses.extend(reserve.debt_farm());
  addresses.extend(
    referrer.map(|referrer| pda::referrer_token_state(referrer, address)),
  );
  addresses
}
