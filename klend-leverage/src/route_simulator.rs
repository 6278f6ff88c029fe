//! Dry-runs every candidate route as a complete transaction.

use std::collections::HashMap;
use std::time::Duration;

use anchor_client::solana_sdk::address_lookup_table::AddressLookupTableAccount;
use anchor_client::solana_sdk::hash::Hash;
use anchor_client::solana_sdk::instruction::Instruction;
use anchor_client::solana_sdk::transaction::VersionedTransaction;
use anchor_lang::prelude::Pubkey;
use futures::future::join_all;
use itertools::Itertools;
use klend_clients::program_client::ProgramClient;
use klend_clients::rpc::RpcProvider;
use klend_clients::transaction::VersionedTransactionData;
use klend_clients::util::{
  transaction_size, MAX_TRANSACTION_ACCOUNTS, PACKET_DATA_SIZE,
};
use tracing::{debug, warn};

use crate::error::{LeverageError, RejectionReason, Result, RouteRejection};
use crate::swap::Route;

/// A route together with the full instruction list it executes in.
#[derive(Clone, Debug)]
pub struct Candidate<T> {
  pub route_index: usize,
  pub route: Route<T>,
  pub instructions: Vec<Instruction>,
}

/// A route whose transaction simulated successfully.
#[derive(Clone, Debug)]
pub struct SimulatedRoute<T> {
  pub route_index: usize,
  pub route: Route<T>,
  pub transaction: VersionedTransactionData,
  pub units_consumed: Option<u64>,
}

/// Every candidate's fate: simulated survivors and typed rejections.
#[derive(Clone, Debug)]
pub struct SimulationOutcome<T> {
  pub survivors: Vec<SimulatedRoute<T>>,
  pub rejections: Vec<RouteRejection>,
}

pub struct RouteSimulator<'a, C: ProgramClient> {
  client: &'a C,
  payer: Pubkey,
  timeout: Duration,
  /// Referenced by every route, e.g. the owner's table.
  shared_lookup_tables: Vec<Pubkey>,
}

impl<'a, C: ProgramClient> RouteSimulator<'a, C> {
  #[must_use]
  pub fn new(
    client: &'a C,
    payer: Pubkey,
    timeout: Duration,
    shared_lookup_tables: Vec<Pubkey>,
  ) -> Self {
    Self {
      client,
      payer,
      timeout,
      shared_lookup_tables,
    }
  }

  /// Simulates every candidate concurrently. Lookup tables and the
  /// blockhash are fetched together up front.
  ///
  /// # Errors
  /// - Blockhash or lookup table fetch fails
  pub async fn simulate<T: Send>(
    &self,
    candidates: Vec<Candidate<T>>,
  ) -> Result<SimulationOutcome<T>> {
    let keys = self
      .shared_lookup_tables
      .iter()
      .chain(candidates.iter().flat_map(|c| &c.route.lookup_tables))
      .copied()
      .unique()
      .collect_vec();
    let (tables, blockhash) = tokio::join!(
      self.client.load_multiple_lookup_tables(&keys),
      self.client.rpc().get_latest_blockhash()
    );
    let blockhash = blockhash.map_err(|e| LeverageError::Rpc(e.into()))?;
    // Absent tables fail only the routes that reference them
    let tables: HashMap<Pubkey, AddressLookupTableAccount> = tables
      .map_err(LeverageError::Rpc)?
      .into_iter()
      .flatten()
      .map(|table| (table.key, table))
      .collect();

    let mut rejections = Vec::new();
    let mut pending = Vec::new();
    for Candidate {
      route_index,
      route,
      instructions,
    } in candidates
    {
      match self.prepare(&tables, &route, instructions, blockhash) {
        Ok((data, tx)) => pending.push((route_index, route, data, tx)),
        Err(reason) => rejections.push(RouteRejection {
          route_index,
          reason,
        }),
      }
    }

    let simulations = join_all(pending.into_iter().map(
      |(route_index, route, data, tx)| async move {
        let simulation = self.client.simulate_transaction(tx);
        let result = tokio::time::timeout(self.timeout, simulation).await;
        (route_index, route, data, result)
      },
    ))
    .await;

    let mut survivors = Vec::new();
    for (route_index, route, transaction, result) in simulations {
      let reason = match result {
        Err(_) => RejectionReason::Timeout,
        Ok(Err(e)) => RejectionReason::Rpc(e.to_string()),
        Ok(Ok(response)) => match response.value.err {
          Some(err) => RejectionReason::Simulation(format!("{err:?}")),
          None => {
            debug!(
              route = route_index,
              units = ?response.value.units_consumed,
              "route simulated"
            );
            survivors.push(SimulatedRoute {
              route_index,
              route,
              transaction,
              units_consumed: response.value.units_consumed,
            });
            continue;
          }
        },
      };
      rejections.push(RouteRejection {
        route_index,
        reason,
      });
    }
    for rejection in &rejections {
      warn!(
        route = rejection.route_index,
        reason = %rejection.reason,
        "route rejected"
      );
    }
    Ok(SimulationOutcome {
      survivors,
      rejections,
    })
  }

  fn prepare<T>(
    &self,
    tables: &HashMap<Pubkey, AddressLookupTableAccount>,
    route: &Route<T>,
    instructions: Vec<Instruction>,
    blockhash: Hash,
  ) -> std::result::Result<
    (VersionedTransactionData, VersionedTransaction),
    RejectionReason,
  > {
    let lookup_tables = self
      .shared_lookup_tables
      .iter()
      .chain(&route.lookup_tables)
      .unique()
      .map(|key| {
        tables.get(key).cloned().ok_or_else(|| {
          RejectionReason::Compile(format!("lookup table {key} not found"))
        })
      })
      .collect::<std::result::Result<Vec<_>, _>>()?;
    let data = VersionedTransactionData::new(instructions, lookup_tables);
    let tx = data
      .to_simulation_transaction(&self.payer, blockhash)
      .map_err(|e| RejectionReason::Compile(e.to_string()))?;

    let message = &tx.message;
    let accounts = message.static_account_keys().len()
      + message.address_table_lookups().map_or(0, |lookups| {
        lookups
          .iter()
          .map(|l| l.writable_indexes.len() + l.readonly_indexes.len())
          .sum()
      });
    if accounts > MAX_TRANSACTION_ACCOUNTS {
      return Err(RejectionReason::Compile(format!(
        "{accounts} accounts exceed the {MAX_TRANSACTION_ACCOUNTS} account \
         limit"
      )));
    }
    let size = transaction_size(&tx)
      .map_err(|e| RejectionReason::Compile(e.to_string()))?;
    if size > PACKET_DATA_SIZE {
      return Err(RejectionReason::Oversized {
        size,
        limit: PACKET_DATA_SIZE,
      });
    }
    Ok((data, tx))
  }
}
