//! Hand-maintained bindings for the lending program, laid out like anchor's
//! generated clients: `accounts` for on-chain state, `types` for the structs
//! nested in it, `client` for instruction inputs.

pub mod accounts;
pub mod client;
pub mod types;
