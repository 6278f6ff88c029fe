//! Typed instruction inputs for the lending program.
//!
//! `accounts` holds one context per instruction, listing accounts in program
//! order. `args` holds the matching argument structs, each serializing as
//! its 8-byte discriminator followed by the borsh-encoded fields.

pub mod accounts;
pub mod args;
