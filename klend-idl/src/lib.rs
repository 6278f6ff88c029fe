#![allow(clippy::pub_underscore_fields, clippy::too_many_arguments)]

extern crate anchor_lang;

mod codegen;

mod account_builders {
  pub mod klend;
}

mod instruction_builders {
  pub mod klend;
}

/// Kamino Lend program.
pub mod klend {
  anchor_lang::declare_id!("KLend2g3cP87fffoy8q1mQqGKjrxjC8boSyAYavgmjD");

  pub mod constants {
    pub const LENDING_MARKET_AUTH: &[u8] = b"lma";
    pub const RESERVE_LIQ_SUPPLY: &[u8] = b"reserve_liq_supply";
    pub const FEE_RECEIVER: &[u8] = b"fee_receiver";
    pub const RESERVE_COLL_MINT: &[u8] = b"reserve_coll_mint";
    pub const RESERVE_COLL_SUPPLY: &[u8] = b"reserve_coll_supply";
    pub const USER_METADATA: &[u8] = b"user_meta";
    pub const REFERRER_TOKEN_STATE: &[u8] = b"referrer_acc";
  }

  pub use super::account_builders::klend as account_builders;
  pub use super::codegen::*;
  pub use super::instruction_builders::klend as instruction_builders;
}

/// Kamino Farms program, staking obligation balances for rewards.
pub mod farms {
  anchor_lang::declare_id!("FarmsPZpWu9i7Kky8tPN37rs2TpmMrAZrC7S7vJa91Hr");

  pub mod constants {
    pub const USER_STATE: &[u8] = b"user";
  }
}

pub mod lookup_table;
pub mod obligation_type;
pub mod pda;
