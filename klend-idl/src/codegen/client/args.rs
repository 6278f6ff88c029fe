use anchor_lang::prelude::*;
use anchor_lang::{Discriminator, InstructionData};
use klend_core::obligation_order::ObligationOrder;

macro_rules! instruction_args {
  ($name:ident [$($byte:literal),*] { $($field:ident: $ty:ty),* $(,)? }) => {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, AnchorSerialize, AnchorDeserialize)]
    pub struct $name {
      $(pub $field: $ty),*
    }

    impl Discriminator for $name {
      const DISCRIMINATOR: &'static [u8] = &[$($byte),*];
    }

    impl InstructionData for $name {}
  };
}

instruction_args!(RefreshReserve [2, 218, 138, 235, 79, 201, 25, 102] {});

instruction_args!(RefreshObligation [33, 132, 147, 228, 151, 192, 72, 89] {});

instruction_args!(RefreshObligationFarmsForReserve
  [140, 144, 253, 21, 10, 74, 248, 3] { mode: u8 });

instruction_args!(InitObligationFarmsForReserve
  [136, 63, 15, 186, 211, 152, 168, 164] { mode: u8 });

instruction_args!(InitUserMetadata
  [117, 169, 176, 69, 197, 23, 15, 162] { user_lookup_table: Pubkey });

instruction_args!(InitObligation
  [251, 10, 231, 76, 27, 11, 159, 96] { args: InitObligationArgs });

instruction_args!(SetObligationOrder [81, 1, 99, 156, 211, 83, 78, 46] {
  index: u8,
  order: ObligationOrder,
});

instruction_args!(DepositReserveLiquidityAndObligationCollateral
  [129, 199, 4, 2, 222, 39, 26, 46] { liquidity_amount: u64 });

instruction_args!(BorrowObligationLiquidity
  [121, 127, 18, 204, 73, 245, 225, 65] { liquidity_amount: u64 });

instruction_args!(RepayObligationLiquidity
  [145, 178, 13, 225, 76, 240, 147, 72] { liquidity_amount: u64 });

instruction_args!(WithdrawObligationCollateralAndRedeemReserveCollateral
  [75, 93, 93, 220, 34, 150, 218, 196] { collateral_amount: u64 });

instruction_args!(FlashBorrowReserveLiquidity
  [135, 231, 52, 167, 7, 52, 212, 193] { liquidity_amount: u64 });

instruction_args!(FlashRepayReserveLiquidity
  [185, 117, 0, 203, 96, 245, 180, 186] {
  liquidity_amount: u64,
  borrow_instruction_index: u8,
});

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, AnchorSerialize, AnchorDeserialize,
)]
pub struct InitObligationArgs {
  pub tag: u8,
  pub id: u8,
}

/// Which of a reserve's two farms an instruction addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FarmMode {
  Collateral = 0,
  Debt = 1,
}

impl FarmMode {
  #[must_use]
  pub const fn as_u8(self) -> u8 {
    self as u8
  }
}
