//! Obligation flavours sharing one on-chain layout.
//!
//! The flavour is only visible through the obligation's `tag` and the seeds
//! its address was derived from: `[tag, id, owner, market, seed1, seed2]`.

use anchor_lang::prelude::Pubkey;
use anyhow::{anyhow, Result};

use crate::klend;
use crate::klend::client::args::InitObligationArgs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObligationType {
  Vanilla { id: u8 },
  Multiply { coll_mint: Pubkey, debt_mint: Pubkey, id: u8 },
  Lending { mint: Pubkey },
  Leverage { coll_mint: Pubkey, debt_mint: Pubkey, id: u8 },
}

impl ObligationType {
  #[must_use]
  pub const fn tag(&self) -> u8 {
    match self {
      ObligationType::Vanilla { .. } => 0,
      ObligationType::Multiply { .. } => 1,
      ObligationType::Lending { .. } => 2,
      ObligationType::Leverage { .. } => 3,
    }
  }

  #[must_use]
  pub const fn id(&self) -> u8 {
    match self {
      ObligationType::Vanilla { id }
      | ObligationType::Multiply { id, .. }
      | ObligationType::Leverage { id, .. } => *id,
      ObligationType::Lending { .. } => 0,
    }
  }

  #[must_use]
  pub fn seeds(&self) -> (Pubkey, Pubkey) {
    match *self {
      ObligationType::Vanilla { .. } => (Pubkey::default(), Pubkey::default()),
      ObligationType::Multiply {
        coll_mint,
        debt_mint,
        ..
      }
      | ObligationType::Leverage {
        coll_mint,
        debt_mint,
        ..
      } => (coll_mint, debt_mint),
      ObligationType::Lending { mint } => (mint, mint),
    }
  }

  /// Reconstructs a flavour from an obligation tag and the position's mints.
  ///
  /// # Errors
  /// - Unknown tag
  pub fn from_tag(
    tag: u64,
    coll_mint: Pubkey,
    debt_mint: Pubkey,
    id: u8,
  ) -> Result<ObligationType> {
    match tag {
      0 => Ok(ObligationType::Vanilla { id }),
      1 => Ok(ObligationType::Multiply {
        coll_mint,
        debt_mint,
        id,
      }),
      2 => Ok(ObligationType::Lending { mint: coll_mint }),
      3 => Ok(ObligationType::Leverage {
        coll_mint,
        debt_mint,
        id,
      }),
      other => Err(anyhow!("Unknown obligation tag {other}.")),
    }
  }

  #[must_use]
  pub fn to_args(&self) -> InitObligationArgs {
    InitObligationArgs {
      tag: self.tag(),
      id: self.id(),
    }
  }

  #[must_use]
  pub fn to_pda(&self, market: Pubkey, owner: Pubkey) -> Pubkey {
    let (seed1, seed2) = self.seeds();
    Pubkey::find_program_address(
      &[
        &[self.tag()],
        &[self.id()],
        owner.as_ref(),
        market.as_ref(),
        seed1.as_ref(),
        seed2.as_ref(),
      ],
      &klend::ID,
    )
    .0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn multiply_and_leverage_differ_by_tag() {
    let market = Pubkey::new_unique();
    let owner = Pubkey::new_unique();
    let coll_mint = Pubkey::new_unique();
    let debt_mint = Pubkey::new_unique();
    let multiply = ObligationType::Multiply {
      coll_mint,
      debt_mint,
      id: 0,
    };
    let leverage = ObligationType::Leverage {
      coll_mint,
      debt_mint,
      id: 0,
    };
    assert_ne!(
      multiply.to_pda(market, owner),
      leverage.to_pda(market, owner)
    );
    assert_eq!(multiply.seeds(), leverage.seeds());
  }

  #[test]
  fn lending_uses_mint_twice() {
    let mint = Pubkey::new_unique();
    let lending = ObligationType::Lending { mint };
    assert_eq!(lending.seeds(), (mint, mint));
    assert_eq!(lending.to_args(), InitObligationArgs { tag: 2, id: 0 });
  }

  #[test]
  fn tag_round_trip() -> Result<()> {
    let coll_mint = Pubkey::new_unique();
    let debt_mint = Pubkey::new_unique();
    for tag in 0..4 {
      let kind = ObligationType::from_tag(tag, coll_mint, debt_mint, 0)?;
      assert_eq!(u64::from(kind.tag()), tag);
    }
    assert!(ObligationType::from_tag(4, coll_mint, debt_mint, 0).is_err());
    Ok(())
  }
}
