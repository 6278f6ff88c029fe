//! Turns a [`SwapPlan`] and a swap route into one flash-loan transaction.
//!
//! Stage order, any stage possibly empty:
//!
//! ```text
//! compute budget -> token accounts -> setup -> route pre-actions
//!   -> flash borrow
//!   -> deposit or repay  (own refresh prefix and farm suffix)
//!   -> borrow or withdraw (own refresh prefix and farm suffix)
//!   -> swap
//!   -> flash repay
//! -> cleanup
//! ```
//!
//! The action funded by the flash loan always runs first: the deposit on an
//! increase, the repay on a decrease. The second action is only healthy
//! after it.

use anchor_client::solana_sdk::compute_budget::ComputeBudgetInstruction;
use anchor_client::solana_sdk::instruction::Instruction;
use anchor_lang::prelude::Pubkey;
use anchor_lang::solana_program::system_instruction;
use anchor_spl::associated_token::spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use anchor_spl::token::spl_token;
use klend_clients::klend_client::ObligationState;
use klend_core::error::ValidationError::Arithmetic;
use klend_core::leverage_math::{LeverageDirection, SwapPlan};
use klend_idl::ata;
use klend_idl::klend::accounts::Reserve;
use klend_idl::klend::client::args::FarmMode;
use klend_idl::klend::instruction_builders;
use klend_idl::obligation_type::ObligationType;

use crate::config::LeverageConfig;
use crate::error::{LeverageError, Result};
use crate::refresh_sequencer::{ObligationReserves, RefreshSequencer};
use crate::swap::remove_budget_instructions;

/// Everything about the position that stays fixed across candidate routes.
#[derive(Clone, Debug)]
pub struct PositionContext<'a> {
  pub owner: Pubkey,
  pub lending_market: Pubkey,
  pub coll_reserve: Pubkey,
  pub debt_reserve: Pubkey,
  pub referrer: Option<Pubkey>,
  pub state: &'a ObligationState,
  /// Initializes the obligation in this transaction when it does not exist
  /// yet.
  pub obligation_type: Option<ObligationType>,
  /// Replaces the engine's compute budget instructions when set.
  pub budget_ixs: Option<Vec<Instruction>>,
  pub current_slot: u64,
}

/// Plan specifics the swap math does not carry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActionFlags {
  /// Collateral the owner adds from their wallet on an increase.
  pub wallet_deposit_lamports: u64,
  /// Repay and withdraw everything.
  pub closing: bool,
}

#[derive(Clone, Debug, Default)]
pub struct AssembledTransaction {
  pub instructions: Vec<Instruction>,
  pub flash_borrow_index: usize,
}

pub struct InstructionAssembler<'a> {
  config: &'a LeverageConfig,
  ctx: &'a PositionContext<'a>,
  sequencer: RefreshSequencer<'a>,
}

impl<'a> InstructionAssembler<'a> {
  #[must_use]
  pub fn new(
    config: &'a LeverageConfig,
    ctx: &'a PositionContext<'a>,
  ) -> Self {
    let sequencer =
      RefreshSequencer::new(ctx.lending_market, ctx.owner, ctx.state);
    Self {
      config,
      ctx,
      sequencer,
    }
  }

  /// Builds the full instruction list for `plan` with a route's
  /// pre-action and swap instructions. Empty route slices yield the klend
  /// skeleton used to learn the reserved accounts.
  ///
  /// # Errors
  /// - Reserve missing from the fetched state
  /// - Withdrawal converted against a stale reserve
  /// - Instruction index overflow
  pub fn assemble(
    &self,
    plan: &SwapPlan,
    flags: ActionFlags,
    pre_action_ixs: &[Instruction],
    swap_ixs: &[Instruction],
  ) -> Result<AssembledTransaction> {
    let coll = self.reserve(&self.ctx.coll_reserve)?;
    let debt = self.reserve(&self.ctx.debt_reserve)?;
    let mut ixs = self.budget_ixs();
    ixs.extend(self.token_account_ixs(coll, debt));
    ixs.extend(self.setup_ixs(plan, flags, coll)?);
    ixs.extend_from_slice(pre_action_ixs);

    let (flash_address, flash_reserve) = match plan.direction {
      LeverageDirection::Increase => (self.ctx.coll_reserve, coll),
      LeverageDirection::Decrease => (self.ctx.debt_reserve, debt),
    };
    let flash_borrow_index = ixs.len();
    ixs.push(instruction_builders::flash_borrow(
      self.ctx.owner,
      flash_address,
      flash_reserve,
      self.ctx.referrer,
      plan.flash_borrow_lamports,
    ));
    ixs.extend(self.economic_ixs(plan, flags, coll, debt)?);
    ixs.extend(remove_budget_instructions(swap_ixs.to_vec()));
    ixs.push(instruction_builders::flash_repay(
      self.ctx.owner,
      flash_address,
      flash_reserve,
      self.ctx.referrer,
      plan.flash_borrow_lamports,
      u8::try_from(flash_borrow_index)
        .map_err(|_| Arithmetic("flash borrow index"))?,
    ));
    ixs.extend(self.cleanup_ixs(plan, debt)?);
    Ok(AssembledTransaction {
      instructions: ixs,
      flash_borrow_index,
    })
  }

  fn budget_ixs(&self) -> Vec<Instruction> {
    if let Some(budget) = &self.ctx.budget_ixs {
      return budget.clone();
    }
    let mut ixs = vec![ComputeBudgetInstruction::set_compute_unit_limit(
      self.config.effective_compute_unit_limit(),
    )];
    if self.config.compute_unit_price_micro_lamports > 0 {
      ixs.push(ComputeBudgetInstruction::set_compute_unit_price(
        self.config.compute_unit_price_micro_lamports,
      ));
    }
    ixs
  }

  fn token_account_ixs(
    &self,
    coll: &Reserve,
    debt: &Reserve,
  ) -> Vec<Instruction> {
    [coll, debt]
      .into_iter()
      .map(|reserve| {
        create_associated_token_account_idempotent(
          &self.ctx.owner,
          &self.ctx.owner,
          &reserve.mint(),
          &reserve.token_program(),
        )
      })
      .collect()
  }

  /// Obligation creation and wrapping of a native SOL deposit.
  fn setup_ixs(
    &self,
    plan: &SwapPlan,
    flags: ActionFlags,
    coll: &Reserve,
  ) -> Result<Vec<Instruction>> {
    let mut ixs = Vec::new();
    if self.ctx.state.obligation.is_none() {
      let obligation_type = self.ctx.obligation_type.ok_or_else(|| {
        LeverageError::StaleState(format!(
          "obligation {} does not exist",
          self.ctx.state.address
        ))
      })?;
      ixs.push(instruction_builders::init_obligation(
        self.ctx.owner,
        self.ctx.owner,
        self.ctx.lending_market,
        &obligation_type,
      ));
      ixs.extend(self.sequencer.init_farms(&[
        (self.ctx.coll_reserve, FarmMode::Collateral),
        (self.ctx.debt_reserve, FarmMode::Debt),
      ])?);
    }
    let wraps_sol = plan.direction == LeverageDirection::Increase
      && flags.wallet_deposit_lamports > 0
      && coll.mint() == spl_token::native_mint::ID;
    if wraps_sol {
      let wsol_ata = ata!(self.ctx.owner, spl_token::native_mint::ID);
      ixs.push(system_instruction::transfer(
        &self.ctx.owner,
        &wsol_ata,
        flags.wallet_deposit_lamports,
      ));
      ixs.push(
        spl_token::instruction::sync_native(&spl_token::ID, &wsol_ata)
          .map_err(|e| LeverageError::Rpc(e.into()))?,
      );
    }
    Ok(ixs)
  }

  fn economic_ixs(
    &self,
    plan: &SwapPlan,
    flags: ActionFlags,
    coll: &Reserve,
    debt: &Reserve,
  ) -> Result<Vec<Instruction>> {
    let (owner, obligation) = (self.ctx.owner, self.ctx.state.address);
    let (coll_address, debt_address) =
      (self.ctx.coll_reserve, self.ctx.debt_reserve);
    let coll_farm = [(coll_address, FarmMode::Collateral)];
    let debt_farm = [(debt_address, FarmMode::Debt)];
    let mut view = ObligationReserves::of(self.ctx.state);
    let mut ixs = Vec::new();

    match plan.direction {
      LeverageDirection::Increase => {
        ixs.extend(self.sequencer.prefix(&view, &[coll_address], &coll_farm)?);
        ixs.push(instruction_builders::deposit(
          owner,
          obligation,
          coll_address,
          coll,
          plan.collateral_lamports,
        ));
        ixs.extend(self.sequencer.farm_refreshes(&coll_farm)?);
        view.add_deposit(coll_address);

        ixs.extend(self.sequencer.prefix(&view, &[debt_address], &debt_farm)?);
        ixs.push(instruction_builders::borrow(
          owner,
          obligation,
          debt_address,
          debt,
          self.ctx.referrer,
          plan.debt_lamports,
        ));
        ixs.extend(self.sequencer.farm_refreshes(&debt_farm)?);
      }
      LeverageDirection::Decrease => {
        ixs.extend(self.sequencer.prefix(&view, &[debt_address], &debt_farm)?);
        let repay = if flags.closing {
          u64::MAX
        } else {
          plan.debt_lamports
        };
        ixs.push(instruction_builders::repay(
          owner,
          obligation,
          debt_address,
          debt,
          repay,
        ));
        ixs.extend(self.sequencer.farm_refreshes(&debt_farm)?);
        if flags.closing {
          view.remove_borrow(&debt_address);
        }

        ixs.extend(self.sequencer.prefix(&view, &[coll_address], &coll_farm)?);
        let withdraw = if flags.closing {
          u64::MAX
        } else {
          self.withdraw_collateral(coll, plan.collateral_lamports)?
        };
        ixs.push(instruction_builders::withdraw(
          owner,
          obligation,
          coll_address,
          coll,
          withdraw,
        ));
        ixs.extend(self.sequencer.farm_refreshes(&coll_farm)?);
      }
    }
    Ok(ixs)
  }

  /// Collateral tokens redeeming at least `liquidity_lamports`, capped at
  /// the obligation's deposit.
  fn withdraw_collateral(
    &self,
    coll: &Reserve,
    liquidity_lamports: u64,
  ) -> Result<u64> {
    let oldest_slot = self
      .ctx
      .current_slot
      .saturating_sub(self.config.withdraw_slot_offset);
    if coll.last_update.slot < oldest_slot {
      return Err(LeverageError::StaleState(format!(
        "reserve {} last updated at slot {}, before {oldest_slot}",
        self.ctx.coll_reserve, coll.last_update.slot
      )));
    }
    let mut collateral = coll.liquidity_to_collateral(liquidity_lamports)?;
    if coll.collateral_to_liquidity(collateral)? < liquidity_lamports {
      collateral = collateral.saturating_add(1);
    }
    let deposited = self
      .ctx
      .state
      .obligation
      .as_ref()
      .map_or(0, |o| o.deposited_collateral(&self.ctx.coll_reserve));
    Ok(collateral.min(deposited))
  }

  /// Closes the wrapped SOL account once a decrease has repaid SOL debt.
  fn cleanup_ixs(
    &self,
    plan: &SwapPlan,
    debt: &Reserve,
  ) -> Result<Vec<Instruction>> {
    if plan.direction != LeverageDirection::Decrease
      || debt.mint() != spl_token::native_mint::ID
    {
      return Ok(Vec::new());
    }
    let wsol_ata = ata!(self.ctx.owner, spl_token::native_mint::ID);
    let close = spl_token::instruction::close_account(
      &spl_token::ID,
      &wsol_ata,
      &self.ctx.owner,
      &self.ctx.owner,
      &[],
    )
    .map_err(|e| LeverageError::Rpc(e.into()))?;
    Ok(vec![close])
  }

  fn reserve(&self, address: &Pubkey) -> Result<&'a Reserve> {
    self.ctx.state.reserves.get(address).ok_or_else(|| {
      LeverageError::StaleState(format!("reserve {address} not loaded"))
    })
  }
}
