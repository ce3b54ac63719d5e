//! Compute budget profiles and instruction planning
//!
//! Every transaction the system sends has the same shape:
//! 1. `set_compute_unit_limit`
//! 2. `set_compute_unit_price`
//! 3. body instructions (transfers, launchpad calls, lookup table ops)

use crate::tx_builder::errors::TransactionBuilderError;
use solana_sdk::{compute_budget::ComputeBudgetInstruction, instruction::Instruction};

/// Compute unit limit and price (micro-lamports per CU)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeBudget {
    pub unit_limit: u32,
    pub unit_price: u64,
}

impl ComputeBudget {
    pub const LOOKUP_TABLE: Self = Self::new(50_000, 500_000);
    pub const DISTRIBUTION: Self = Self::new(1_000_000, 250_000);
    pub const RECOVERY: Self = Self::new(350_000, 220_000);
    pub const CREATION: Self = Self::new(5_000_000, 20_000);
    pub const PUMP_BUY: Self = Self::new(5_000_000, 20_000);
    pub const BONK_BUY: Self = Self::new(5_000_000, 200_000);

    pub const fn new(unit_limit: u32, unit_price: u64) -> Self {
        Self {
            unit_limit,
            unit_price,
        }
    }

    /// Raise the price for sequential broadcast, where batches compete
    /// individually instead of riding a bundle
    pub fn with_price_multiplier(self, multiplier: u64) -> Self {
        Self {
            unit_price: self.unit_price.saturating_mul(multiplier.max(1)),
            ..self
        }
    }

    pub fn instructions(&self) -> [Instruction; 2] {
        [
            ComputeBudgetInstruction::set_compute_unit_limit(self.unit_limit),
            ComputeBudgetInstruction::set_compute_unit_price(self.unit_price),
        ]
    }
}

/// Ordered instructions for one transaction
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    pub instructions: Vec<Instruction>,
}

/// Prefix `body` with the compute budget pair
pub fn plan_instructions(
    budget: ComputeBudget,
    body: impl IntoIterator<Item = Instruction>,
) -> Result<InstructionPlan, TransactionBuilderError> {
    let mut instructions: Vec<Instruction> = budget.instructions().into();
    let prefix = instructions.len();
    instructions.extend(body);
    if instructions.len() == prefix {
        return Err(TransactionBuilderError::Configuration(
            "Transaction has no body instructions".to_string(),
        ));
    }
    sanity_check_ix_order(&instructions)?;
    Ok(InstructionPlan { instructions })
}

/// Compute budget instructions may only appear as a prefix (debug/test only)
#[cfg(debug_assertions)]
pub fn sanity_check_ix_order(instructions: &[Instruction]) -> Result<(), TransactionBuilderError> {
    if instructions.is_empty() {
        return Err(TransactionBuilderError::invalid_order("Instruction list is empty"));
    }

    let is_budget = |ix: &Instruction| ix.program_id == solana_sdk::compute_budget::id();
    let prefix = instructions.iter().take_while(|ix| is_budget(*ix)).count();
    if prefix > 2 {
        return Err(TransactionBuilderError::invalid_order(format!(
            "Expected at most 2 compute budget instructions, found {}",
            prefix
        )));
    }
    if let Some(idx) = instructions.iter().skip(prefix).position(is_budget) {
        return Err(TransactionBuilderError::invalid_order(format!(
            "Compute budget instruction after body (at position {})",
            idx + prefix
        )));
    }
    Ok(())
}

#[cfg(not(debug_assertions))]
#[inline]
pub fn sanity_check_ix_order(_instructions: &[Instruction]) -> Result<(), TransactionBuilderError> {
    Ok(())
}
