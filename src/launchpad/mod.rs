//! Launchpad instruction builders
//!
//! A launch only needs three program operations from a launchpad (create,
//! buy, sell) plus the set of addresses its buy transactions reference, so
//! the rest of the pipeline is written against [`LaunchpadBuilder`] and never
//! against a concrete program.

use crate::tx_builder::errors::TxResult;
use crate::tx_builder::instructions::ComputeBudget;
use crate::tx_builder::lookup_table::LookupTableStep;
use serde::{Deserialize, Serialize};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use std::fmt;
use std::sync::Arc;

pub mod bonk;
pub mod pumpfun;

pub use bonk::BonkBuilder;
pub use pumpfun::PumpFunBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Launchpad {
    #[serde(alias = "pump", alias = "pump_fun")]
    PumpFun,
    Bonk,
}

impl Launchpad {
    /// Wallets per buy transaction
    pub fn group_size(&self) -> usize {
        match self {
            Launchpad::PumpFun => pumpfun::GROUP_SIZE,
            Launchpad::Bonk => bonk::GROUP_SIZE,
        }
    }

    /// Addresses a launch with `pool_size` wallets registers in its lookup
    /// table
    pub fn planned_table_addresses(&self, pool_size: usize) -> usize {
        let wallets: Vec<Pubkey> = (0..pool_size).map(|_| Pubkey::new_unique()).collect();
        builder_for(*self, 0)
            .lookup_table_steps(&Pubkey::new_unique(), &Pubkey::new_unique(), &wallets)
            .iter()
            .map(|step| step.addresses.len())
            .sum()
    }
}

impl fmt::Display for Launchpad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Launchpad::PumpFun => write!(f, "pumpfun"),
            Launchpad::Bonk => write!(f, "bonk"),
        }
    }
}

/// Token metadata passed to the create instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    /// Already-hosted metadata JSON
    pub uri: String,
}

/// Ordered instructions for one wallet operation, plus the derived
/// addresses they touch
#[derive(Debug, Clone, Default)]
pub struct InstructionSet {
    pub instructions: Vec<Instruction>,
    pub derived_addresses: Vec<Pubkey>,
}

impl InstructionSet {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

pub trait LaunchpadBuilder: Send + Sync {
    fn launchpad(&self) -> Launchpad;

    fn program_id(&self) -> Pubkey;

    /// Create instructions for the index-0 transaction; `mint` signs
    fn build_create(&self, main: &Pubkey, mint: &Pubkey, metadata: &TokenMetadata) -> TxResult<InstructionSet>;

    /// Buy instructions for one wallet
    ///
    /// `index` is the wallet's position in the pool; pricing assumes every
    /// earlier wallet's buy executed first.
    fn build_buy(
        &self,
        wallet: &Pubkey,
        mint: &Pubkey,
        creator: &Pubkey,
        lamports: u64,
        index: usize,
    ) -> TxResult<InstructionSet>;

    /// Sell `amount` base units back to the curve
    fn build_sell(&self, wallet: &Pubkey, mint: &Pubkey, creator: &Pubkey, amount: u64) -> TxResult<InstructionSet>;

    /// Lookup table extension steps, in the order they must land
    fn lookup_table_steps(&self, main: &Pubkey, mint: &Pubkey, wallets: &[Pubkey]) -> Vec<LookupTableStep>;

    /// Instructions each wallet contributes to a buy batch
    fn buy_instructions_per_wallet(&self) -> usize;

    fn group_size(&self) -> usize {
        self.launchpad().group_size()
    }

    fn buy_compute_budget(&self) -> ComputeBudget;

    /// Main wallet headroom on top of the per-wallet funding
    fn balance_overhead_lamports(&self) -> u64;

    /// Mint address suffix used when vanity grinding is enabled
    fn vanity_suffix(&self) -> &'static str;
}

pub fn builder_for(launchpad: Launchpad, slippage_bps: u16) -> Arc<dyn LaunchpadBuilder> {
    match launchpad {
        Launchpad::PumpFun => Arc::new(PumpFunBuilder::new(slippage_bps)),
        Launchpad::Bonk => Arc::new(BonkBuilder::new(slippage_bps)),
    }
}

/// Borsh string: u32 LE length prefix then UTF-8 bytes
pub(crate) fn put_string(data: &mut Vec<u8>, value: &str) {
    data.extend_from_slice(&(value.len() as u32).to_le_bytes());
    data.extend_from_slice(value.as_bytes());
}

/// `amount * (10_000 + bps) / 10_000`
pub(crate) fn with_slippage_up(amount: u64, bps: u16) -> u64 {
    let scaled = amount as u128 * (10_000 + bps as u128) / 10_000;
    scaled.min(u64::MAX as u128) as u64
}

/// `amount * (10_000 - bps) / 10_000`
pub(crate) fn with_slippage_down(amount: u64, bps: u16) -> u64 {
    (amount as u128 * (10_000u128.saturating_sub(bps as u128)) / 10_000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launchpad_serde_and_group_size() {
        #[derive(Deserialize)]
        struct Wrapper {
            launchpad: Launchpad,
        }
        let w: Wrapper = toml::from_str("launchpad = \"pumpfun\"").unwrap();
        assert_eq!(w.launchpad, Launchpad::PumpFun);
        let w: Wrapper = toml::from_str("launchpad = \"bonk\"").unwrap();
        assert_eq!(w.launchpad, Launchpad::Bonk);

        assert_eq!(Launchpad::PumpFun.group_size(), 4);
        assert_eq!(Launchpad::Bonk.group_size(), 3);
        assert_eq!(Launchpad::Bonk.to_string(), "bonk");
    }

    #[test]
    fn test_planned_table_addresses_grow_three_per_wallet() {
        for pad in [Launchpad::PumpFun, Launchpad::Bonk] {
            let statics = pad.planned_table_addresses(0);
            assert!(statics > 0);
            assert_eq!(pad.planned_table_addresses(10), statics + 30);
        }
    }

    #[test]
    fn test_slippage_helpers() {
        assert_eq!(with_slippage_up(1_000, 1_000), 1_100);
        assert_eq!(with_slippage_down(1_000, 1_000), 900);
        assert_eq!(with_slippage_down(1_000, 10_000), 0);
    }

    #[test]
    fn test_builder_for_matches_launchpad() {
        for pad in [Launchpad::PumpFun, Launchpad::Bonk] {
            let builder = builder_for(pad, 500);
            assert_eq!(builder.launchpad(), pad);
            assert_eq!(builder.group_size(), pad.group_size());
        }
    }
}
