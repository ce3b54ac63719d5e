//! Launch bundler library
//!
//! Creates a token on a launchpad and buys it from a pool of ephemeral
//! wallets in the same block: the pool is funded from a main wallet, every
//! address the buys touch is loaded into a lookup table, and the signed
//! batches go out as a relay bundle or one by one. A separate gather pass
//! sells and sweeps the pool back to the main wallet.

pub mod checkpoint;
pub mod compat;
pub mod config;
pub mod endpoints;
pub mod funds;
pub mod launchpad;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod retry;
pub mod structured_logging;
pub mod wallet;

// Component directories keep their spaced names
#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

pub mod tx_builder;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::Config;
pub use pipeline::{LaunchPipeline, LaunchReport, RunContext};
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
