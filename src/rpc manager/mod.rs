//! RPC Manager Module
//!
//! The chain boundary used by every stage of a launch: balance and blockhash
//! queries, raw broadcast, simulation, signature polling and account reads.
//! Everything above this module talks to [`ChainRpc`] only, so the pipeline
//! runs unchanged against a real node or the in-memory mock used in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};

pub mod rpc_client;
pub mod rpc_errors;

pub use rpc_client::SolanaRpc;
pub use rpc_errors::{RpcManagerError, RpcResult};

/// A recent blockhash together with the last block height at which
/// transactions referencing it are still accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashInfo {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Status of a submitted signature as seen by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    /// Whether the configured commitment level has been reached
    pub confirmed: bool,
    /// On-chain execution error, if the transaction landed but failed
    pub err: Option<String>,
}

/// Result of a preflight simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

impl SimulationOutcome {
    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }
}

/// A parsed SPL token account owned by a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub address: Pubkey,
    pub mint: Pubkey,
    pub amount: u64,
    pub decimals: u8,
}

/// Chain RPC surface consumed as a black box
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Endpoint label used in errors and logs
    fn endpoint(&self) -> &str;

    async fn get_balance(&self, pubkey: &Pubkey) -> RpcResult<u64>;

    async fn get_latest_blockhash(&self) -> RpcResult<BlockhashInfo>;

    async fn get_slot(&self) -> RpcResult<u64>;

    async fn get_block_height(&self) -> RpcResult<u64>;

    /// Broadcast serialized bytes without preflight
    async fn send_transaction(&self, tx: &VersionedTransaction) -> RpcResult<Signature>;

    async fn simulate_transaction(&self, tx: &VersionedTransaction) -> RpcResult<SimulationOutcome>;

    /// `None` when the node has no record of the signature yet
    async fn get_signature_status(&self, signature: &Signature) -> RpcResult<Option<SignatureStatus>>;

    /// Raw account data, `None` when the account does not exist
    async fn get_account_data(&self, pubkey: &Pubkey) -> RpcResult<Option<Vec<u8>>>;

    /// SPL token accounts (classic token program) owned by `owner`
    async fn get_token_accounts(&self, owner: &Pubkey) -> RpcResult<Vec<TokenHolding>>;
}
