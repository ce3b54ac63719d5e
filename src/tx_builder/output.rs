//! Signed batch output
//!
//! A [`SignedBatch`] is immutable once built: submission re-broadcasts the
//! exact bytes, and any rebuild produces a new value with a fresh blockhash.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};

use crate::tx_builder::errors::{TransactionBuilderError, TxResult};

#[derive(Debug, Clone)]
pub struct SignedBatch {
    pub tx: VersionedTransaction,
    pub fee_payer: Pubkey,
    /// Every key that signed, fee payer first
    pub signers: Vec<Pubkey>,
    /// Pool indices of the wallets whose instructions this batch carries;
    /// empty for the creation transaction
    pub wallet_indices: Vec<usize>,
    /// Instruction count including the compute budget prefix
    pub instruction_count: usize,
    pub serialized_size: usize,
    /// Last block height at which the blockhash is accepted
    pub valid_until: u64,
}

impl SignedBatch {
    /// Transaction id, the fee payer's signature
    pub fn signature(&self) -> Signature {
        self.tx.signatures.first().copied().unwrap_or_default()
    }

    pub fn wire_bytes(&self) -> TxResult<Vec<u8>> {
        bincode::serialize(&self.tx)
            .map_err(|e| TransactionBuilderError::internal(format!("serialize transaction: {e}")))
    }

    /// Encoding used by `sendBundle`
    pub fn to_base58(&self) -> TxResult<String> {
        Ok(bs58::encode(self.wire_bytes()?).into_string())
    }

    /// Encoding used by `simulateBundle`
    pub fn to_base64(&self) -> TxResult<String> {
        Ok(STANDARD.encode(self.wire_bytes()?))
    }
}
