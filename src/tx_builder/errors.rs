//! Error types for batch construction, lookup tables and submission
//!
//! Every error carries enough context to decide what the pipeline does next:
//! retry the step, record a partial terminal state, or abort before any funds
//! move. [`TransactionBuilderError::tier`] exposes that decision directly.

use crate::rpc_manager::RpcManagerError;
use thiserror::Error;

/// How the pipeline treats an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTier {
    /// Retried at operation granularity up to the policy ceiling
    Transient,
    /// Landed or simulated and failed; surfaced as a failed step
    OnChain,
    /// Some work is done and stays done; no rollback
    Partial,
    /// Detected before any mutation
    Precondition,
    /// Programming, configuration or persistence failure
    Fatal,
}

#[derive(Error, Debug)]
pub enum TransactionBuilderError {
    /// RPC client error
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),

    /// Failed to fetch a blockhash, or the one in hand expired
    #[error("Blockhash error: {0}")]
    Blockhash(String),

    /// Broadcast succeeded but confirmation never arrived within the
    /// blockhash validity window
    #[error("Transaction {signature} was not confirmed")]
    Unconfirmed { signature: String },

    /// Transaction landed with an execution error
    #[error("Transaction {signature} failed on-chain: {reason}")]
    OnChain { signature: String, reason: String },

    /// Transaction simulation failed
    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Main wallet balance below what the run needs
    #[error("Insufficient balance: required {required} lamports, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    /// Lookup table extension stopped part way; completed steps remain
    #[error("Lookup table extension stopped after {completed_steps}/{total_steps} steps: {reason}")]
    PartialExtension {
        completed_steps: usize,
        total_steps: usize,
        reason: String,
    },

    /// Failed to build an instruction for a specific program
    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild { program: String, reason: String },

    /// Serialized transaction exceeds the packet limit
    #[error("Batch too large: {size} bytes exceeds {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    /// Compiled message signer slots differ from the wallets that signed
    #[error("Signer mismatch: {0}")]
    SignerMismatch(String),

    /// Failed to sign the transaction
    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Message compile failed: {0}")]
    MessageCompile(String),

    /// Compute budget instructions must form the prefix
    #[error("Invalid instruction order: {0}")]
    InvalidInstructionOrder(String),

    #[error("Lookup table {table} not ready: {missing} planned addresses missing")]
    LookupTableNotReady { table: String, missing: usize },

    /// Bundler-specific errors (relay)
    #[error("Bundler error: {0}")]
    Bundler(String),

    /// Configuration or validation error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Run state could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal invariant violation or unexpected state
    #[error("Internal error: {0}")]
    Internal(String),

    /// Wrapped error from external crates
    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

pub type TxResult<T> = Result<T, TransactionBuilderError>;

impl TransactionBuilderError {
    /// Check if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(err) => err.is_retryable(),
            Self::Blockhash(_) => true,
            Self::Unconfirmed { .. } => true,
            Self::Simulation(msg) => {
                let msg = msg.to_ascii_lowercase();
                !msg.contains("insufficient") && !msg.contains("balance")
            }

            Self::OnChain { .. } => false,
            Self::InsufficientFunds(_) => false,
            Self::InsufficientBalance { .. } => false,
            Self::PartialExtension { .. } => false,
            Self::InstructionBuild { .. } => false,
            Self::BatchTooLarge { .. } => false,
            Self::SignerMismatch(_) => false,
            Self::Signing(_) => false,
            Self::MessageCompile(_) => false,
            Self::InvalidInstructionOrder(_) => false,
            Self::LookupTableNotReady { .. } => false,
            Self::Bundler(_) => false,
            Self::Configuration(_) => false,
            Self::Persistence(_) => false,
            Self::Internal(_) => false,
            Self::External(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Rpc(_) => "rpc",
            Self::Blockhash(_) => "blockhash",
            Self::Unconfirmed { .. } => "confirmation",
            Self::OnChain { .. } => "onchain",
            Self::Simulation(_) => "simulation",
            Self::InsufficientFunds(_) => "funds",
            Self::InsufficientBalance { .. } => "balance",
            Self::PartialExtension { .. } => "lookup_table",
            Self::InstructionBuild { .. } => "instruction",
            Self::BatchTooLarge { .. } => "size",
            Self::SignerMismatch(_) => "signers",
            Self::Signing(_) => "signing",
            Self::MessageCompile(_) => "compile",
            Self::InvalidInstructionOrder(_) => "validation",
            Self::LookupTableNotReady { .. } => "lookup_table",
            Self::Bundler(_) => "bundler",
            Self::Configuration(_) => "config",
            Self::Persistence(_) => "persistence",
            Self::Internal(_) => "internal",
            Self::External(_) => "external",
        }
    }

    pub fn tier(&self) -> ErrorTier {
        match self {
            Self::Rpc(err) if err.is_retryable() => ErrorTier::Transient,
            Self::Rpc(RpcManagerError::InsufficientFunds { .. }) => ErrorTier::OnChain,
            Self::Rpc(_) => ErrorTier::Fatal,
            Self::Blockhash(_) | Self::Unconfirmed { .. } => ErrorTier::Transient,
            Self::OnChain { .. } | Self::Simulation(_) | Self::InsufficientFunds(_) => ErrorTier::OnChain,
            Self::PartialExtension { .. } => ErrorTier::Partial,
            Self::InsufficientBalance { .. } => ErrorTier::Precondition,
            _ => ErrorTier::Fatal,
        }
    }
}

// Convenience constructors for common error scenarios
impl TransactionBuilderError {
    pub fn instruction_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn simulation_failed(reason: impl Into<String>) -> Self {
        Self::Simulation(reason.into())
    }

    pub fn blockhash_unavailable(reason: impl Into<String>) -> Self {
        Self::Blockhash(reason.into())
    }

    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidInstructionOrder(reason.into())
    }

    pub fn persistence(reason: impl std::fmt::Display) -> Self {
        Self::Persistence(reason.to_string())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransactionBuilderError::InsufficientBalance {
            required: 2_000,
            available: 1_000,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance: required 2000 lamports, available 1000"
        );

        let err = TransactionBuilderError::instruction_failed("pump", "invalid accounts");
        assert_eq!(err.to_string(), "Instruction build error (program=pump): invalid accounts");
    }

    #[test]
    fn test_error_retryability() {
        let transport = RpcManagerError::Transport {
            endpoint: "http://localhost".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(TransactionBuilderError::from(transport).is_retryable());
        assert!(TransactionBuilderError::Blockhash("stale".to_string()).is_retryable());
        assert!(TransactionBuilderError::Unconfirmed { signature: "s".to_string() }.is_retryable());
        assert!(TransactionBuilderError::simulation_failed("blockhash not found").is_retryable());

        assert!(!TransactionBuilderError::simulation_failed("Insufficient lamports").is_retryable());
        assert!(!TransactionBuilderError::OnChain {
            signature: "s".to_string(),
            reason: "custom program error".to_string()
        }
        .is_retryable());
        assert!(!TransactionBuilderError::BatchTooLarge { size: 1300, limit: 1232 }.is_retryable());
    }

    #[test]
    fn test_error_tiers() {
        assert_eq!(
            TransactionBuilderError::InsufficientBalance { required: 1, available: 0 }.tier(),
            ErrorTier::Precondition
        );
        assert_eq!(
            TransactionBuilderError::PartialExtension {
                completed_steps: 2,
                total_steps: 4,
                reason: "x".to_string()
            }
            .tier(),
            ErrorTier::Partial
        );
        assert_eq!(
            TransactionBuilderError::Unconfirmed { signature: "s".to_string() }.tier(),
            ErrorTier::Transient
        );
        assert_eq!(TransactionBuilderError::internal("bug").tier(), ErrorTier::Fatal);
        assert_eq!(TransactionBuilderError::internal("bug").category(), "internal");
    }
}
