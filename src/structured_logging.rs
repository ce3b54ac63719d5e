//! Structured logging for launch and sweep events

use crate::observability::TraceContext;

/// Structured logger for pipeline events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context_id: String,
}

impl StructuredLogger {
    pub fn new(context_id: String) -> Self {
        Self { context_id }
    }

    pub fn for_trace(trace: &TraceContext) -> Self {
        Self::new(trace.correlation_id.to_string())
    }

    pub fn log_stage_started(&self, stage: &str) {
        tracing::info!(
            context_id = %self.context_id,
            stage = %stage,
            "Stage started"
        );
    }

    pub fn log_stage_completed(&self, stage: &str, latency_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            stage = %stage,
            latency_ms = %latency_ms,
            "Stage completed"
        );
    }

    pub fn log_stage_failed(&self, stage: &str, error: &str) {
        tracing::error!(
            context_id = %self.context_id,
            stage = %stage,
            error = %error,
            "Stage failed"
        );
    }

    pub fn log_lookup_step(&self, step: &str, addresses: usize, success: bool) {
        tracing::info!(
            context_id = %self.context_id,
            step = %step,
            addresses = %addresses,
            success = %success,
            "Lookup table step"
        );
    }

    pub fn log_batch_built(&self, index: usize, wallets: usize, instructions: usize, size: usize) {
        tracing::debug!(
            context_id = %self.context_id,
            index = %index,
            wallets = %wallets,
            instructions = %instructions,
            size_bytes = %size,
            "Batch built"
        );
    }

    pub fn log_bundle_submitted(&self, bundle_id: &str, tx_count: usize) {
        tracing::info!(
            context_id = %self.context_id,
            bundle_id = %bundle_id,
            tx_count = %tx_count,
            "Bundle submitted"
        );
    }

    pub fn log_batch_outcome(&self, index: usize, signature: Option<&str>, outcome: &str) {
        tracing::info!(
            context_id = %self.context_id,
            index = %index,
            signature = ?signature,
            outcome = %outcome,
            "Batch outcome"
        );
    }

    pub fn log_wallet_recovery(&self, wallet: &str, outcome: &str) {
        tracing::info!(
            context_id = %self.context_id,
            wallet = %wallet,
            outcome = %outcome,
            "Wallet recovery"
        );
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(
            context_id = %self.context_id,
            message = %message,
            "Warning"
        );
    }
}
