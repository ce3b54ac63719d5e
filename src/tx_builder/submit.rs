//! Submission coordinator
//!
//! Two mutually exclusive modes, chosen once per run:
//!
//! * **Bundle**: the whole ordered set goes to the relay in one `sendBundle`.
//!   No per-batch retry, no resubmission, no fallback to sequential.
//! * **Sequential**: each batch is broadcast raw and confirmed before the
//!   next. Transport errors re-broadcast the same signed bytes; the first
//!   batch that does not confirm cleanly stops the run and its index is
//!   reported as `resume_from`.

use crate::config::Config;
use crate::metrics::{metrics, Timer};
use crate::observability::TraceContext;
use crate::retry::{retry_required, RetryPolicy};
use crate::rpc_manager::ChainRpc;
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::bundle::{Bundle, BundleId, BundleSimulation, BundleStatus, Bundler};
use crate::tx_builder::errors::{TransactionBuilderError, TxResult};
use crate::tx_builder::output::SignedBatch;
use serde::{Deserialize, Serialize};
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionMode {
    #[default]
    Bundle,
    Sequential,
}

/// Confirmation polling bounds for one signature
#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolling {
    pub interval: Duration,
    pub max_polls: u32,
}

impl ConfirmPolling {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_millis(config.timing.confirm_poll_interval_ms),
            max_polls: config.timing.max_confirm_polls,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Failed(String),
    /// Blockhash expired or the poll budget ran out
    Expired,
}

/// Poll `signature` until it confirms, fails, or `valid_until` passes
///
/// RPC errors while polling are logged and the poll continues.
pub async fn await_confirmation(
    rpc: &dyn ChainRpc,
    signature: &Signature,
    valid_until: u64,
    polling: &ConfirmPolling,
) -> Confirmation {
    let timer = Timer::with_name("confirm_latency_seconds");
    for poll in 0..polling.max_polls.max(1) {
        match rpc.get_signature_status(signature).await {
            Ok(Some(status)) => {
                if let Some(err) = status.err {
                    timer.finish();
                    return Confirmation::Failed(err);
                }
                if status.confirmed {
                    timer.finish();
                    return Confirmation::Confirmed;
                }
            }
            Ok(None) => {}
            Err(e) => debug!(signature = %signature, error = %e, "Status poll failed"),
        }

        match rpc.get_block_height().await {
            Ok(height) if height > valid_until => {
                debug!(signature = %signature, height, valid_until, "Blockhash expired");
                return Confirmation::Expired;
            }
            Ok(_) => {}
            Err(e) => debug!(poll, error = %e, "Block height poll failed"),
        }
        sleep(polling.interval).await;
    }
    Confirmation::Expired
}

/// Broadcast once and wait; any outcome other than a clean confirmation is
/// an error (`Unconfirmed` is retryable, `OnChain` is not)
pub async fn send_and_confirm(
    rpc: &dyn ChainRpc,
    batch: &SignedBatch,
    polling: &ConfirmPolling,
) -> TxResult<Signature> {
    let signature = rpc.send_transaction(&batch.tx).await?;
    match await_confirmation(rpc, &signature, batch.valid_until, polling).await {
        Confirmation::Confirmed => Ok(signature),
        Confirmation::Failed(reason) => Err(TransactionBuilderError::OnChain {
            signature: signature.to_string(),
            reason,
        }),
        Confirmation::Expired => Err(TransactionBuilderError::Unconfirmed {
            signature: signature.to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Confirmed { signature: Signature },
    ConfirmedWithError { signature: Signature, error: String },
    Unconfirmed { signature: Signature },
    BroadcastFailed { reason: String },
}

impl BatchOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    pub fn signature(&self) -> Option<Signature> {
        match self {
            Self::Confirmed { signature }
            | Self::ConfirmedWithError { signature, .. }
            | Self::Unconfirmed { signature } => Some(*signature),
            Self::BroadcastFailed { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Confirmed { .. } => "confirmed",
            Self::ConfirmedWithError { .. } => "confirmed_with_error",
            Self::Unconfirmed { .. } => "unconfirmed",
            Self::BroadcastFailed { .. } => "broadcast_failed",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SequentialReport {
    /// One outcome per attempted batch, in order
    pub outcomes: Vec<BatchOutcome>,
    /// Index (into the submitted slice) of the first batch not confirmed
    pub resume_from: Option<usize>,
}

impl SequentialReport {
    pub fn is_complete(&self) -> bool {
        self.resume_from.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct BundleReport {
    pub bundle_id: BundleId,
    pub signatures: Vec<Signature>,
    pub simulation: Option<BundleSimulation>,
    /// Last status seen while polling, if polling was enabled
    pub status: Option<BundleStatus>,
}

#[derive(Debug, Clone)]
pub struct SubmissionSettings {
    pub simulate_first: bool,
    pub poll_status: bool,
    pub status_polls: u32,
    pub status_poll_interval: Duration,
    pub polling: ConfirmPolling,
    pub broadcast: RetryPolicy,
}

impl SubmissionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            simulate_first: config.relay.simulate_first,
            poll_status: config.relay.poll_status,
            status_polls: config.relay.status_polls,
            status_poll_interval: Duration::from_millis(config.relay.status_poll_interval_ms),
            polling: ConfirmPolling::from_config(config),
            broadcast: RetryPolicy::broadcast(&config.retry),
        }
    }
}

pub struct SubmissionCoordinator {
    rpc: Arc<dyn ChainRpc>,
    bundler: Arc<dyn Bundler>,
    settings: SubmissionSettings,
    logger: StructuredLogger,
}

impl SubmissionCoordinator {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        bundler: Arc<dyn Bundler>,
        settings: SubmissionSettings,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            rpc,
            bundler,
            settings,
            logger,
        }
    }

    /// Single relay submission; a missing bundle id is a failure
    #[instrument(skip_all, fields(txs = bundle.len(), relay = %self.bundler.endpoint()))]
    pub async fn submit_bundle(&self, bundle: &Bundle, trace_ctx: &TraceContext) -> TxResult<BundleReport> {
        let simulation = if self.settings.simulate_first {
            let sim = self.bundler.simulate_bundle(bundle).await?;
            if !sim.succeeded {
                warn!(summary = %sim.summary, "Bundle simulation failed, not submitting");
                return Err(TransactionBuilderError::simulation_failed(sim.summary));
            }
            Some(sim)
        } else {
            None
        };

        let bundle_id = self.bundler.send_bundle(bundle, trace_ctx).await?;
        self.logger.log_bundle_submitted(&bundle_id.0, bundle.len());

        let status = if self.settings.poll_status {
            Some(self.poll_bundle_status(&bundle_id).await)
        } else {
            None
        };

        Ok(BundleReport {
            bundle_id,
            signatures: bundle.signatures(),
            simulation,
            status,
        })
    }

    /// Visibility only: never resubmits
    async fn poll_bundle_status(&self, bundle_id: &BundleId) -> BundleStatus {
        let ids = [bundle_id.clone()];
        let mut last = BundleStatus::Unknown;
        for _ in 0..self.settings.status_polls.max(1) {
            match self.bundler.get_bundle_statuses(&ids).await {
                Ok(statuses) => {
                    last = statuses.into_iter().next().unwrap_or(BundleStatus::Unknown);
                    if matches!(last, BundleStatus::Landed { .. } | BundleStatus::Failed { .. }) {
                        break;
                    }
                }
                Err(e) => debug!(bundle_id = %bundle_id, error = %e, "Bundle status poll failed"),
            }
            sleep(self.settings.status_poll_interval).await;
        }
        info!(bundle_id = %bundle_id, status = ?last, "Bundle status");
        last
    }

    /// Broadcast in order, stopping at the first batch that is not
    /// `Confirmed`
    pub async fn submit_sequential(&self, batches: &[SignedBatch]) -> SequentialReport {
        let mut report = SequentialReport::default();
        for (index, batch) in batches.iter().enumerate() {
            let outcome = self.broadcast_and_confirm(batch).await;
            let signature = outcome.signature().map(|s| s.to_string());
            self.logger
                .log_batch_outcome(index, signature.as_deref(), outcome.label());

            let confirmed = outcome.is_confirmed();
            report.outcomes.push(outcome);
            if !confirmed {
                report.resume_from = Some(index);
                break;
            }
        }
        report
    }

    async fn broadcast_and_confirm(&self, batch: &SignedBatch) -> BatchOutcome {
        let rpc = self.rpc.as_ref();
        let sent = retry_required("broadcast_batch", &self.settings.broadcast, |_| async move {
            rpc.send_transaction(&batch.tx).await
        })
        .await;

        let signature = match sent {
            Ok(signature) => signature,
            Err(e) => {
                metrics().batches_failed.inc();
                return BatchOutcome::BroadcastFailed {
                    reason: e.to_string(),
                };
            }
        };

        match await_confirmation(rpc, &signature, batch.valid_until, &self.settings.polling).await {
            Confirmation::Confirmed => {
                metrics().batches_confirmed.inc();
                BatchOutcome::Confirmed { signature }
            }
            Confirmation::Failed(error) => {
                metrics().batches_failed.inc();
                BatchOutcome::ConfirmedWithError { signature, error }
            }
            Confirmation::Expired => {
                metrics().batches_failed.inc();
                BatchOutcome::Unconfirmed { signature }
            }
        }
    }
}
