//! Address lookup table lifecycle
//!
//! `create` → `extend_all` (strictly ordered steps, each at most
//! [`MAX_ADDRESSES_PER_EXTEND`] addresses) → `wait_until_ready`. Every step
//! attempt, including the first one of a resumed run, reads the table and
//! only submits addresses that are not already there, so an attempt that
//! landed after its confirmation timed out is never appended twice.

use crate::config::Config;
use crate::metrics::metrics;
use crate::retry::{retry_required, RetryPolicy};
use crate::rpc_manager::ChainRpc;
use crate::tx_builder::builder::build_signed_batch;
use crate::tx_builder::errors::{TransactionBuilderError, TxResult};
use crate::tx_builder::instructions::{plan_instructions, ComputeBudget};
use crate::tx_builder::submit::{send_and_confirm, ConfirmPolling};
use parking_lot::Mutex;
use solana_sdk::{
    address_lookup_table::{
        instruction::{create_lookup_table, extend_lookup_table},
        state::AddressLookupTable,
        AddressLookupTableAccount,
    },
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Addresses appended by a single extend transaction
///
/// An extend carrying the two compute-budget instructions costs 304 bytes
/// plus 32 per address; 28 keeps one address of slack under
/// `PACKET_DATA_SIZE`.
pub const MAX_ADDRESSES_PER_EXTEND: usize = 28;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTableStep {
    pub label: String,
    pub addresses: Vec<Pubkey>,
}

/// Split semantic groups into ceiling-sized steps, keeping group order
///
/// Addresses already placed by an earlier step are dropped and empty steps
/// are omitted. A group larger than the ceiling becomes consecutive steps
/// labelled `name#2`, `name#3`, ...
pub fn chunk_steps<'a>(groups: impl IntoIterator<Item = (&'a str, Vec<Pubkey>)>) -> Vec<LookupTableStep> {
    let mut seen = HashSet::new();
    let mut steps = Vec::new();
    for (label, addresses) in groups {
        let fresh: Vec<Pubkey> = addresses.into_iter().filter(|a| seen.insert(*a)).collect();
        for (i, chunk) in fresh.chunks(MAX_ADDRESSES_PER_EXTEND).enumerate() {
            steps.push(LookupTableStep {
                label: if i == 0 {
                    label.to_string()
                } else {
                    format!("{}#{}", label, i + 1)
                },
                addresses: chunk.to_vec(),
            });
        }
    }
    steps
}

#[derive(Debug, Clone, Copy)]
pub struct LookupTableTiming {
    pub create_settle: Duration,
    pub step_settle: Duration,
    pub ready_polls: u32,
    pub ready_poll_interval: Duration,
    pub confirm: ConfirmPolling,
}

impl LookupTableTiming {
    pub fn from_config(config: &Config) -> Self {
        Self {
            create_settle: Duration::from_millis(config.timing.table_create_settle_ms),
            step_settle: Duration::from_millis(config.timing.extend_step_settle_ms),
            ready_polls: config.timing.ready_polls,
            ready_poll_interval: Duration::from_millis(config.timing.ready_poll_interval_ms),
            confirm: ConfirmPolling::from_config(config),
        }
    }
}

pub struct LookupTableManager {
    rpc: Arc<dyn ChainRpc>,
    policy: RetryPolicy,
    timing: LookupTableTiming,
}

impl LookupTableManager {
    pub fn new(rpc: Arc<dyn ChainRpc>, policy: RetryPolicy, timing: LookupTableTiming) -> Self {
        Self { rpc, policy, timing }
    }

    /// Create a table owned and paid for by `authority`, then wait the
    /// create settle delay
    #[instrument(skip_all, fields(authority = %authority.pubkey()))]
    pub async fn create(&self, authority: &Keypair) -> TxResult<Pubkey> {
        let previous: Mutex<Option<Pubkey>> = Mutex::new(None);
        let previous = &previous;

        let table = retry_required("create_lookup_table", &self.policy, |attempt| async move {
            if attempt > 1 {
                let last = *previous.lock();
                if let Some(table) = last {
                    if self.rpc.get_account_data(&table).await?.is_some() {
                        info!(table = %table, "Lookup table from a previous attempt exists");
                        metrics().lookup_table_steps_already_landed.inc();
                        return Ok(table);
                    }
                }
            }

            let slot = self.rpc.get_slot().await?;
            let (ix, table) = create_lookup_table(authority.pubkey(), authority.pubkey(), slot);
            *previous.lock() = Some(table);
            self.submit(authority, ix).await?;
            Ok::<_, TransactionBuilderError>(table)
        })
        .await?;

        metrics().lookup_table_steps.inc();
        info!(table = %table, "Lookup table created");
        sleep(self.timing.create_settle).await;
        Ok(table)
    }

    /// Append one step's addresses, retrying up to the policy ceiling
    #[instrument(skip_all, fields(table = %table, step = %step.label, addresses = step.addresses.len()))]
    pub async fn extend_step(&self, table: &Pubkey, authority: &Keypair, step: &LookupTableStep) -> TxResult<()> {
        if step.addresses.len() > MAX_ADDRESSES_PER_EXTEND {
            return Err(TransactionBuilderError::Configuration(format!(
                "step '{}' has {} addresses, ceiling is {}",
                step.label,
                step.addresses.len(),
                MAX_ADDRESSES_PER_EXTEND
            )));
        }

        retry_required("extend_lookup_table", &self.policy, |attempt| async move {
            let present: HashSet<Pubkey> = self.fetch_addresses(table).await?.into_iter().collect();
            let addresses: Vec<Pubkey> = step
                .addresses
                .iter()
                .copied()
                .filter(|a| !present.contains(a))
                .collect();
            if addresses.is_empty() {
                info!(attempt, "Step already landed, not resubmitting");
                metrics().lookup_table_steps_already_landed.inc();
                return Ok(());
            }
            if addresses.len() < step.addresses.len() {
                debug!(attempt, missing = addresses.len(), "Submitting only missing addresses");
            }

            let ix = extend_lookup_table(*table, authority.pubkey(), Some(authority.pubkey()), addresses);
            self.submit(authority, ix).await
        })
        .await?;

        metrics().lookup_table_steps.inc();
        Ok(())
    }

    /// Run `steps[start_at..]` in order with the step settle delay between
    /// them
    ///
    /// `on_step(n)` is called after each step with the number of steps now
    /// complete. An exhausted step stops the extension: no later step is
    /// attempted and the table keeps whatever already landed.
    pub async fn extend_all<F>(
        &self,
        table: &Pubkey,
        authority: &Keypair,
        steps: &[LookupTableStep],
        start_at: usize,
        mut on_step: F,
    ) -> TxResult<()>
    where
        F: FnMut(usize) -> TxResult<()>,
    {
        for (index, step) in steps.iter().enumerate().skip(start_at) {
            if index > start_at {
                sleep(self.timing.step_settle).await;
            }

            if let Err(e) = self.extend_step(table, authority, step).await {
                warn!(step = %step.label, index, error = %e, "Lookup table extension stopped");
                return Err(TransactionBuilderError::PartialExtension {
                    completed_steps: index,
                    total_steps: steps.len(),
                    reason: e.to_string(),
                });
            }
            info!(step = %step.label, index, total = steps.len(), "Lookup table step complete");
            on_step(index + 1)?;
        }
        Ok(())
    }

    /// Poll until the table deserializes and holds every expected address
    pub async fn wait_until_ready(&self, table: &Pubkey, expected: &[Pubkey]) -> TxResult<AddressLookupTableAccount> {
        let mut missing = expected.len();
        for poll in 0..self.timing.ready_polls.max(1) {
            match self.fetch_addresses(table).await {
                Ok(addresses) => {
                    let present: HashSet<&Pubkey> = addresses.iter().collect();
                    missing = expected.iter().filter(|a| !present.contains(a)).count();
                    if missing == 0 {
                        debug!(table = %table, addresses = addresses.len(), "Lookup table ready");
                        return Ok(AddressLookupTableAccount {
                            key: *table,
                            addresses,
                        });
                    }
                    debug!(table = %table, poll, missing, "Lookup table not ready yet");
                }
                Err(e) => debug!(table = %table, poll, error = %e, "Lookup table read failed"),
            }
            sleep(self.timing.ready_poll_interval).await;
        }
        Err(TransactionBuilderError::LookupTableNotReady {
            table: table.to_string(),
            missing,
        })
    }

    /// Current table contents; empty when the account does not exist yet
    pub async fn fetch_addresses(&self, table: &Pubkey) -> TxResult<Vec<Pubkey>> {
        let Some(data) = self.rpc.get_account_data(table).await? else {
            return Ok(Vec::new());
        };
        let state = AddressLookupTable::deserialize(&data)
            .map_err(|e| TransactionBuilderError::internal(format!("decode lookup table {table}: {e}")))?;
        Ok(state.addresses.to_vec())
    }

    async fn submit(&self, authority: &Keypair, ix: solana_sdk::instruction::Instruction) -> TxResult<()> {
        let plan = plan_instructions(ComputeBudget::LOOKUP_TABLE, [ix])?;
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let batch = build_signed_batch(authority, &[authority], &plan.instructions, &[], blockhash)?;
        send_and_confirm(self.rpc.as_ref(), &batch, &self.timing.confirm).await?;
        Ok(())
    }
}
