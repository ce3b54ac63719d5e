//! Relay bundle submission
//!
//! A [`Bundle`] is the ordered, non-empty transaction list handed to a
//! block-builder relay: the creation transaction first, then the buy batches
//! in group order. The relay either includes all of it atomically or none of
//! it; nothing here retries or falls back.
//!
//! [`RelayClient`] speaks the relay's JSON-RPC 2.0 dialect over `reqwest`;
//! [`MockBundler`] records submissions for tests.

use crate::metrics::metrics;
use crate::observability::TraceContext;
use crate::tx_builder::errors::{TransactionBuilderError, TxResult};
use crate::tx_builder::output::SignedBatch;
use async_trait::async_trait;
use nonempty::NonEmpty;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::{pubkey, pubkey::Pubkey, signature::Signature};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Transactions per bundle accepted by the relay
pub const MAX_BUNDLE_LEN: usize = 5;

/// Relay tip accounts; one is picked uniformly at random per bundle
pub const TIP_ACCOUNTS: [Pubkey; 8] = [
    pubkey!("Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY"),
    pubkey!("DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL"),
    pubkey!("96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5"),
    pubkey!("3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT"),
    pubkey!("HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe"),
    pubkey!("ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49"),
    pubkey!("ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt"),
    pubkey!("DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh"),
];

pub fn pick_tip_account() -> Pubkey {
    TIP_ACCOUNTS[fastrand::usize(..TIP_ACCOUNTS.len())]
}

/// Ordered transaction set submitted as one unit
#[derive(Debug, Clone)]
pub struct Bundle {
    batches: NonEmpty<SignedBatch>,
}

impl Bundle {
    /// `creation` lands at index 0; `buys` follow in the order given
    pub fn new(creation: SignedBatch, buys: Vec<SignedBatch>) -> TxResult<Self> {
        let len = buys.len() + 1;
        if len > MAX_BUNDLE_LEN {
            return Err(TransactionBuilderError::Bundler(format!(
                "bundle of {} transactions exceeds relay limit of {}",
                len, MAX_BUNDLE_LEN
            )));
        }
        Ok(Self {
            batches: NonEmpty::from((creation, buys)),
        })
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn batches(&self) -> impl Iterator<Item = &SignedBatch> {
        self.batches.iter()
    }

    pub fn creation(&self) -> &SignedBatch {
        self.batches.first()
    }

    pub fn signatures(&self) -> Vec<Signature> {
        self.batches.iter().map(SignedBatch::signature).collect()
    }

    pub fn encoded_base58(&self) -> TxResult<Vec<String>> {
        self.batches.iter().map(SignedBatch::to_base58).collect()
    }

    pub fn encoded_base64(&self) -> TxResult<Vec<String>> {
        self.batches.iter().map(SignedBatch::to_base64).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleId(pub String);

impl std::fmt::Display for BundleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Relay-side view of a submitted bundle; informational only
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleStatus {
    Landed { slot: u64 },
    Pending,
    Failed { reason: String },
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSimulation {
    pub succeeded: bool,
    pub summary: String,
}

/// Relay boundary
#[async_trait]
pub trait Bundler: Send + Sync {
    fn endpoint(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Submit the bundle; a missing id is an error
    async fn send_bundle(&self, bundle: &Bundle, trace_ctx: &TraceContext) -> TxResult<BundleId>;

    async fn simulate_bundle(&self, bundle: &Bundle) -> TxResult<BundleSimulation>;

    /// One status per id, in request order
    async fn get_bundle_statuses(&self, ids: &[BundleId]) -> TxResult<Vec<BundleStatus>>;
}

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct ContextValue<T> {
    value: T,
}

#[derive(Deserialize)]
struct BundleStatusEntry {
    slot: Option<u64>,
    confirmation_status: Option<String>,
    #[serde(default)]
    err: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulationValue {
    summary: Value,
}

/// JSON-RPC client for the relay's bundles endpoint
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    url: String,
}

impl RelayClient {
    pub fn new(url: &str, timeout: Duration) -> TxResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransactionBuilderError::Configuration(format!("relay http client: {e}")))?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    async fn rpc_call<P, R>(&self, method: &str, params: P) -> TxResult<Option<R>>
    where
        P: Serialize,
        R: serde::de::DeserializeOwned,
    {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransactionBuilderError::Bundler(format!("{method}: http: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransactionBuilderError::Bundler(format!(
                "{method}: status {status}: {text}"
            )));
        }

        let out: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| TransactionBuilderError::Bundler(format!("{method}: decode: {e}")))?;
        if let Some(err) = out.error {
            return Err(TransactionBuilderError::Bundler(format!(
                "{method}: rpc error {}: {}",
                err.code, err.message
            )));
        }
        Ok(out.result)
    }
}

#[async_trait]
impl Bundler for RelayClient {
    fn endpoint(&self) -> &str {
        &self.url
    }

    fn is_available(&self) -> bool {
        !self.url.is_empty()
    }

    #[instrument(skip_all, fields(relay = %self.url, txs = bundle.len(), trace_id = %trace_ctx.trace_id))]
    async fn send_bundle(&self, bundle: &Bundle, trace_ctx: &TraceContext) -> TxResult<BundleId> {
        let encoded = bundle.encoded_base58()?;
        let result: Option<String> = self.rpc_call("sendBundle", json!([encoded])).await.map_err(|e| {
            metrics().bundles_failed.inc();
            e
        })?;

        match result.filter(|id| !id.is_empty()) {
            Some(id) => {
                metrics().bundles_submitted.inc();
                info!(bundle_id = %id, "Bundle accepted by relay");
                Ok(BundleId(id))
            }
            None => {
                metrics().bundles_failed.inc();
                warn!("Relay returned no bundle id");
                Err(TransactionBuilderError::Bundler("relay returned no bundle id".to_string()))
            }
        }
    }

    async fn simulate_bundle(&self, bundle: &Bundle) -> TxResult<BundleSimulation> {
        let encoded = bundle.encoded_base64()?;
        let result: Option<ContextValue<SimulationValue>> = self
            .rpc_call("simulateBundle", json!([{ "encodedTransactions": encoded }]))
            .await?;
        let summary = result
            .ok_or_else(|| TransactionBuilderError::Bundler("simulateBundle: empty result".to_string()))?
            .value
            .summary;

        let succeeded = summary.as_str() == Some("succeeded");
        let summary = match summary {
            Value::String(s) => s,
            other => other.to_string(),
        };
        debug!(succeeded, summary = %summary, "Bundle simulated");
        Ok(BundleSimulation { succeeded, summary })
    }

    async fn get_bundle_statuses(&self, ids: &[BundleId]) -> TxResult<Vec<BundleStatus>> {
        let raw: Vec<&str> = ids.iter().map(|id| id.0.as_str()).collect();
        let result: Option<ContextValue<Vec<Option<BundleStatusEntry>>>> =
            self.rpc_call("getBundleStatuses", json!([raw])).await?;

        let entries = result.map(|r| r.value).unwrap_or_default();
        Ok((0..ids.len())
            .map(|i| match entries.get(i) {
                Some(Some(entry)) => classify_status(entry),
                _ => BundleStatus::Unknown,
            })
            .collect())
    }
}

fn classify_status(entry: &BundleStatusEntry) -> BundleStatus {
    let failed = match &entry.err {
        Value::Null => false,
        Value::Object(map) => !map.contains_key("Ok"),
        _ => true,
    };
    if failed {
        return BundleStatus::Failed {
            reason: entry.err.to_string(),
        };
    }
    match (entry.confirmation_status.as_deref(), entry.slot) {
        (Some("confirmed") | Some("finalized"), Some(slot)) => BundleStatus::Landed { slot },
        (Some(_), _) => BundleStatus::Pending,
        (None, _) => BundleStatus::Unknown,
    }
}

/// In-memory bundler for tests
///
/// Records every submitted bundle's signatures in order.
#[derive(Debug)]
pub struct MockBundler {
    available: bool,
    landed_slot: Option<u64>,
    simulation_failure: Option<String>,
    submitted: Mutex<Vec<Vec<Signature>>>,
}

impl MockBundler {
    /// Accepts every bundle and reports it landed at slot 1
    pub fn new_success() -> Self {
        Self::new_custom(true, Some(1))
    }

    /// Rejects every bundle without an id
    pub fn new_failure() -> Self {
        Self::new_custom(false, None)
    }

    pub fn new_custom(available: bool, landed_slot: Option<u64>) -> Self {
        Self {
            available,
            landed_slot,
            simulation_failure: None,
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_simulation_failure(mut self, summary: impl Into<String>) -> Self {
        self.simulation_failure = Some(summary.into());
        self
    }

    pub fn submitted(&self) -> Vec<Vec<Signature>> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl Bundler for MockBundler {
    fn endpoint(&self) -> &str {
        "mock://relay"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn send_bundle(&self, bundle: &Bundle, _trace_ctx: &TraceContext) -> TxResult<BundleId> {
        if !self.available {
            metrics().bundles_failed.inc();
            return Err(TransactionBuilderError::Bundler(
                "relay returned no bundle id".to_string(),
            ));
        }
        self.submitted.lock().push(bundle.signatures());
        metrics().bundles_submitted.inc();
        Ok(BundleId(uuid::Uuid::new_v4().to_string()))
    }

    async fn simulate_bundle(&self, _bundle: &Bundle) -> TxResult<BundleSimulation> {
        Ok(match &self.simulation_failure {
            Some(summary) => BundleSimulation {
                succeeded: false,
                summary: summary.clone(),
            },
            None => BundleSimulation {
                succeeded: true,
                summary: "succeeded".to_string(),
            },
        })
    }

    async fn get_bundle_statuses(&self, ids: &[BundleId]) -> TxResult<Vec<BundleStatus>> {
        let status = match self.landed_slot {
            Some(slot) => BundleStatus::Landed { slot },
            None => BundleStatus::Unknown,
        };
        Ok(vec![status; ids.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tip_accounts_are_distinct() {
        let unique: std::collections::HashSet<_> = TIP_ACCOUNTS.iter().collect();
        assert_eq!(unique.len(), TIP_ACCOUNTS.len());
        assert!(TIP_ACCOUNTS.contains(&pick_tip_account()));
    }

    #[test]
    fn test_classify_status() {
        let landed = BundleStatusEntry {
            slot: Some(42),
            confirmation_status: Some("confirmed".to_string()),
            err: json!({ "Ok": null }),
        };
        assert_eq!(classify_status(&landed), BundleStatus::Landed { slot: 42 });

        let processed = BundleStatusEntry {
            slot: Some(42),
            confirmation_status: Some("processed".to_string()),
            err: Value::Null,
        };
        assert_eq!(classify_status(&processed), BundleStatus::Pending);

        let failed = BundleStatusEntry {
            slot: Some(42),
            confirmation_status: Some("confirmed".to_string()),
            err: json!({ "Err": "BundleFailed" }),
        };
        assert!(matches!(classify_status(&failed), BundleStatus::Failed { .. }));
    }
}
