//! Metrics collection and export module

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Submission counters
    pub bundles_submitted: IntCounter,
    pub bundles_failed: IntCounter,
    pub batches_built: IntCounter,
    pub batches_confirmed: IntCounter,
    pub batches_failed: IntCounter,

    // Lookup table counters
    pub lookup_table_steps: IntCounter,
    pub lookup_table_steps_already_landed: IntCounter,

    // Fund movement counters
    pub wallets_funded: IntCounter,
    pub wallets_recovered: IntCounter,
    pub wallets_recovery_failed: IntCounter,

    pub retries_total: IntCounter,

    // Gauges
    pub pool_size: IntGauge,
    pub active_recoveries: IntGauge,
    pub pipeline_stage: IntGauge,

    // Histograms
    pub rpc_latency: Histogram,
    pub build_latency: Histogram,
    pub confirm_latency: Histogram,
    pub batch_size_bytes: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let bundles_submitted = IntCounter::with_opts(Opts::new(
            "bundles_submitted_total",
            "Bundles accepted by the relay",
        ))?;
        let bundles_failed = IntCounter::with_opts(Opts::new(
            "bundles_failed_total",
            "Bundle submissions that returned no bundle id",
        ))?;
        let batches_built = IntCounter::with_opts(Opts::new(
            "batches_built_total",
            "Signed transaction batches compiled",
        ))?;
        let batches_confirmed = IntCounter::with_opts(Opts::new(
            "batches_confirmed_total",
            "Sequentially broadcast batches that confirmed without error",
        ))?;
        let batches_failed = IntCounter::with_opts(Opts::new(
            "batches_failed_total",
            "Sequentially broadcast batches that failed or expired",
        ))?;

        let lookup_table_steps = IntCounter::with_opts(Opts::new(
            "lookup_table_steps_total",
            "Lookup table create/extend steps confirmed",
        ))?;
        let lookup_table_steps_already_landed = IntCounter::with_opts(Opts::new(
            "lookup_table_steps_already_landed_total",
            "Retried lookup table steps found already applied on-chain",
        ))?;

        let wallets_funded =
            IntCounter::with_opts(Opts::new("wallets_funded_total", "Ephemeral wallets funded"))?;
        let wallets_recovered = IntCounter::with_opts(Opts::new(
            "wallets_recovered_total",
            "Ephemeral wallets swept back to the main wallet",
        ))?;
        let wallets_recovery_failed = IntCounter::with_opts(Opts::new(
            "wallets_recovery_failed_total",
            "Ephemeral wallets whose sweep failed",
        ))?;

        let retries_total =
            IntCounter::with_opts(Opts::new("retries_total", "Retry attempts across all operations"))?;

        let pool_size = IntGauge::with_opts(Opts::new("pool_size", "Ephemeral wallets in the pool"))?;
        let active_recoveries = IntGauge::with_opts(Opts::new(
            "active_recoveries",
            "Wallet sweeps currently in progress",
        ))?;
        let pipeline_stage = IntGauge::with_opts(Opts::new(
            "pipeline_stage",
            "Ordinal of the last completed launch stage",
        ))?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;
        let build_latency = Histogram::with_opts(
            HistogramOpts::new("build_latency_seconds", "Batch compile and sign latency")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        let confirm_latency = Histogram::with_opts(
            HistogramOpts::new("confirm_latency_seconds", "Broadcast to confirmation latency")
                .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 90.0]),
        )?;
        let batch_size_bytes = Histogram::with_opts(
            HistogramOpts::new("batch_size_bytes", "Serialized size of built batches")
                .buckets(vec![256.0, 512.0, 768.0, 1024.0, 1232.0]),
        )?;

        registry.register(Box::new(bundles_submitted.clone()))?;
        registry.register(Box::new(bundles_failed.clone()))?;
        registry.register(Box::new(batches_built.clone()))?;
        registry.register(Box::new(batches_confirmed.clone()))?;
        registry.register(Box::new(batches_failed.clone()))?;
        registry.register(Box::new(lookup_table_steps.clone()))?;
        registry.register(Box::new(lookup_table_steps_already_landed.clone()))?;
        registry.register(Box::new(wallets_funded.clone()))?;
        registry.register(Box::new(wallets_recovered.clone()))?;
        registry.register(Box::new(wallets_recovery_failed.clone()))?;
        registry.register(Box::new(retries_total.clone()))?;
        registry.register(Box::new(pool_size.clone()))?;
        registry.register(Box::new(active_recoveries.clone()))?;
        registry.register(Box::new(pipeline_stage.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;
        registry.register(Box::new(confirm_latency.clone()))?;
        registry.register(Box::new(batch_size_bytes.clone()))?;

        Ok(Self {
            registry,
            bundles_submitted,
            bundles_failed,
            batches_built,
            batches_confirmed,
            batches_failed,
            lookup_table_steps,
            lookup_table_steps_already_landed,
            wallets_funded,
            wallets_recovered,
            wallets_recovery_failed,
            retries_total,
            pool_size,
            active_recoveries,
            pipeline_stage,
            rpc_latency,
            build_latency,
            confirm_latency,
            batch_size_bytes,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every registered metric in the Prometheus text format
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
    histogram_name: Option<&'static str>,
}

impl Timer {
    /// Create a timer with a histogram name for automatic recording
    pub fn with_name(histogram_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            histogram_name: Some(histogram_name),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Finish the timer and record to the associated histogram
    pub fn finish(self) {
        if let Some(name) = self.histogram_name {
            let duration = self.start.elapsed().as_secs_f64();
            match name {
                "rpc_latency_seconds" => metrics().rpc_latency.observe(duration),
                "build_latency_seconds" => metrics().build_latency.observe(duration),
                "confirm_latency_seconds" => metrics().confirm_latency.observe(duration),
                _ => tracing::debug!("Unknown histogram name: {}", name),
            }
        }
    }
}
