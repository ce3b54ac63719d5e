//! Configuration module for the launch bundler
//!
//! This module handles all configuration loading from TOML files,
//! environment variables, and provides structured configuration types.
//! The configuration is read once per run and never mutated afterwards.

use crate::launchpad::{Launchpad, TokenMetadata};
use crate::tx_builder::bundle::MAX_BUNDLE_LEN;
use crate::tx_builder::submit::SubmissionMode;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    address_lookup_table::state::LOOKUP_TABLE_MAX_ADDRESSES, commitment_config::CommitmentConfig,
    native_token::LAMPORTS_PER_SOL,
};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// RPC endpoint configuration
    pub rpc: RpcConfig,

    /// Main wallet configuration
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Launch parameters
    pub launch: LaunchConfig,

    /// Block-builder relay
    #[serde(default)]
    pub relay: RelayConfig,

    /// Attempt ceilings and backoff
    #[serde(default)]
    pub retry: RetryConfig,

    /// Settle delays and confirmation polling
    #[serde(default)]
    pub timing: TimingConfig,

    /// Where run state is persisted
    #[serde(default)]
    pub storage: StorageConfig,

    /// Monitoring and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// `processed`, `confirmed` or `finalized`
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to a keypair file (JSON byte array or base58)
    #[serde(default)]
    pub keypair_path: Option<String>,

    /// Environment variable holding the base58 main key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Target launchpad
    pub launchpad: Launchpad,

    /// Number of ephemeral wallets
    pub pool_size: usize,

    /// SOL each ephemeral wallet spends on its buy
    pub swap_amount_sol: f64,

    /// Relay tip paid by the creation transaction, in SOL
    #[serde(default = "default_relay_fee")]
    pub relay_fee_sol: f64,

    /// Submission mode, chosen once per run
    #[serde(default)]
    pub mode: SubmissionMode,

    /// Grind a mint address with the launchpad's vanity suffix
    #[serde(default)]
    pub vanity: bool,

    /// Maximum slippage tolerance (basis points)
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,

    /// Priority price multiplier applied to buys in sequential mode
    #[serde(default = "default_priority_multiplier")]
    pub sequential_priority_multiplier: u64,

    /// Token metadata; the URI points at already-hosted JSON
    pub token: TokenMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay JSON-RPC URL (bundles endpoint)
    #[serde(default = "default_relay_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_relay_timeout")]
    pub timeout_secs: u64,

    /// Run `simulateBundle` before `sendBundle`
    #[serde(default)]
    pub simulate_first: bool,

    /// Poll `getBundleStatuses` after submission
    #[serde(default = "default_true")]
    pub poll_status: bool,

    #[serde(default = "default_status_polls")]
    pub status_polls: u32,

    #[serde(default = "default_status_poll_interval")]
    pub status_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_lookup_table_attempts")]
    pub lookup_table_attempts: u32,

    #[serde(default = "default_distribution_attempts")]
    pub distribution_attempts: u32,

    #[serde(default = "default_sell_attempts")]
    pub sell_attempts: u32,

    #[serde(default = "default_recovery_attempts")]
    pub recovery_attempts: u32,

    /// Re-broadcasts of the same signed bytes in sequential mode
    #[serde(default = "default_broadcast_attempts")]
    pub broadcast_attempts: u32,

    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait after the lookup table is created
    #[serde(default = "default_table_create_settle")]
    pub table_create_settle_ms: u64,

    /// Wait between lookup table extension steps
    #[serde(default = "default_extend_step_settle")]
    pub extend_step_settle_ms: u64,

    #[serde(default = "default_confirm_poll_interval")]
    pub confirm_poll_interval_ms: u64,

    /// Upper bound on status polls for one signature
    #[serde(default = "default_max_confirm_polls")]
    pub max_confirm_polls: u32,

    /// Polls of the table account before giving up on readiness
    #[serde(default = "default_ready_polls")]
    pub ready_polls: u32,

    #[serde(default = "default_ready_poll_interval")]
    pub ready_poll_interval_ms: u64,

    /// Per-wallet stagger when sweeping
    #[serde(default = "default_recovery_stagger")]
    pub recovery_stagger_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding data.json, mint.json, lut.json and checkpoint.json
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default)]
    pub enable_metrics: bool,

    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

// Default value functions
fn default_rpc_timeout() -> u64 { 30 }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_private_key_env() -> String { "PRIVATE_KEY".to_string() }
fn default_relay_fee() -> f64 { 0.001 }
fn default_slippage_bps() -> u16 { 1_000 }
fn default_priority_multiplier() -> u64 { 5 }
fn default_relay_url() -> String { "https://mainnet.block-engine.jito.wtf/api/v1/bundles".to_string() }
fn default_relay_timeout() -> u64 { 10 }
fn default_status_polls() -> u32 { 30 }
fn default_status_poll_interval() -> u64 { 2_000 }
fn default_lookup_table_attempts() -> u32 { 5 }
fn default_distribution_attempts() -> u32 { 6 }
fn default_sell_attempts() -> u32 { 10 }
fn default_recovery_attempts() -> u32 { 3 }
fn default_broadcast_attempts() -> u32 { 3 }
fn default_base_backoff() -> u64 { 500 }
fn default_max_backoff() -> u64 { 5_000 }
fn default_table_create_settle() -> u64 { 15_000 }
fn default_extend_step_settle() -> u64 { 10_000 }
fn default_confirm_poll_interval() -> u64 { 1_000 }
fn default_max_confirm_polls() -> u32 { 90 }
fn default_ready_polls() -> u32 { 20 }
fn default_ready_poll_interval() -> u64 { 1_000 }
fn default_recovery_stagger() -> u64 { 50 }
fn default_data_dir() -> PathBuf { PathBuf::from("./data") }
fn default_metrics_port() -> u16 { 9090 }
fn default_true() -> bool { true }

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: default_relay_url(),
            timeout_secs: default_relay_timeout(),
            simulate_first: false,
            poll_status: default_true(),
            status_polls: default_status_polls(),
            status_poll_interval_ms: default_status_poll_interval(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            lookup_table_attempts: default_lookup_table_attempts(),
            distribution_attempts: default_distribution_attempts(),
            sell_attempts: default_sell_attempts(),
            recovery_attempts: default_recovery_attempts(),
            broadcast_attempts: default_broadcast_attempts(),
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            table_create_settle_ms: default_table_create_settle(),
            extend_step_settle_ms: default_extend_step_settle(),
            confirm_poll_interval_ms: default_confirm_poll_interval(),
            max_confirm_polls: default_max_confirm_polls(),
            ready_polls: default_ready_polls(),
            ready_poll_interval_ms: default_ready_poll_interval(),
            recovery_stagger_ms: default_recovery_stagger(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                endpoint: "https://api.mainnet-beta.solana.com".to_string(),
                timeout_secs: default_rpc_timeout(),
                commitment: default_commitment(),
            },
            wallet: WalletConfig {
                keypair_path: None,
                private_key_env: default_private_key_env(),
            },
            launch: LaunchConfig {
                launchpad: Launchpad::PumpFun,
                pool_size: 12,
                swap_amount_sol: 0.1,
                relay_fee_sol: default_relay_fee(),
                mode: SubmissionMode::Bundle,
                vanity: false,
                slippage_bps: default_slippage_bps(),
                sequential_priority_multiplier: default_priority_multiplier(),
                token: TokenMetadata {
                    name: "Token".to_string(),
                    symbol: "TKN".to_string(),
                    uri: "https://example.invalid/metadata.json".to_string(),
                },
            },
            relay: RelayConfig::default(),
            retry: RetryConfig::default(),
            timing: TimingConfig::default(),
            storage: StorageConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    ///
    /// `.env` is read first; `RPC_ENDPOINT` replaces the configured endpoint.
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("RPC_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.rpc.endpoint = endpoint;
            }
        }
    }

    /// Reject configurations that could never produce a valid run
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.rpc.endpoint.starts_with("http://") || self.rpc.endpoint.starts_with("https://")) {
            anyhow::bail!("rpc.endpoint must be an http(s) URL, got '{}'", self.rpc.endpoint);
        }
        parse_commitment(&self.rpc.commitment)?;

        let launch = &self.launch;
        if launch.pool_size == 0 {
            anyhow::bail!("launch.pool_size must be at least 1");
        }
        if !(launch.swap_amount_sol.is_finite() && launch.swap_amount_sol > 0.0) {
            anyhow::bail!("launch.swap_amount_sol must be positive");
        }
        if !(launch.relay_fee_sol.is_finite() && launch.relay_fee_sol >= 0.0) {
            anyhow::bail!("launch.relay_fee_sol must not be negative");
        }
        if launch.slippage_bps > 10_000 {
            anyhow::bail!("launch.slippage_bps must be at most 10000");
        }
        if launch.sequential_priority_multiplier == 0 {
            anyhow::bail!("launch.sequential_priority_multiplier must be at least 1");
        }
        if launch.token.name.is_empty() || launch.token.symbol.is_empty() || launch.token.uri.is_empty() {
            anyhow::bail!("launch.token name, symbol and uri are required");
        }

        if launch.mode == SubmissionMode::Bundle {
            let batches = launch.pool_size.div_ceil(launch.launchpad.group_size()) + 1;
            if batches > MAX_BUNDLE_LEN {
                anyhow::bail!(
                    "bundle mode needs {} transactions for {} wallets on {}, relay limit is {}",
                    batches,
                    launch.pool_size,
                    launch.launchpad,
                    MAX_BUNDLE_LEN
                );
            }
            if self.relay.url.is_empty() {
                anyhow::bail!("relay.url is required in bundle mode");
            }
        }

        let table_addresses = launch.launchpad.planned_table_addresses(launch.pool_size);
        if table_addresses > LOOKUP_TABLE_MAX_ADDRESSES {
            anyhow::bail!(
                "{} wallets on {} need {} lookup table addresses, a table holds {}",
                launch.pool_size,
                launch.launchpad,
                table_addresses,
                LOOKUP_TABLE_MAX_ADDRESSES
            );
        }

        let retry = &self.retry;
        for (name, attempts) in [
            ("lookup_table_attempts", retry.lookup_table_attempts),
            ("distribution_attempts", retry.distribution_attempts),
            ("sell_attempts", retry.sell_attempts),
            ("recovery_attempts", retry.recovery_attempts),
            ("broadcast_attempts", retry.broadcast_attempts),
        ] {
            if attempts == 0 {
                anyhow::bail!("retry.{} must be at least 1", name);
            }
        }
        if retry.base_backoff_ms > retry.max_backoff_ms {
            anyhow::bail!("retry.base_backoff_ms must not exceed retry.max_backoff_ms");
        }

        if self.timing.max_confirm_polls == 0 || self.timing.ready_polls == 0 {
            anyhow::bail!("timing poll counts must be at least 1");
        }
        if self.monitoring.enable_metrics && self.monitoring.metrics_port == 0 {
            anyhow::bail!("monitoring.metrics_port must be set when metrics are enabled");
        }
        Ok(())
    }

    pub fn commitment(&self) -> CommitmentConfig {
        parse_commitment(&self.rpc.commitment).unwrap_or_else(|_| CommitmentConfig::confirmed())
    }

    pub fn swap_lamports(&self) -> u64 {
        sol_to_lamports(self.launch.swap_amount_sol)
    }

    pub fn relay_fee_lamports(&self) -> u64 {
        sol_to_lamports(self.launch.relay_fee_sol)
    }
}

pub fn parse_commitment(value: &str) -> anyhow::Result<CommitmentConfig> {
    match value {
        "processed" => Ok(CommitmentConfig::processed()),
        "confirmed" => Ok(CommitmentConfig::confirmed()),
        "finalized" => Ok(CommitmentConfig::finalized()),
        other => anyhow::bail!("unknown commitment level '{}'", other),
    }
}

pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [rpc]
        endpoint = "http://127.0.0.1:8899"

        [launch]
        launchpad = "bonk"
        pool_size = 9
        swap_amount_sol = 0.05

        [launch.token]
        name = "Example"
        symbol = "EXM"
        uri = "https://example.invalid/m.json"
    "#;

    #[test]
    fn test_minimal_toml_fills_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.launch.launchpad, Launchpad::Bonk);
        assert_eq!(config.launch.mode, SubmissionMode::Bundle);
        assert_eq!(config.retry.lookup_table_attempts, 5);
        assert_eq!(config.retry.distribution_attempts, 6);
        assert_eq!(config.retry.sell_attempts, 10);
        assert_eq!(config.timing.table_create_settle_ms, 15_000);
        assert_eq!(config.timing.extend_step_settle_ms, 10_000);
        assert_eq!(config.timing.recovery_stagger_ms, 50);
        assert_eq!(config.launch.sequential_priority_multiplier, 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_bundle_mode_rejects_oversized_pool() {
        let mut config = Config::default();
        // pump.fun groups 4 wallets: 17 wallets need 5 buy batches plus creation
        config.launch.pool_size = 17;
        assert!(config.validate().is_err());

        config.launch.pool_size = 16;
        config.validate().unwrap();

        config.launch.pool_size = 17;
        config.launch.mode = SubmissionMode::Sequential;
        config.validate().unwrap();
    }

    #[test]
    fn test_sequential_pool_must_fit_one_lookup_table() {
        for pad in [Launchpad::PumpFun, Launchpad::Bonk] {
            let mut config = Config::default();
            config.launch.launchpad = pad;
            config.launch.mode = SubmissionMode::Sequential;

            config.launch.pool_size = 79;
            assert!(pad.planned_table_addresses(79) <= LOOKUP_TABLE_MAX_ADDRESSES);
            config.validate().unwrap();

            config.launch.pool_size = 80;
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("lookup table"));
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.launch.swap_amount_sol = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rpc.commitment = "recent".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.lookup_table_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sol_conversion() {
        assert_eq!(sol_to_lamports(0.01), 10_000_000);
        assert_eq!(sol_to_lamports(1.5), 1_500_000_000);
        assert!((lamports_to_sol(4_000_000) - 0.004).abs() < f64::EPSILON);
    }
}
