//! Flow tests driven against the in-memory chain
//!
//! Everything here runs with tokio's clock paused, so settle delays, backoff
//! and confirmation polling cost no wall time.

mod batch_builder_tests;
mod funds_tests;
mod lookup_table_tests;
mod submission_tests;

use crate::config::{sol_to_lamports, Config};
use crate::launchpad::Launchpad;
use crate::test_utils::MockRpc;
use crate::tx_builder::SubmissionMode;
use crate::wallet::{Wallet, WalletRole};
use solana_sdk::signature::Keypair;
use std::path::Path;
use std::sync::Arc;

/// Config with every delay shortened and retries kept small
pub(crate) fn test_config(data_dir: &Path, launchpad: Launchpad, pool_size: usize, mode: SubmissionMode) -> Config {
    let mut config = Config::default();
    config.launch.launchpad = launchpad;
    config.launch.pool_size = pool_size;
    config.launch.mode = mode;
    config.launch.swap_amount_sol = 0.1;
    config.storage.data_dir = data_dir.to_path_buf();

    config.retry.base_backoff_ms = 2;
    config.retry.max_backoff_ms = 4;

    config.timing.table_create_settle_ms = 0;
    config.timing.extend_step_settle_ms = 0;
    config.timing.confirm_poll_interval_ms = 10;
    config.timing.max_confirm_polls = 3;
    config.timing.ready_polls = 3;
    config.timing.ready_poll_interval_ms = 10;
    config.timing.recovery_stagger_ms = 10;

    config.relay.status_polls = 2;
    config.relay.status_poll_interval_ms = 10;
    config
}

pub(crate) fn funded_main(rpc: &MockRpc, sol: f64) -> Wallet {
    let main = Wallet::new(Keypair::new(), WalletRole::Main);
    rpc.set_balance(&main.pubkey(), sol_to_lamports(sol));
    main
}

pub(crate) fn mock_rpc() -> Arc<MockRpc> {
    Arc::new(MockRpc::new())
}
