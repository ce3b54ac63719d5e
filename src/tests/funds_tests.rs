use super::{funded_main, mock_rpc, test_config};
use crate::checkpoint::CheckpointStore;
use crate::config::sol_to_lamports;
use crate::funds::{FundManager, FundingPlan, RecoveryOutcome, SellTarget, MAX_TRANSFERS_PER_TX};
use crate::launchpad::{builder_for, Launchpad};
use crate::rpc_manager::{ChainRpc, TokenHolding};
use crate::structured_logging::StructuredLogger;
use crate::test_utils::{MockRpc, SendBehavior};
use crate::tx_builder::{SubmissionMode, TransactionBuilderError};
use crate::wallet::WalletPool;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use std::sync::Arc;

const SWAP: u64 = 100_000_000;

fn fund_manager(rpc: &Arc<MockRpc>) -> FundManager {
    let config = test_config(&std::env::temp_dir(), Launchpad::PumpFun, 4, SubmissionMode::Bundle);
    FundManager::new(
        Arc::clone(rpc) as Arc<dyn ChainRpc>,
        &config,
        StructuredLogger::new("funds-test".to_string()),
    )
}

#[tokio::test(start_paused = true)]
async fn test_insufficient_balance_aborts_before_generating_pool() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 0.5);
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());

    let plan = FundingPlan::new(12, SWAP, 40_000_000);
    let err = fund_manager(&rpc).distribute(&main, &plan, &store).await.unwrap_err();

    match err {
        TransactionBuilderError::InsufficientBalance { required, available } => {
            assert_eq!(required, plan.required_lamports());
            assert_eq!(available, sol_to_lamports(0.5));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!store.pool_path().exists());
    assert_eq!(rpc.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_distribution_funds_every_wallet_and_persists_pool() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 5.0);
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path());

    let plan = FundingPlan::new(6, SWAP, 40_000_000);
    let distribution = fund_manager(&rpc).distribute(&main, &plan, &store).await.unwrap();

    assert_eq!(distribution.pool.len(), 6);
    assert_eq!(distribution.signatures.len(), 1);
    for pubkey in distribution.pool.pubkeys() {
        assert_eq!(rpc.balance(&pubkey), plan.per_wallet_lamports);
    }
    assert_eq!(
        rpc.balance(&main.pubkey()),
        sol_to_lamports(5.0) - 6 * plan.per_wallet_lamports
    );

    let reloaded = store.load_pool().unwrap().unwrap();
    assert_eq!(reloaded.pubkeys(), distribution.pool.pubkeys());
}

#[tokio::test(start_paused = true)]
async fn test_large_pool_is_funded_in_chunks() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 10.0);
    let pool = WalletPool::generate(MAX_TRANSFERS_PER_TX + 2);

    let signatures = fund_manager(&rpc).fund_pool(&main, &pool, SWAP).await.unwrap();

    assert_eq!(signatures.len(), 2);
    assert!(pool.pubkeys().iter().all(|p| rpc.balance(p) == SWAP));
}

#[tokio::test(start_paused = true)]
async fn test_resumed_funding_skips_funded_wallets() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 5.0);
    let pool = WalletPool::generate(6);
    let pubkeys = pool.pubkeys();
    rpc.set_balance(&pubkeys[0], SWAP);
    rpc.set_balance(&pubkeys[1], SWAP);

    fund_manager(&rpc).fund_pool(&main, &pool, SWAP).await.unwrap();

    assert!(pubkeys.iter().all(|p| rpc.balance(p) == SWAP));
    assert_eq!(rpc.balance(&main.pubkey()), sol_to_lamports(5.0) - 4 * SWAP);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_distribution_is_not_paid_twice() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 5.0);
    let pool = WalletPool::generate(4);

    rpc.script_sends([SendBehavior::LandUnconfirmed]);
    let signatures = fund_manager(&rpc).fund_pool(&main, &pool, SWAP).await.unwrap();

    assert!(signatures.is_empty());
    assert_eq!(rpc.sent_count(), 1);
    assert_eq!(rpc.balance(&main.pubkey()), sol_to_lamports(5.0) - 4 * SWAP);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_isolates_wallet_failures() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 0.01);
    let pool = WalletPool::generate(3);
    let pubkeys = pool.pubkeys();
    for pubkey in &pubkeys {
        rpc.set_balance(pubkey, SWAP);
    }

    rpc.script_sends([
        SendBehavior::Land,
        SendBehavior::LandWithError("InstructionError(0, Custom(1))".to_string()),
        SendBehavior::Land,
    ]);
    let results = fund_manager(&rpc).recover(&pool, &main, None).await;

    let labels: Vec<&str> = results.iter().map(|r| r.outcome.label()).collect();
    assert_eq!(labels, vec!["recovered", "failed", "recovered"]);
    assert_eq!(results[1].wallet, pubkeys[1]);
    assert_eq!(rpc.balance(&pubkeys[0]), 0);
    assert_eq!(rpc.balance(&pubkeys[1]), SWAP);
    assert_eq!(rpc.balance(&main.pubkey()), sol_to_lamports(0.01) + 2 * SWAP);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_sells_launch_mint_then_closes_accounts() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 0.01);
    let pool = WalletPool::generate(1);
    let owner = pool.pubkeys()[0];
    let mint = Pubkey::new_unique();
    rpc.set_balance(&owner, 5_000_000);
    rpc.add_token_account(
        &owner,
        TokenHolding {
            address: get_associated_token_address(&owner, &mint),
            mint,
            amount: 1_000_000,
            decimals: 6,
        },
    );

    let target = SellTarget {
        builder: builder_for(Launchpad::PumpFun, 1_000),
        mint,
        creator: main.pubkey(),
    };
    let results = fund_manager(&rpc).recover(&pool, &main, Some(&target)).await;

    assert!(matches!(results[0].outcome, RecoveryOutcome::Recovered { .. }));
    // sell, then the close + sweep transaction
    assert_eq!(rpc.sent_count(), 2);
    assert!(rpc.token_holdings(&owner).is_empty());
    assert_eq!(rpc.balance(&owner), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unsellable_tokens_are_transferred_home() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 0.01);
    let pool = WalletPool::generate(1);
    let owner = pool.pubkeys()[0];
    let mint = Pubkey::new_unique();
    rpc.set_balance(&owner, 5_000_000);
    rpc.add_token_account(
        &owner,
        TokenHolding {
            address: get_associated_token_address(&owner, &mint),
            mint,
            amount: 1_000_000,
            decimals: 6,
        },
    );

    rpc.fail_simulations(u32::MAX);
    let target = SellTarget {
        builder: builder_for(Launchpad::PumpFun, 1_000),
        mint,
        creator: main.pubkey(),
    };
    let results = fund_manager(&rpc).recover(&pool, &main, Some(&target)).await;

    assert!(matches!(results[0].outcome, RecoveryOutcome::Recovered { .. }));
    // no sell was ever broadcast; the sweep moved the tokens and closed the account
    assert_eq!(rpc.sent_count(), 1);
    assert!(rpc.token_holdings(&owner).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_empty_wallet_has_nothing_to_recover() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 0.01);
    let pool = WalletPool::generate(2);

    let results = fund_manager(&rpc).recover(&pool, &main, None).await;

    assert!(results
        .iter()
        .all(|r| r.outcome == RecoveryOutcome::NothingToRecover));
    assert_eq!(rpc.sent_count(), 0);
}
