use super::{funded_main, mock_rpc, test_config};
use crate::launchpad::Launchpad;
use crate::observability::TraceContext;
use crate::rpc_manager::{BlockhashInfo, ChainRpc};
use crate::structured_logging::StructuredLogger;
use crate::test_utils::{MockRpc, SendBehavior};
use crate::tx_builder::{
    build_signed_batch, plan_instructions, BatchOutcome, Bundle, Bundler, ComputeBudget, MockBundler,
    SignedBatch, SubmissionCoordinator, SubmissionMode, SubmissionSettings, TransactionBuilderError,
};
use solana_sdk::{pubkey::Pubkey, system_instruction};
use std::sync::Arc;

fn coordinator(rpc: &Arc<MockRpc>, bundler: Arc<dyn Bundler>, simulate_first: bool) -> SubmissionCoordinator {
    let mut config = test_config(&std::env::temp_dir(), Launchpad::PumpFun, 4, SubmissionMode::Sequential);
    config.relay.simulate_first = simulate_first;
    SubmissionCoordinator::new(
        Arc::clone(rpc) as Arc<dyn ChainRpc>,
        bundler,
        SubmissionSettings::from_config(&config),
        StructuredLogger::new("submission-test".to_string()),
    )
}

/// Independent signed transfers from `main`, each to a fresh recipient
async fn transfers(rpc: &MockRpc, main: &crate::wallet::Wallet, count: usize) -> Vec<SignedBatch> {
    let blockhash: BlockhashInfo = rpc.get_latest_blockhash().await.unwrap();
    (0..count)
        .map(|_| {
            let ix = system_instruction::transfer(&main.pubkey(), &Pubkey::new_unique(), 1_000);
            let plan = plan_instructions(ComputeBudget::DISTRIBUTION, [ix]).unwrap();
            build_signed_batch(main.keypair(), &[main.keypair()], &plan.instructions, &[], blockhash).unwrap()
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_sequential_confirms_every_batch_in_order() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let batches = transfers(&rpc, &main, 3).await;

    let report = coordinator(&rpc, Arc::new(MockBundler::new_success()), false)
        .submit_sequential(&batches)
        .await;

    assert!(report.is_complete());
    assert_eq!(report.outcomes.len(), 3);
    let sent: Vec<_> = rpc.sent_transactions().iter().map(|tx| tx.signatures[0]).collect();
    let expected: Vec<_> = batches.iter().map(|b| b.signature()).collect();
    assert_eq!(sent, expected);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_stops_at_first_failed_batch() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let batches = transfers(&rpc, &main, 4).await;

    rpc.script_sends([
        SendBehavior::Land,
        SendBehavior::LandWithError("InstructionError(2, Custom(6002))".to_string()),
    ]);
    let report = coordinator(&rpc, Arc::new(MockBundler::new_success()), false)
        .submit_sequential(&batches)
        .await;

    assert_eq!(report.resume_from, Some(1));
    assert_eq!(report.outcomes.len(), 2);
    assert!(report.outcomes[0].is_confirmed());
    assert!(matches!(report.outcomes[1], BatchOutcome::ConfirmedWithError { .. }));
    assert_eq!(rpc.sent_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_batch_halts_without_rebroadcast() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let batches = transfers(&rpc, &main, 2).await;

    rpc.script_sends([SendBehavior::Drop]);
    let report = coordinator(&rpc, Arc::new(MockBundler::new_success()), false)
        .submit_sequential(&batches)
        .await;

    assert_eq!(report.resume_from, Some(0));
    assert!(matches!(report.outcomes[0], BatchOutcome::Unconfirmed { .. }));
    assert_eq!(rpc.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_broadcast_retries_identical_bytes() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let batches = transfers(&rpc, &main, 1).await;

    rpc.script_sends([SendBehavior::Reject, SendBehavior::Reject]);
    let report = coordinator(&rpc, Arc::new(MockBundler::new_success()), false)
        .submit_sequential(&batches)
        .await;

    assert!(report.is_complete());
    let sent = rpc.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].signatures[0], batches[0].signature());
    assert_eq!(
        bincode::serialize(&sent[0]).unwrap(),
        batches[0].wire_bytes().unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_failure_after_retries() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let batches = transfers(&rpc, &main, 2).await;

    rpc.script_sends(std::iter::repeat(SendBehavior::Reject).take(3));
    let report = coordinator(&rpc, Arc::new(MockBundler::new_success()), false)
        .submit_sequential(&batches)
        .await;

    assert_eq!(report.resume_from, Some(0));
    assert!(matches!(report.outcomes[0], BatchOutcome::BroadcastFailed { .. }));
    assert_eq!(rpc.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bundle_submission_preserves_order() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let mut batches = transfers(&rpc, &main, 3).await.into_iter();
    let bundle = Bundle::new(batches.next().unwrap(), batches.collect()).unwrap();

    let bundler = Arc::new(MockBundler::new_success());
    let report = coordinator(&rpc, bundler.clone(), false)
        .submit_bundle(&bundle, &TraceContext::new("test"))
        .await
        .unwrap();

    assert_eq!(report.signatures, bundle.signatures());
    assert_eq!(bundler.submitted(), vec![bundle.signatures()]);
    assert!(!report.bundle_id.0.is_empty());
    // nothing goes through the node in bundle mode
    assert_eq!(rpc.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bundle_failure_has_no_sequential_fallback() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let mut batches = transfers(&rpc, &main, 2).await.into_iter();
    let bundle = Bundle::new(batches.next().unwrap(), batches.collect()).unwrap();

    let err = coordinator(&rpc, Arc::new(MockBundler::new_failure()), false)
        .submit_bundle(&bundle, &TraceContext::new("test"))
        .await
        .unwrap_err();

    assert!(matches!(err, TransactionBuilderError::Bundler(_)));
    assert_eq!(rpc.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_bundle_simulation_skips_submission() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let mut batches = transfers(&rpc, &main, 2).await.into_iter();
    let bundle = Bundle::new(batches.next().unwrap(), batches.collect()).unwrap();

    let bundler = Arc::new(MockBundler::new_success().with_simulation_failure("failed at tx 1"));
    let err = coordinator(&rpc, bundler.clone(), true)
        .submit_bundle(&bundle, &TraceContext::new("test"))
        .await
        .unwrap_err();

    assert!(matches!(err, TransactionBuilderError::Simulation(_)));
    assert!(bundler.submitted().is_empty());
}
