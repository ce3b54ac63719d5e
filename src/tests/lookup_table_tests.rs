use super::{funded_main, mock_rpc, test_config};
use crate::launchpad::Launchpad;
use crate::retry::RetryPolicy;
use crate::rpc_manager::ChainRpc;
use crate::test_utils::{MockRpc, SendBehavior};
use crate::tx_builder::lookup_table::chunk_steps;
use crate::tx_builder::{LookupTableManager, LookupTableStep, LookupTableTiming, SubmissionMode, TransactionBuilderError};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

fn keys(n: usize) -> Vec<Pubkey> {
    (0..n).map(|_| Pubkey::new_unique()).collect()
}

fn manager(rpc: &Arc<MockRpc>) -> LookupTableManager {
    let dir = std::env::temp_dir();
    let config = test_config(&dir, Launchpad::PumpFun, 4, SubmissionMode::Bundle);
    LookupTableManager::new(
        Arc::clone(rpc) as Arc<dyn ChainRpc>,
        RetryPolicy::lookup_table(&config.retry),
        LookupTableTiming::from_config(&config),
    )
}

fn three_steps() -> Vec<LookupTableStep> {
    chunk_steps([("wallets", keys(35)), ("statics", keys(5))])
}

#[tokio::test(start_paused = true)]
async fn test_create_extend_and_ready() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let lut = manager(&rpc);

    let table = lut.create(main.keypair()).await.unwrap();
    assert!(rpc.get_account_data(&table).await.unwrap().is_some());

    let steps = three_steps();
    assert_eq!(steps.len(), 3);
    let mut completed = Vec::new();
    lut.extend_all(&table, main.keypair(), &steps, 0, |done| {
        completed.push(done);
        Ok(())
    })
    .await
    .unwrap();
    assert_eq!(completed, vec![1, 2, 3]);

    let expected: Vec<Pubkey> = steps.iter().flat_map(|s| s.addresses.clone()).collect();
    let account = lut.wait_until_ready(&table, &expected).await.unwrap();
    assert_eq!(account.key, table);
    assert_eq!(account.addresses, expected);
    assert_eq!(rpc.sent_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_step_that_landed_is_not_resubmitted() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let lut = manager(&rpc);
    let table = lut.create(main.keypair()).await.unwrap();

    let steps = chunk_steps([("wallets", keys(12))]);
    rpc.script_sends([SendBehavior::LandUnconfirmed]);
    lut.extend_all(&table, main.keypair(), &steps, 0, |_| Ok(()))
        .await
        .unwrap();

    // one create, one extend; the retry found the addresses already present
    assert_eq!(rpc.sent_count(), 2);
    assert_eq!(rpc.lookup_table_addresses(&table), steps[0].addresses);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_step_resubmits_only_missing_addresses() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let lut = manager(&rpc);
    let table = lut.create(main.keypair()).await.unwrap();

    let steps = chunk_steps([("wallets", keys(8))]);
    // a third of the step is already in the table from an earlier run
    let mut present = rpc.lookup_table_addresses(&table);
    present.extend_from_slice(&steps[0].addresses[..3]);
    rpc.insert_lookup_table(&table, &main.pubkey(), &present);

    rpc.script_sends([SendBehavior::Drop]);
    lut.extend_all(&table, main.keypair(), &steps, 0, |_| Ok(()))
        .await
        .unwrap();

    assert_eq!(rpc.lookup_table_addresses(&table), steps[0].addresses);
    let resent = rpc.sent_transactions().pop().unwrap();
    let resent_data = &resent.message.instructions().last().unwrap().data;
    // tag + vec length + five addresses
    assert_eq!(resent_data.len(), 4 + 8 + 5 * 32);
}

#[tokio::test(start_paused = true)]
async fn test_failed_step_stops_later_steps() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let lut = manager(&rpc);
    let table = lut.create(main.keypair()).await.unwrap();

    let steps = three_steps();
    rpc.script_sends([
        SendBehavior::Land,
        SendBehavior::LandWithError("InstructionError(0, InvalidAccountData)".to_string()),
    ]);
    let mut completed = Vec::new();
    let err = lut
        .extend_all(&table, main.keypair(), &steps, 0, |done| {
            completed.push(done);
            Ok(())
        })
        .await
        .unwrap_err();

    match err {
        TransactionBuilderError::PartialExtension {
            completed_steps,
            total_steps,
            ..
        } => {
            assert_eq!(completed_steps, 1);
            assert_eq!(total_steps, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(completed, vec![1]);
    assert_eq!(rpc.lookup_table_addresses(&table), steps[0].addresses);
    // create + step 0 + failed step 1; step 2 never sent
    assert_eq!(rpc.sent_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_extend_resumes_from_recorded_step() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let lut = manager(&rpc);
    let table = lut.create(main.keypair()).await.unwrap();

    let steps = three_steps();
    rpc.insert_lookup_table(&table, &main.pubkey(), &steps[0].addresses);
    let mut completed = Vec::new();
    lut.extend_all(&table, main.keypair(), &steps, 1, |done| {
        completed.push(done);
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(completed, vec![2, 3]);
    assert_eq!(rpc.sent_count(), 3);
    assert_eq!(rpc.lookup_table_addresses(&table).len(), 40);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_create_reuses_landed_table() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let lut = manager(&rpc);

    rpc.script_sends([SendBehavior::LandUnconfirmed]);
    let table = lut.create(main.keypair()).await.unwrap();

    assert_eq!(rpc.sent_count(), 1);
    assert!(rpc.get_account_data(&table).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_missing_addresses_are_not_ready() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let lut = manager(&rpc);
    let table = lut.create(main.keypair()).await.unwrap();

    let expected = keys(2);
    rpc.insert_lookup_table(&table, &main.pubkey(), &expected[..1]);
    let err = lut.wait_until_ready(&table, &expected).await.unwrap_err();
    assert!(matches!(
        err,
        TransactionBuilderError::LookupTableNotReady { missing: 1, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_rerun_skips_step_that_landed_unconfirmed() {
    let rpc = mock_rpc();
    let main = funded_main(&rpc, 1.0);
    let lut = manager(&rpc);
    let table = lut.create(main.keypair()).await.unwrap();

    let steps = chunk_steps([("wallets", keys(4))]);
    // every attempt is lost except the last, which lands without confirming
    rpc.script_sends(
        std::iter::repeat(SendBehavior::Drop)
            .take(4)
            .chain([SendBehavior::LandUnconfirmed]),
    );
    let err = lut
        .extend_all(&table, main.keypair(), &steps, 0, |_| Ok(()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransactionBuilderError::PartialExtension { completed_steps: 0, .. }
    ));
    assert_eq!(rpc.lookup_table_addresses(&table), steps[0].addresses);
    let sent = rpc.sent_count();

    // a restarted run begins at the same step
    lut.extend_all(&table, main.keypair(), &steps, 0, |_| Ok(()))
        .await
        .unwrap();

    assert_eq!(rpc.sent_count(), sent);
    assert_eq!(rpc.lookup_table_addresses(&table), steps[0].addresses);
}
