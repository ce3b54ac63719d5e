//! Buy batch partitioning against real launchpad instruction sets

use crate::compat;
use crate::launchpad::{builder_for, Launchpad, LaunchpadBuilder, TokenMetadata};
use crate::rpc_manager::BlockhashInfo;
use crate::tx_builder::{
    build_batches, build_creation_batch, pick_tip_account, BatchPlan, Bundle, TransactionBuilderError,
    WalletInstructions,
};
use proptest::prelude::*;
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    hash::Hash,
    packet::PACKET_DATA_SIZE,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::collections::HashSet;
use std::sync::Arc;

const SWAP_LAMPORTS: u64 = 100_000_000;

struct Fixture {
    builder: Arc<dyn LaunchpadBuilder>,
    main: Keypair,
    mint: Keypair,
    wallets: Vec<Keypair>,
    table: AddressLookupTableAccount,
    blockhash: BlockhashInfo,
}

impl Fixture {
    fn new(launchpad: Launchpad, pool: usize) -> Self {
        let builder = builder_for(launchpad, 1_000);
        let main = Keypair::new();
        let mint = Keypair::new();
        let wallets: Vec<Keypair> = (0..pool).map(|_| Keypair::new()).collect();
        let pubkeys: Vec<Pubkey> = wallets.iter().map(|w| w.pubkey()).collect();
        let addresses = builder
            .lookup_table_steps(&main.pubkey(), &mint.pubkey(), &pubkeys)
            .into_iter()
            .flat_map(|s| s.addresses)
            .collect();
        Self {
            builder,
            main,
            mint,
            wallets,
            table: AddressLookupTableAccount {
                key: Pubkey::new_unique(),
                addresses,
            },
            blockhash: BlockhashInfo {
                blockhash: Hash::new_unique(),
                last_valid_block_height: 1_000,
            },
        }
    }

    fn slots(&self, present: impl Fn(usize) -> bool) -> Vec<Option<WalletInstructions<'_>>> {
        self.wallets
            .iter()
            .enumerate()
            .map(|(i, wallet)| {
                present(i).then(|| WalletInstructions {
                    wallet,
                    instructions: self
                        .builder
                        .build_buy(&wallet.pubkey(), &self.mint.pubkey(), &self.main.pubkey(), SWAP_LAMPORTS, i)
                        .unwrap()
                        .instructions,
                })
            })
            .collect()
    }

    fn plan(&self) -> BatchPlan {
        BatchPlan {
            group_size: self.builder.group_size(),
            compute_budget: self.builder.buy_compute_budget(),
        }
    }
}

#[test]
fn test_bonk_pool_of_nine_builds_three_batches() {
    let fx = Fixture::new(Launchpad::Bonk, 9);
    let batches = build_batches(&fx.slots(|_| true), &fx.table, fx.blockhash, &fx.plan()).unwrap();

    assert_eq!(batches.len(), 3);
    for (group, batch) in batches.iter().enumerate() {
        // 2 budget + 3 wallets x 5
        assert_eq!(batch.instruction_count, 17);
        assert_eq!(batch.wallet_indices, vec![group * 3, group * 3 + 1, group * 3 + 2]);
        assert_eq!(batch.fee_payer, fx.wallets[group * 3].pubkey());
        assert!(batch.serialized_size <= PACKET_DATA_SIZE);
        assert_eq!(batch.valid_until, 1_000);

        // the payer signs first; the compiler orders the other signers by key
        let signers = compat::get_required_signers(&batch.tx.message);
        assert_eq!(signers[0], batch.fee_payer);
        let signer_set: HashSet<Pubkey> = signers.iter().copied().collect();
        let expected: HashSet<Pubkey> = (0..3).map(|o| fx.wallets[group * 3 + o].pubkey()).collect();
        assert_eq!(signers.len(), 3);
        assert_eq!(signer_set, expected);
        assert_eq!(compat::get_address_table_lookups(&batch.tx.message).len(), 1);
        assert!(batch.tx.verify_with_results().into_iter().all(|ok| ok));
    }

    let create = fx
        .builder
        .build_create(
            &fx.main.pubkey(),
            &fx.mint.pubkey(),
            &TokenMetadata {
                name: "Bundle".to_string(),
                symbol: "BNDL".to_string(),
                uri: "https://example.invalid/bndl.json".to_string(),
            },
        )
        .unwrap();
    let creation = build_creation_batch(
        &fx.main,
        &fx.mint,
        create.instructions,
        1_000_000,
        &pick_tip_account(),
        fx.blockhash,
    )
    .unwrap();
    let creation_sig = creation.signature();

    let bundle = Bundle::new(creation, batches).unwrap();
    assert_eq!(bundle.len(), 4);
    assert_eq!(bundle.signatures()[0], creation_sig);
}

#[test]
fn test_pumpfun_full_groups_fit_packet() {
    let fx = Fixture::new(Launchpad::PumpFun, 16);
    let batches = build_batches(&fx.slots(|_| true), &fx.table, fx.blockhash, &fx.plan()).unwrap();

    assert_eq!(batches.len(), 4);
    for batch in &batches {
        assert_eq!(batch.instruction_count, 2 + 4 * 2);
        assert!(batch.serialized_size <= PACKET_DATA_SIZE);
    }
}

#[test]
fn test_absent_wallets_are_skipped_and_empty_groups_dropped() {
    let fx = Fixture::new(Launchpad::PumpFun, 12);
    // group 1 (4..8) keeps only wallet 6, group 2 (8..12) is empty
    let slots = fx.slots(|i| i < 4 || i == 6);
    let batches = build_batches(&slots, &fx.table, fx.blockhash, &fx.plan()).unwrap();

    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].wallet_indices, vec![6]);
    assert_eq!(batches[1].fee_payer, fx.wallets[6].pubkey());
    assert_eq!(batches[1].instruction_count, 4);
}

#[test]
fn test_zero_group_size_is_a_configuration_error() {
    let fx = Fixture::new(Launchpad::PumpFun, 2);
    let plan = BatchPlan {
        group_size: 0,
        compute_budget: fx.builder.buy_compute_budget(),
    };
    let err = build_batches(&fx.slots(|_| true), &fx.table, fx.blockhash, &plan).unwrap_err();
    assert!(matches!(err, TransactionBuilderError::Configuration(_)));
}

#[test]
fn test_bundle_rejects_more_than_five_transactions() {
    let fx = Fixture::new(Launchpad::PumpFun, 20);
    let batches = build_batches(&fx.slots(|_| true), &fx.table, fx.blockhash, &fx.plan()).unwrap();
    assert_eq!(batches.len(), 5);

    let mut iter = batches.into_iter();
    let first = iter.next().unwrap();
    let bundle = Bundle::new(first, iter.collect()).unwrap();
    assert_eq!(bundle.len(), 5);

    let fx = Fixture::new(Launchpad::PumpFun, 24);
    let mut batches = build_batches(&fx.slots(|_| true), &fx.table, fx.blockhash, &fx.plan())
        .unwrap()
        .into_iter();
    let first = batches.next().unwrap();
    assert!(matches!(
        Bundle::new(first, batches.collect()),
        Err(TransactionBuilderError::Bundler(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_batches_cover_present_wallets_in_group_order(mask in proptest::collection::vec(any::<bool>(), 1..12)) {
        let fx = Fixture::new(Launchpad::PumpFun, mask.len());
        let slots = fx.slots(|i| mask[i]);
        let batches = build_batches(&slots, &fx.table, fx.blockhash, &fx.plan()).unwrap();
        let group_size = fx.builder.group_size();

        let covered: Vec<usize> = batches.iter().flat_map(|b| b.wallet_indices.iter().copied()).collect();
        let present: Vec<usize> = (0..mask.len()).filter(|i| mask[*i]).collect();
        prop_assert_eq!(covered, present);

        for batch in &batches {
            prop_assert!(!batch.wallet_indices.is_empty());
            prop_assert!(batch.wallet_indices.len() <= group_size);
            let group = batch.wallet_indices[0] / group_size;
            prop_assert!(batch.wallet_indices.iter().all(|i| i / group_size == group));
            prop_assert_eq!(batch.fee_payer, fx.wallets[batch.wallet_indices[0]].pubkey());
        }
    }
}
