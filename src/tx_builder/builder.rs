//! Batch construction
//!
//! Turns per-wallet instruction slices into signed v0 transactions bound to a
//! lookup table. Construction is pure: given the same inputs it produces the
//! same partition, and any failure discards the whole build.

use crate::compat;
use crate::metrics::{metrics, Timer};
use crate::rpc_manager::BlockhashInfo;
use crate::tx_builder::errors::{TransactionBuilderError, TxResult};
use crate::tx_builder::instructions::{plan_instructions, ComputeBudget};
use crate::tx_builder::output::SignedBatch;
use smallvec::SmallVec;
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    hash::Hash,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    packet::PACKET_DATA_SIZE,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
    transaction::VersionedTransaction,
};
use tracing::{debug, instrument};

/// One wallet's instruction slice for a batch
#[derive(Debug)]
pub struct WalletInstructions<'a> {
    pub wallet: &'a Keypair,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchPlan {
    /// Wallets per transaction
    pub group_size: usize,
    pub compute_budget: ComputeBudget,
}

/// Partition wallet slots into signed batches
///
/// Slot `i` is pool index `i`; groups are consecutive runs of `group_size`
/// slots. An absent slot (or one with no instructions) is skipped, and a
/// group with no present wallet yields no batch. The first present wallet of
/// each group pays.
#[instrument(skip_all, fields(slots = slots.len(), group_size = plan.group_size))]
pub fn build_batches(
    slots: &[Option<WalletInstructions<'_>>],
    lookup_table: &AddressLookupTableAccount,
    blockhash: BlockhashInfo,
    plan: &BatchPlan,
) -> TxResult<Vec<SignedBatch>> {
    if plan.group_size == 0 {
        return Err(TransactionBuilderError::Configuration(
            "group_size must be at least 1".to_string(),
        ));
    }

    let timer = Timer::with_name("build_latency_seconds");
    let mut batches = Vec::with_capacity(slots.len().div_ceil(plan.group_size));

    for (group_idx, group) in slots.chunks(plan.group_size).enumerate() {
        let members: SmallVec<[(usize, &WalletInstructions<'_>); 4]> = group
            .iter()
            .enumerate()
            .filter_map(|(offset, slot)| {
                slot.as_ref()
                    .filter(|w| !w.instructions.is_empty())
                    .map(|w| (group_idx * plan.group_size + offset, w))
            })
            .collect();

        let Some(&(_, payer)) = members.first() else {
            debug!(group = group_idx, "Skipping group with no present wallets");
            continue;
        };

        let mut signers: SmallVec<[&Keypair; 4]> = SmallVec::new();
        for (_, member) in &members {
            if !signers.iter().any(|s| s.pubkey() == member.wallet.pubkey()) {
                signers.push(member.wallet);
            }
        }

        let body = members
            .iter()
            .flat_map(|(_, member)| member.instructions.iter().cloned());
        let plan_ixs = plan_instructions(plan.compute_budget, body)?;

        let mut batch = build_signed_batch(
            payer.wallet,
            &signers,
            &plan_ixs.instructions,
            std::slice::from_ref(lookup_table),
            blockhash,
        )?;
        batch.wallet_indices = members.iter().map(|(idx, _)| *idx).collect();
        batches.push(batch);
    }

    timer.finish();
    Ok(batches)
}

/// The index-0 transaction: tip transfer then the launchpad create
/// instructions, paid by `main`, signed by `main` and `mint`
#[instrument(skip_all, fields(mint = %mint.pubkey(), tip_lamports = tip_lamports))]
pub fn build_creation_batch(
    main: &Keypair,
    mint: &Keypair,
    create_ixs: Vec<Instruction>,
    tip_lamports: u64,
    tip_account: &Pubkey,
    blockhash: BlockhashInfo,
) -> TxResult<SignedBatch> {
    let mut body = Vec::with_capacity(create_ixs.len() + 1);
    if tip_lamports > 0 {
        body.push(system_instruction::transfer(&main.pubkey(), tip_account, tip_lamports));
    }
    body.extend(create_ixs);

    let plan = plan_instructions(ComputeBudget::CREATION, body)?;
    build_signed_batch(main, &[main, mint], &plan.instructions, &[], blockhash)
}

/// Compile, verify and sign a single transaction
///
/// `signers[0]` must be `payer`. Fails when the message's signer slots are
/// not exactly `signers` or the wire size exceeds the packet limit.
pub fn build_signed_batch(
    payer: &Keypair,
    signers: &[&Keypair],
    instructions: &[Instruction],
    lookup_tables: &[AddressLookupTableAccount],
    blockhash: BlockhashInfo,
) -> TxResult<SignedBatch> {
    let tx = compile_and_sign(payer, signers, instructions, lookup_tables, blockhash.blockhash)?;

    let serialized_size = bincode::serialize(&tx)
        .map_err(|e| TransactionBuilderError::internal(format!("serialize transaction: {e}")))?
        .len();
    if serialized_size > PACKET_DATA_SIZE {
        return Err(TransactionBuilderError::BatchTooLarge {
            size: serialized_size,
            limit: PACKET_DATA_SIZE,
        });
    }

    metrics().batches_built.inc();
    metrics().batch_size_bytes.observe(serialized_size as f64);

    Ok(SignedBatch {
        fee_payer: payer.pubkey(),
        signers: signers.iter().map(|s| s.pubkey()).collect(),
        wallet_indices: Vec::new(),
        instruction_count: instructions.len(),
        serialized_size,
        valid_until: blockhash.last_valid_block_height,
        tx,
    })
}

fn compile_and_sign(
    payer: &Keypair,
    signers: &[&Keypair],
    instructions: &[Instruction],
    lookup_tables: &[AddressLookupTableAccount],
    blockhash: Hash,
) -> TxResult<VersionedTransaction> {
    if signers.first().map(|s| s.pubkey()) != Some(payer.pubkey()) {
        return Err(TransactionBuilderError::SignerMismatch(
            "fee payer must be the first signer".to_string(),
        ));
    }

    let message = v0::Message::try_compile(&payer.pubkey(), instructions, lookup_tables, blockhash)
        .map_err(|e| TransactionBuilderError::MessageCompile(e.to_string()))?;
    let message = VersionedMessage::V0(message);

    let expected: SmallVec<[Pubkey; 4]> = signers.iter().map(|s| s.pubkey()).collect();
    if !compat::signer_set_matches(&message, &expected) {
        return Err(TransactionBuilderError::SignerMismatch(format!(
            "message requires {:?}, provided {:?}",
            compat::get_required_signers(&message),
            expected
        )));
    }

    VersionedTransaction::try_new(message, signers)
        .map_err(|e| TransactionBuilderError::Signing(e.to_string()))
}
