//! Fund distribution and recovery
//!
//! `distribute` moves SOL from the main wallet to a freshly generated pool;
//! `recover` sweeps every pool wallet back. Both verify on-chain state before
//! retrying so a transaction that landed after its confirmation timed out is
//! never paid twice.

use crate::checkpoint::CheckpointStore;
use crate::config::{lamports_to_sol, Config};
use crate::launchpad::LaunchpadBuilder;
use crate::metrics::metrics;
use crate::retry::{retry_required, retry_with_policy, RetryPolicy};
use crate::rpc_manager::{ChainRpc, TokenHolding};
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::builder::build_signed_batch;
use crate::tx_builder::errors::{TransactionBuilderError, TxResult};
use crate::tx_builder::instructions::{plan_instructions, ComputeBudget};
use crate::tx_builder::submit::{send_and_confirm, ConfirmPolling};
use crate::wallet::{Wallet, WalletPool};
use futures::future::join_all;
use parking_lot::Mutex;
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Distribution refuses to start at or below this main balance
pub const MIN_MAIN_BALANCE_LAMPORTS: u64 = 4_000_000;
/// Fee headroom each pool wallet receives on top of its swap amount
pub const FEE_HEADROOM_LAMPORTS: u64 = 10_000_000;
/// Transfers per funding transaction; keeps an unaided v0 message under the
/// packet limit
pub const MAX_TRANSFERS_PER_TX: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingPlan {
    pub pool_size: usize,
    pub per_wallet_lamports: u64,
    pub overhead_lamports: u64,
}

impl FundingPlan {
    pub fn new(pool_size: usize, swap_lamports: u64, overhead_lamports: u64) -> Self {
        Self {
            pool_size,
            per_wallet_lamports: swap_lamports + FEE_HEADROOM_LAMPORTS,
            overhead_lamports,
        }
    }

    /// `(swap + headroom) * N + overhead`
    pub fn required_lamports(&self) -> u64 {
        self.per_wallet_lamports
            .saturating_mul(self.pool_size as u64)
            .saturating_add(self.overhead_lamports)
    }
}

#[derive(Debug)]
pub struct Distribution {
    pub pool: WalletPool,
    pub signatures: Vec<Signature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Recovered { signature: Signature },
    NothingToRecover,
    Failed { reason: String },
}

impl RecoveryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Recovered { .. } => "recovered",
            Self::NothingToRecover => "nothing_to_recover",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalletRecovery {
    pub wallet: Pubkey,
    pub outcome: RecoveryOutcome,
}

/// What recovery sells before sweeping; holdings of any other mint are only
/// transferred
#[derive(Clone)]
pub struct SellTarget {
    pub builder: Arc<dyn LaunchpadBuilder>,
    pub mint: Pubkey,
    pub creator: Pubkey,
}

pub struct FundManager {
    rpc: Arc<dyn ChainRpc>,
    polling: ConfirmPolling,
    distribution: RetryPolicy,
    sell: RetryPolicy,
    sweep: RetryPolicy,
    stagger: Duration,
    logger: StructuredLogger,
}

impl FundManager {
    pub fn new(rpc: Arc<dyn ChainRpc>, config: &Config, logger: StructuredLogger) -> Self {
        Self {
            rpc,
            polling: ConfirmPolling::from_config(config),
            distribution: RetryPolicy::distribution(&config.retry),
            sell: RetryPolicy::recovery_sell(&config.retry),
            sweep: RetryPolicy::recovery_sweep(&config.retry),
            stagger: Duration::from_millis(config.timing.recovery_stagger_ms),
            logger,
        }
    }

    /// Fail with `InsufficientBalance` unless main can fund `plan`
    pub async fn check_balance(&self, main: &Pubkey, plan: &FundingPlan) -> TxResult<u64> {
        let available = self.rpc.get_balance(main).await?;
        let required = plan.required_lamports().max(MIN_MAIN_BALANCE_LAMPORTS + 1);
        if available < required {
            warn!(
                main = %main,
                required_sol = lamports_to_sol(required),
                available_sol = lamports_to_sol(available),
                "Main wallet balance too low"
            );
            return Err(TransactionBuilderError::InsufficientBalance { required, available });
        }
        Ok(available)
    }

    /// Check the balance, generate and persist the pool, then fund it
    #[instrument(skip_all, fields(main = %main.pubkey(), pool_size = plan.pool_size))]
    pub async fn distribute(
        &self,
        main: &Wallet,
        plan: &FundingPlan,
        store: &CheckpointStore,
    ) -> TxResult<Distribution> {
        self.check_balance(&main.pubkey(), plan).await?;

        let pool = WalletPool::generate(plan.pool_size);
        store
            .save_pool(&pool)
            .map_err(TransactionBuilderError::persistence)?;

        let signatures = self.fund_pool(main, &pool, plan.per_wallet_lamports).await?;
        Ok(Distribution { pool, signatures })
    }

    /// Transfer `per_wallet` lamports to every pool wallet
    ///
    /// Wallets already holding at least `per_wallet` are skipped, so a
    /// resumed run only funds what is missing.
    pub async fn fund_pool(&self, main: &Wallet, pool: &WalletPool, per_wallet: u64) -> TxResult<Vec<Signature>> {
        let mut unfunded = Vec::with_capacity(pool.len());
        for pubkey in pool.pubkeys() {
            if self.rpc.get_balance(&pubkey).await? < per_wallet {
                unfunded.push(pubkey);
            }
        }
        if unfunded.len() < pool.len() {
            info!(already_funded = pool.len() - unfunded.len(), "Skipping funded wallets");
        }

        let mut signatures = Vec::new();
        for chunk in unfunded.chunks(MAX_TRANSFERS_PER_TX) {
            if let Some(signature) = self.fund_chunk(main.keypair(), chunk, per_wallet).await? {
                signatures.push(signature);
            }
            metrics().wallets_funded.inc_by(chunk.len() as u64);
        }
        info!(
            wallets = unfunded.len(),
            per_wallet_sol = lamports_to_sol(per_wallet),
            transactions = signatures.len(),
            "Pool funded"
        );
        Ok(signatures)
    }

    /// `None` when a retry finds the chunk already funded
    async fn fund_chunk(&self, main: &Keypair, wallets: &[Pubkey], per_wallet: u64) -> TxResult<Option<Signature>> {
        let rpc = self.rpc.as_ref();
        let polling = &self.polling;

        retry_required("distribute", &self.distribution, |attempt| async move {
            if attempt > 1 && self.all_funded(wallets, per_wallet).await? {
                info!("Funding from a previous attempt landed");
                return Ok(None);
            }

            let transfers = wallets
                .iter()
                .map(|w| system_instruction::transfer(&main.pubkey(), w, per_wallet));
            let plan = plan_instructions(ComputeBudget::DISTRIBUTION, transfers)?;
            let blockhash = rpc.get_latest_blockhash().await?;
            let batch = build_signed_batch(main, &[main], &plan.instructions, &[], blockhash)?;
            send_and_confirm(rpc, &batch, polling).await.map(Some)
        })
        .await
    }

    async fn all_funded(&self, wallets: &[Pubkey], per_wallet: u64) -> TxResult<bool> {
        for wallet in wallets {
            if self.rpc.get_balance(wallet).await? < per_wallet {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Sweep every pool wallet into `main`
    ///
    /// Wallets run concurrently, wallet `i` starting after `i * stagger`.
    /// A failure is recorded against its wallet and never stops the others.
    #[instrument(skip_all, fields(main = %main.pubkey(), wallets = pool.len()))]
    pub async fn recover(&self, pool: &WalletPool, main: &Wallet, sell: Option<&SellTarget>) -> Vec<WalletRecovery> {
        let tasks = pool.iter().enumerate().map(|(index, wallet)| async move {
            sleep(self.stagger * index as u32).await;
            let outcome = self.recover_wallet(wallet, main, sell).await;
            self.logger
                .log_wallet_recovery(&wallet.pubkey().to_string(), outcome.label());
            match &outcome {
                RecoveryOutcome::Recovered { .. } => metrics().wallets_recovered.inc(),
                RecoveryOutcome::Failed { .. } => metrics().wallets_recovery_failed.inc(),
                RecoveryOutcome::NothingToRecover => {}
            }
            WalletRecovery {
                wallet: wallet.pubkey(),
                outcome,
            }
        });
        join_all(tasks).await
    }

    async fn recover_wallet(&self, wallet: &Wallet, main: &Wallet, sell: Option<&SellTarget>) -> RecoveryOutcome {
        let gauge = &metrics().active_recoveries;
        gauge.inc();
        let _guard = scopeguard::guard((), |_| gauge.dec());

        match self.try_recover_wallet(wallet, main, sell).await {
            Ok(Some(signature)) => RecoveryOutcome::Recovered { signature },
            Ok(None) => RecoveryOutcome::NothingToRecover,
            Err(e) => {
                warn!(wallet = %wallet.pubkey(), error = %e, "Wallet recovery failed");
                RecoveryOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    async fn try_recover_wallet(
        &self,
        wallet: &Wallet,
        main: &Wallet,
        sell: Option<&SellTarget>,
    ) -> TxResult<Option<Signature>> {
        let owner = wallet.pubkey();

        if let Some(target) = sell {
            let holdings = self.rpc.get_token_accounts(&owner).await?;
            for holding in holdings.iter().filter(|h| h.mint == target.mint) {
                if holding.amount == 0 {
                    debug!(wallet = %owner, "No tokens to sell");
                    continue;
                }
                self.sell_holding(wallet.keypair(), holding, target).await;
            }
        }

        let last_signature: Mutex<Option<Signature>> = Mutex::new(None);
        let last_signature = &last_signature;
        retry_required("sweep_wallet", &self.sweep, |attempt| async move {
            let holdings = self.rpc.get_token_accounts(&owner).await?;
            let balance = self.rpc.get_balance(&owner).await?;
            if holdings.is_empty() && balance == 0 {
                if attempt > 1 {
                    info!(wallet = %owner, "Sweep from a previous attempt landed");
                }
                return Ok(*last_signature.lock());
            }

            let instructions = sweep_instructions(&main.pubkey(), &owner, &holdings, balance)?;
            let plan = plan_instructions(ComputeBudget::RECOVERY, instructions)?;
            let blockhash = self.rpc.get_latest_blockhash().await?;
            let batch = build_signed_batch(
                main.keypair(),
                &[main.keypair(), wallet.keypair()],
                &plan.instructions,
                &[],
                blockhash,
            )?;
            *last_signature.lock() = Some(batch.signature());
            send_and_confirm(self.rpc.as_ref(), &batch, &self.polling)
                .await
                .map(Some)
        })
        .await
    }

    /// Best effort: an unsold balance is still transferred home by the sweep
    async fn sell_holding(&self, wallet: &Keypair, holding: &TokenHolding, target: &SellTarget) {
        let rpc = self.rpc.as_ref();
        let polling = &self.polling;

        let sold = retry_with_policy("sell_tokens", &self.sell, |_| async move {
            let set = target
                .builder
                .build_sell(&wallet.pubkey(), &holding.mint, &target.creator, holding.amount)?;
            let plan = plan_instructions(ComputeBudget::RECOVERY, set.instructions)?;
            let blockhash = rpc.get_latest_blockhash().await?;
            let batch = build_signed_batch(wallet, &[wallet], &plan.instructions, &[], blockhash)?;

            let simulation = rpc.simulate_transaction(&batch.tx).await?;
            if let Some(err) = simulation.err {
                return Err(TransactionBuilderError::simulation_failed(err));
            }
            send_and_confirm(rpc, &batch, polling).await
        })
        .await;

        match sold {
            Ok(Some(signature)) => {
                info!(wallet = %wallet.pubkey(), amount = holding.amount, signature = %signature, "Tokens sold")
            }
            _ => warn!(wallet = %wallet.pubkey(), mint = %holding.mint, "Sell skipped, transferring tokens instead"),
        }
    }
}

/// Token transfers and closes for every holding, then a full SOL sweep
///
/// Closed account rent goes to `main`, which also pays the fee, so the
/// wallet can send its entire balance.
pub fn sweep_instructions(
    main: &Pubkey,
    owner: &Pubkey,
    holdings: &[TokenHolding],
    balance: u64,
) -> TxResult<Vec<Instruction>> {
    let token_error = |e: solana_sdk::program_error::ProgramError| {
        TransactionBuilderError::instruction_failed("spl-token", e.to_string())
    };

    let mut instructions = Vec::with_capacity(holdings.len() * 3 + 1);
    for holding in holdings {
        if holding.amount > 0 && holding.mint != spl_token::native_mint::ID {
            let destination = get_associated_token_address(main, &holding.mint);
            instructions.push(create_associated_token_account_idempotent(
                main,
                main,
                &holding.mint,
                &spl_token::ID,
            ));
            instructions.push(
                spl_token::instruction::transfer_checked(
                    &spl_token::ID,
                    &holding.address,
                    &holding.mint,
                    &destination,
                    owner,
                    &[],
                    holding.amount,
                    holding.decimals,
                )
                .map_err(token_error)?,
            );
        }
        instructions.push(
            spl_token::instruction::close_account(&spl_token::ID, &holding.address, main, owner, &[])
                .map_err(token_error)?,
        );
    }
    if balance > 0 {
        instructions.push(system_instruction::transfer(owner, main, balance));
    }
    Ok(instructions)
}
