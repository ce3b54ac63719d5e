//! Launch pipeline
//!
//! An explicit stage machine over a persisted [`Checkpoint`]:
//!
//! ```text
//! Init -> Funded -> TableCreated -> TableExtended -> Submitted
//! ```
//!
//! Each stage is recorded only after it completes, so a restarted run picks
//! up at the first stage not yet done. A failed stage halts the run with the
//! last completed stage still on disk.

use crate::checkpoint::{Checkpoint, CheckpointStore, Stage};
use crate::config::{lamports_to_sol, Config};
use crate::funds::{FundManager, FundingPlan, SellTarget, WalletRecovery};
use crate::launchpad::{builder_for, LaunchpadBuilder};
use crate::metrics::metrics;
use crate::observability::TraceContext;
use crate::retry::RetryPolicy;
use crate::rpc_manager::{BlockhashInfo, ChainRpc, SolanaRpc};
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::{
    build_batches, build_creation_batch, pick_tip_account, BatchPlan, Bundle, BundleReport, Bundler,
    LookupTableManager, LookupTableTiming, RelayClient, SequentialReport, SignedBatch, SubmissionCoordinator,
    SubmissionMode, SubmissionSettings, TransactionBuilderError, TxResult, WalletInstructions,
};
use crate::wallet::{generate_mint, Wallet, WalletPool};
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn, Instrument};

/// Keypairs tried before a vanity search gives up
pub const VANITY_MAX_ATTEMPTS: u64 = 50_000_000;

/// Everything one run needs; built once and passed down explicitly
pub struct RunContext {
    pub config: Config,
    pub rpc: Arc<dyn ChainRpc>,
    pub bundler: Arc<dyn Bundler>,
    pub builder: Arc<dyn LaunchpadBuilder>,
    pub main: Wallet,
    pub store: CheckpointStore,
    pub trace: TraceContext,
}

impl RunContext {
    pub fn new(config: Config, rpc: Arc<dyn ChainRpc>, bundler: Arc<dyn Bundler>, main: Wallet) -> Self {
        let builder = builder_for(config.launch.launchpad, config.launch.slippage_bps);
        let store = CheckpointStore::new(&config.storage.data_dir);
        Self {
            config,
            rpc,
            bundler,
            builder,
            main,
            store,
            trace: TraceContext::new("launch"),
        }
    }

    /// Production wiring: node RPC, relay client and the configured main
    /// wallet
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let rpc = Arc::new(SolanaRpc::new(
            &config.rpc.endpoint,
            Duration::from_secs(config.rpc.timeout_secs),
            config.commitment(),
        ));
        let bundler = Arc::new(RelayClient::new(
            &config.relay.url,
            Duration::from_secs(config.relay.timeout_secs),
        )?);
        let main = Wallet::main_from_config(&config.wallet)?;
        Ok(Self::new(config, rpc, bundler, main))
    }
}

#[derive(Debug)]
pub enum SubmissionResult {
    Bundle(BundleReport),
    Sequential(SequentialReport),
}

#[derive(Debug)]
pub struct LaunchReport {
    pub mint: Pubkey,
    pub lookup_table: Pubkey,
    pub stage: Stage,
    /// `None` when the checkpoint already recorded a submission
    pub submission: Option<SubmissionResult>,
}

impl LaunchReport {
    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Submitted
    }
}

pub struct LaunchPipeline {
    ctx: RunContext,
    logger: StructuredLogger,
}

impl LaunchPipeline {
    pub fn new(ctx: RunContext) -> Self {
        let logger = StructuredLogger::for_trace(&ctx.trace);
        Self { ctx, logger }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    fn funds(&self) -> FundManager {
        FundManager::new(Arc::clone(&self.ctx.rpc), &self.ctx.config, self.logger.clone())
    }

    fn lookup_tables(&self) -> LookupTableManager {
        LookupTableManager::new(
            Arc::clone(&self.ctx.rpc),
            RetryPolicy::lookup_table(&self.ctx.config.retry),
            LookupTableTiming::from_config(&self.ctx.config),
        )
    }

    fn save(&self, checkpoint: &mut Checkpoint) -> TxResult<()> {
        self.ctx
            .store
            .save(checkpoint)
            .map_err(TransactionBuilderError::persistence)
    }

    fn complete(&self, checkpoint: &mut Checkpoint, stage: Stage, started: Instant) -> TxResult<()> {
        checkpoint.advance(stage);
        self.save(checkpoint)?;
        metrics().pipeline_stage.set(stage.ordinal());
        self.logger
            .log_stage_completed(stage.as_str(), started.elapsed().as_millis() as u64);
        Ok(())
    }

    /// Child of the run's trace for one stage
    pub(crate) fn stage_trace(&self, stage: &str) -> TraceContext {
        self.ctx.trace.child_span(stage)
    }

    fn stage_span(&self, stage: &str) -> tracing::Span {
        self.stage_trace(stage).span()
    }

    /// Existing checkpoint, or a fresh one when the data directory is clean
    fn load_checkpoint(&self) -> TxResult<Checkpoint> {
        let store = &self.ctx.store;
        match store.load().map_err(TransactionBuilderError::persistence)? {
            Some(checkpoint) => {
                if checkpoint.launchpad != self.ctx.builder.launchpad() {
                    return Err(TransactionBuilderError::Configuration(format!(
                        "checkpoint in {} belongs to a {} run, config targets {}",
                        store.dir().display(),
                        checkpoint.launchpad,
                        self.ctx.builder.launchpad()
                    )));
                }
                info!(stage = %checkpoint.stage, "Resuming from checkpoint");
                Ok(checkpoint)
            }
            None => {
                if store.pool_path().exists() {
                    return Err(TransactionBuilderError::persistence(format!(
                        "{} exists without a checkpoint; gather it before starting a new run",
                        store.pool_path().display()
                    )));
                }
                let mut checkpoint = Checkpoint::new(self.ctx.builder.launchpad());
                self.save(&mut checkpoint)?;
                Ok(checkpoint)
            }
        }
    }

    /// Run every stage not yet recorded in the checkpoint
    pub async fn run(&self) -> TxResult<LaunchReport> {
        let mut checkpoint = self.load_checkpoint()?;
        metrics().pipeline_stage.set(checkpoint.stage.ordinal());

        if checkpoint.is_done(Stage::Submitted) {
            return self.already_submitted(&checkpoint);
        }

        let (pool, mint) = self
            .ensure_funded(&mut checkpoint)
            .instrument(self.stage_span(Stage::Funded.as_str()))
            .await
            .inspect_err(|e| {
                self.logger.log_stage_failed(Stage::Funded.as_str(), &e.to_string());
            })?;

        let table = self
            .ensure_table(&mut checkpoint)
            .instrument(self.stage_span(Stage::TableCreated.as_str()))
            .await
            .inspect_err(|e| {
                self.logger.log_stage_failed(Stage::TableCreated.as_str(), &e.to_string());
            })?;

        let lookup_table = self
            .ensure_extended(&mut checkpoint, &table, &pool, &mint.pubkey())
            .instrument(self.stage_span(Stage::TableExtended.as_str()))
            .await
            .inspect_err(|e| {
                self.logger.log_stage_failed(Stage::TableExtended.as_str(), &e.to_string());
            })?;

        let submission = self
            .submit(&mut checkpoint, &pool, &mint, &lookup_table)
            .instrument(self.stage_span(Stage::Submitted.as_str()))
            .await
            .inspect_err(|e| {
                self.logger.log_stage_failed(Stage::Submitted.as_str(), &e.to_string());
            })?;

        Ok(LaunchReport {
            mint: mint.pubkey(),
            lookup_table: table,
            stage: checkpoint.stage,
            submission: Some(submission),
        })
    }

    /// A submitted launch is never rebuilt; report what the checkpoint holds
    fn already_submitted(&self, checkpoint: &Checkpoint) -> TxResult<LaunchReport> {
        info!(bundle_id = ?checkpoint.bundle_id, "Launch already submitted");
        let mint = checkpoint
            .mint
            .as_deref()
            .and_then(|m| Pubkey::from_str(m).ok())
            .ok_or_else(|| TransactionBuilderError::persistence("submitted checkpoint has no valid mint"))?;
        let lookup_table = checkpoint
            .lookup_table_address()
            .map_err(TransactionBuilderError::persistence)?
            .ok_or_else(|| TransactionBuilderError::persistence("submitted checkpoint has no lookup table"))?;
        Ok(LaunchReport {
            mint,
            lookup_table,
            stage: checkpoint.stage,
            submission: None,
        })
    }

    async fn ensure_funded(&self, checkpoint: &mut Checkpoint) -> TxResult<(WalletPool, Keypair)> {
        let store = &self.ctx.store;
        let started = Instant::now();

        if checkpoint.is_done(Stage::Funded) {
            let pool = store
                .load_pool()
                .map_err(TransactionBuilderError::persistence)?
                .ok_or_else(|| TransactionBuilderError::persistence("checkpoint is funded but data.json is missing"))?;
            if checkpoint.pool_digest.as_deref() != Some(pool.digest().as_str()) {
                return Err(TransactionBuilderError::persistence(
                    "data.json does not match the pool recorded in the checkpoint",
                ));
            }
            let mint = store
                .load_mint()
                .map_err(TransactionBuilderError::persistence)?
                .ok_or_else(|| TransactionBuilderError::persistence("checkpoint is funded but mint.json is missing"))?;
            return Ok((pool, mint));
        }

        self.logger.log_stage_started(Stage::Funded.as_str());
        let launch = &self.ctx.config.launch;
        let plan = FundingPlan::new(
            launch.pool_size,
            self.ctx.config.swap_lamports(),
            self.ctx.builder.balance_overhead_lamports(),
        );
        info!(
            wallets = plan.pool_size,
            required_sol = lamports_to_sol(plan.required_lamports()),
            "Funding pool"
        );

        let funds = self.funds();
        let persisted = store.load_pool().map_err(TransactionBuilderError::persistence)?;
        // a fresh run must be affordable before anything is generated
        if persisted.is_none() {
            funds.check_balance(&self.ctx.main.pubkey(), &plan).await?;
        }

        let mint = match store.load_mint().map_err(TransactionBuilderError::persistence)? {
            Some(mint) => mint,
            None => {
                let mint = self.generate_mint().await?;
                store.save_mint(&mint).map_err(TransactionBuilderError::persistence)?;
                mint
            }
        };
        checkpoint.mint = Some(mint.pubkey().to_string());

        let pool = match persisted {
            Some(pool) => {
                info!(wallets = pool.len(), "Resuming funding of persisted pool");
                funds
                    .fund_pool(&self.ctx.main, &pool, plan.per_wallet_lamports)
                    .await?;
                pool
            }
            None => funds.distribute(&self.ctx.main, &plan, store).await?.pool,
        };

        checkpoint.pool_digest = Some(pool.digest());
        self.complete(checkpoint, Stage::Funded, started)?;
        Ok((pool, mint))
    }

    async fn generate_mint(&self) -> TxResult<Keypair> {
        let suffix = self
            .ctx
            .config
            .launch
            .vanity
            .then(|| self.ctx.builder.vanity_suffix());
        tokio::task::spawn_blocking(move || generate_mint(suffix, VANITY_MAX_ATTEMPTS))
            .await
            .map_err(|e| TransactionBuilderError::internal(format!("mint generation task failed: {e}")))
    }

    async fn ensure_table(&self, checkpoint: &mut Checkpoint) -> TxResult<Pubkey> {
        if checkpoint.is_done(Stage::TableCreated) {
            return checkpoint
                .lookup_table_address()
                .map_err(TransactionBuilderError::persistence)?
                .ok_or_else(|| TransactionBuilderError::persistence("checkpoint has no lookup table address"));
        }

        self.logger.log_stage_started(Stage::TableCreated.as_str());
        let started = Instant::now();
        let store = &self.ctx.store;

        // A table persisted by an interrupted run is reused if it exists
        let persisted = store
            .load_lookup_table()
            .map_err(TransactionBuilderError::persistence)?;
        let table = match persisted {
            Some(table) if self.ctx.rpc.get_account_data(&table).await?.is_some() => {
                info!(table = %table, "Reusing persisted lookup table");
                table
            }
            _ => {
                let table = self.lookup_tables().create(self.ctx.main.keypair()).await?;
                store
                    .save_lookup_table(&table)
                    .map_err(TransactionBuilderError::persistence)?;
                table
            }
        };

        checkpoint.lookup_table = Some(table.to_string());
        checkpoint.extend_steps_done = 0;
        self.logger.log_lookup_step("create", 0, true);
        self.complete(checkpoint, Stage::TableCreated, started)?;
        Ok(table)
    }

    async fn ensure_extended(
        &self,
        checkpoint: &mut Checkpoint,
        table: &Pubkey,
        pool: &WalletPool,
        mint: &Pubkey,
    ) -> TxResult<AddressLookupTableAccount> {
        let main = self.ctx.main.keypair();
        let steps = self
            .ctx
            .builder
            .lookup_table_steps(&main.pubkey(), mint, &pool.pubkeys());
        let manager = self.lookup_tables();

        if !checkpoint.is_done(Stage::TableExtended) {
            self.logger.log_stage_started(Stage::TableExtended.as_str());
            let started = Instant::now();
            let start_at = checkpoint.extend_steps_done.min(steps.len());
            if start_at > 0 {
                info!(start_at, total = steps.len(), "Resuming lookup table extension");
            }

            {
                let store = &self.ctx.store;
                let logger = &self.logger;
                let checkpoint = &mut *checkpoint;
                manager
                    .extend_all(table, main, &steps, start_at, |done| {
                        let step = &steps[done - 1];
                        logger.log_lookup_step(&step.label, step.addresses.len(), true);
                        checkpoint.extend_steps_done = done;
                        store
                            .save(checkpoint)
                            .map_err(TransactionBuilderError::persistence)
                    })
                    .await?;
            }
            self.complete(checkpoint, Stage::TableExtended, started)?;
        }

        let expected: Vec<Pubkey> = steps.iter().flat_map(|s| s.addresses.iter().copied()).collect();
        manager.wait_until_ready(table, &expected).await
    }

    async fn submit(
        &self,
        checkpoint: &mut Checkpoint,
        pool: &WalletPool,
        mint: &Keypair,
        lookup_table: &AddressLookupTableAccount,
    ) -> TxResult<SubmissionResult> {
        self.logger.log_stage_started(Stage::Submitted.as_str());
        let started = Instant::now();
        let mode = self.ctx.config.launch.mode;

        let blockhash = self.ctx.rpc.get_latest_blockhash().await?;
        let main = self.ctx.main.keypair();
        let tip = match mode {
            SubmissionMode::Bundle => self.ctx.config.relay_fee_lamports(),
            SubmissionMode::Sequential => 0,
        };
        let create = self
            .ctx
            .builder
            .build_create(&main.pubkey(), &mint.pubkey(), &self.ctx.config.launch.token)?;
        let creation =
            build_creation_batch(main, mint, create.instructions, tip, &pick_tip_account(), blockhash)?;
        let buys = self.build_buy_batches(pool, &mint.pubkey(), lookup_table, blockhash, mode)?;
        for (index, batch) in std::iter::once(&creation).chain(buys.iter()).enumerate() {
            self.logger.log_batch_built(
                index,
                batch.wallet_indices.len(),
                batch.instruction_count,
                batch.serialized_size,
            );
        }

        let coordinator = SubmissionCoordinator::new(
            Arc::clone(&self.ctx.rpc),
            Arc::clone(&self.ctx.bundler),
            SubmissionSettings::from_config(&self.ctx.config),
            self.logger.clone(),
        );

        match mode {
            SubmissionMode::Bundle => {
                let bundle = Bundle::new(creation, buys)?;
                let report = coordinator.submit_bundle(&bundle, &self.ctx.trace).await?;
                checkpoint.bundle_id = Some(report.bundle_id.to_string());
                self.complete(checkpoint, Stage::Submitted, started)?;
                Ok(SubmissionResult::Bundle(report))
            }
            SubmissionMode::Sequential => {
                let mut batches: Vec<SignedBatch> = Vec::with_capacity(buys.len() + 1);
                batches.push(creation);
                batches.extend(buys);

                let offset = checkpoint.resume_from.unwrap_or(0).min(batches.len());
                if offset > 0 {
                    info!(resume_from = offset, total = batches.len(), "Skipping confirmed batches");
                }
                let mut report = coordinator.submit_sequential(&batches[offset..]).await;
                report.resume_from = report.resume_from.map(|i| i + offset);

                match report.resume_from {
                    Some(resume_from) => {
                        warn!(resume_from, "Sequential submission stopped");
                        checkpoint.resume_from = Some(resume_from);
                        self.save(checkpoint)?;
                    }
                    None => {
                        checkpoint.resume_from = None;
                        self.complete(checkpoint, Stage::Submitted, started)?;
                    }
                }
                Ok(SubmissionResult::Sequential(report))
            }
        }
    }

    fn build_buy_batches(
        &self,
        pool: &WalletPool,
        mint: &Pubkey,
        lookup_table: &AddressLookupTableAccount,
        blockhash: BlockhashInfo,
        mode: SubmissionMode,
    ) -> TxResult<Vec<SignedBatch>> {
        let builder = &self.ctx.builder;
        let creator = self.ctx.main.pubkey();
        let lamports = self.ctx.config.swap_lamports();

        let slots = pool
            .iter()
            .enumerate()
            .map(|(index, wallet)| {
                let set = builder.build_buy(&wallet.pubkey(), mint, &creator, lamports, index)?;
                if set.len() != builder.buy_instructions_per_wallet() {
                    return Err(TransactionBuilderError::internal(format!(
                        "{} buy produced {} instructions, expected {}",
                        builder.launchpad(),
                        set.len(),
                        builder.buy_instructions_per_wallet()
                    )));
                }
                Ok(Some(WalletInstructions {
                    wallet: wallet.keypair(),
                    instructions: set.instructions,
                }))
            })
            .collect::<TxResult<Vec<_>>>()?;

        let compute_budget = match mode {
            SubmissionMode::Bundle => builder.buy_compute_budget(),
            SubmissionMode::Sequential => builder
                .buy_compute_budget()
                .with_price_multiplier(self.ctx.config.launch.sequential_priority_multiplier),
        };
        let plan = BatchPlan {
            group_size: builder.group_size(),
            compute_budget,
        };
        build_batches(&slots, lookup_table, blockhash, &plan)
    }

    /// Sweep the persisted pool back to the main wallet
    ///
    /// Holdings of the run's mint are sold first when the mint is known.
    pub async fn gather(&self) -> TxResult<Vec<WalletRecovery>> {
        let store = &self.ctx.store;
        let pool = store
            .load_pool()
            .map_err(TransactionBuilderError::persistence)?
            .ok_or_else(|| TransactionBuilderError::persistence(format!("no pool at {}", store.pool_path().display())))?;

        let launchpad = store
            .load()
            .map_err(TransactionBuilderError::persistence)?
            .map(|c| c.launchpad)
            .unwrap_or(self.ctx.builder.launchpad());
        let sell = store
            .load_mint()
            .map_err(TransactionBuilderError::persistence)?
            .map(|mint| SellTarget {
                builder: builder_for(launchpad, self.ctx.config.launch.slippage_bps),
                mint: mint.pubkey(),
                creator: self.ctx.main.pubkey(),
            });

        self.logger.log_stage_started("gather");
        let started = Instant::now();
        let results = self
            .funds()
            .recover(&pool, &self.ctx.main, sell.as_ref())
            .instrument(self.stage_span("gather"))
            .await;
        self.logger
            .log_stage_completed("gather", started.elapsed().as_millis() as u64);
        Ok(results)
    }

    pub fn status(&self) -> TxResult<Option<Checkpoint>> {
        self.ctx.store.load().map_err(TransactionBuilderError::persistence)
    }
}
