//! Transaction builder
//!
//! The core of a launch: per-wallet instructions become size-bounded signed
//! v0 transactions bound to an address lookup table, and that set is
//! submitted either as one relay bundle or sequentially.
//!
//! ## Architecture
//!
//! - **errors**: error taxonomy with retryability and tiers
//! - **instructions**: compute budget profiles and ordering checks
//! - **output**: the immutable signed batch
//! - **builder**: wallet partitioning, creation transaction, signing
//! - **lookup_table**: create / extend / readiness
//! - **bundle**: relay bundle type, relay client and mock
//! - **submit**: bundle and sequential submission

pub mod errors;
pub use errors::{ErrorTier, TransactionBuilderError, TxResult};

pub mod builder;
pub mod bundle;
pub mod instructions;
pub mod lookup_table;
pub mod output;
pub mod submit;

pub use builder::{build_batches, build_creation_batch, build_signed_batch, BatchPlan, WalletInstructions};
pub use bundle::{
    pick_tip_account, Bundle, BundleId, BundleSimulation, BundleStatus, Bundler, MockBundler,
    RelayClient, MAX_BUNDLE_LEN, TIP_ACCOUNTS,
};
pub use instructions::{plan_instructions, sanity_check_ix_order, ComputeBudget, InstructionPlan};
pub use lookup_table::{
    chunk_steps, LookupTableManager, LookupTableStep, LookupTableTiming, MAX_ADDRESSES_PER_EXTEND,
};
pub use output::SignedBatch;
pub use submit::{
    await_confirmation, send_and_confirm, BatchOutcome, BundleReport, ConfirmPolling, Confirmation,
    SequentialReport, SubmissionCoordinator, SubmissionMode, SubmissionSettings,
};
