//! Durable run state
//!
//! Everything a restarted run needs lives in the data directory:
//!
//! - `data.json`: ephemeral pool, base58 secret keys
//! - `mint.json`: mint keypair, base58
//! - `lut.json`: lookup table address
//! - `checkpoint.json`: last completed [`Stage`] and resume cursors
//!
//! Every write goes through [`write_atomic`], so a crash mid-write leaves the
//! previous version in place.

use crate::launchpad::Launchpad;
use crate::wallet::WalletPool;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Replace `path` with `bytes` via a temp file in the same directory
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Pipeline stages in execution order; a checkpoint records the last one
/// completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Init,
    Funded,
    TableCreated,
    TableExtended,
    Submitted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Funded => "funded",
            Stage::TableCreated => "table_created",
            Stage::TableExtended => "table_extended",
            Stage::Submitted => "submitted",
        }
    }

    /// Position used for the pipeline stage gauge
    pub fn ordinal(&self) -> i64 {
        *self as i64
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub launchpad: Launchpad,
    pub stage: Stage,
    #[serde(default)]
    pub mint: Option<String>,
    #[serde(default)]
    pub lookup_table: Option<String>,
    /// Lookup table extension steps known to have landed
    #[serde(default)]
    pub extend_steps_done: usize,
    /// First buy batch index (group order) not yet confirmed in sequential
    /// mode
    #[serde(default)]
    pub resume_from: Option<usize>,
    #[serde(default)]
    pub bundle_id: Option<String>,
    /// Digest of the pool the checkpoint was written against
    #[serde(default)]
    pub pool_digest: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(launchpad: Launchpad) -> Self {
        Self {
            launchpad,
            stage: Stage::Init,
            mint: None,
            lookup_table: None,
            extend_steps_done: 0,
            resume_from: None,
            bundle_id: None,
            pool_digest: None,
            updated_at: Utc::now(),
        }
    }

    /// Record `stage` as completed; stages never move backwards
    pub fn advance(&mut self, stage: Stage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }

    pub fn is_done(&self, stage: Stage) -> bool {
        self.stage >= stage
    }

    pub fn lookup_table_address(&self) -> Result<Option<Pubkey>> {
        self.lookup_table
            .as_deref()
            .map(|s| Pubkey::from_str(s).with_context(|| format!("Checkpoint holds an invalid table address: {s}")))
            .transpose()
    }
}

/// File layout of one data directory
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pool_path(&self) -> PathBuf {
        self.dir.join("data.json")
    }

    pub fn mint_path(&self) -> PathBuf {
        self.dir.join("mint.json")
    }

    pub fn lut_path(&self) -> PathBuf {
        self.dir.join("lut.json")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join("checkpoint.json")
    }

    pub fn load(&self) -> Result<Option<Checkpoint>> {
        let path = self.checkpoint_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let checkpoint = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt checkpoint at {}", path.display()))?;
        Ok(Some(checkpoint))
    }

    pub fn save(&self, checkpoint: &mut Checkpoint) -> Result<()> {
        checkpoint.updated_at = Utc::now();
        let json = serde_json::to_vec_pretty(checkpoint)?;
        write_atomic(&self.checkpoint_path(), &json)?;
        debug!(stage = %checkpoint.stage, "Checkpoint saved");
        Ok(())
    }

    pub fn save_pool(&self, pool: &WalletPool) -> Result<()> {
        pool.save(&self.pool_path())
    }

    pub fn load_pool(&self) -> Result<Option<WalletPool>> {
        let path = self.pool_path();
        if !path.exists() {
            return Ok(None);
        }
        WalletPool::load(&path).map(Some)
    }

    pub fn save_mint(&self, mint: &Keypair) -> Result<()> {
        let secret = Zeroizing::new(bs58::encode(mint.to_bytes()).into_string());
        let json = Zeroizing::new(serde_json::to_vec(secret.as_str())?);
        write_atomic(&self.mint_path(), &json)?;
        info!(mint = %mint.pubkey(), "Mint keypair persisted");
        Ok(())
    }

    pub fn load_mint(&self) -> Result<Option<Keypair>> {
        let path = self.mint_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = Zeroizing::new(std::fs::read_to_string(&path)?);
        let secret: Zeroizing<String> = Zeroizing::new(
            serde_json::from_str(&content).context("mint.json must hold a base58 string")?,
        );
        let bytes = Zeroizing::new(
            bs58::decode(secret.as_str())
                .into_vec()
                .context("mint.json is not base58")?,
        );
        let keypair = Keypair::try_from(bytes.as_slice()).context("mint.json holds an invalid keypair")?;
        Ok(Some(keypair))
    }

    pub fn save_lookup_table(&self, table: &Pubkey) -> Result<()> {
        write_atomic(&self.lut_path(), &serde_json::to_vec(&table.to_string())?)
    }

    pub fn load_lookup_table(&self) -> Result<Option<Pubkey>> {
        let path = self.lut_path();
        if !path.exists() {
            return Ok(None);
        }
        let address: String = serde_json::from_str(&std::fs::read_to_string(&path)?)
            .context("lut.json must hold an address string")?;
        Ok(Some(Pubkey::from_str(&address).context("lut.json holds an invalid address")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_advance() {
        let mut cp = Checkpoint::new(Launchpad::Bonk);
        cp.advance(Stage::TableCreated);
        cp.advance(Stage::Funded);
        assert_eq!(cp.stage, Stage::TableCreated);
        assert!(cp.is_done(Stage::Funded));
        assert!(!cp.is_done(Stage::TableExtended));
        assert_eq!(Stage::Submitted.ordinal(), 4);
    }

    #[test]
    fn test_checkpoint_round_trip_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("run"));
        assert!(store.load().unwrap().is_none());

        let table = Pubkey::new_unique();
        let mut cp = Checkpoint::new(Launchpad::PumpFun);
        cp.advance(Stage::TableExtended);
        cp.lookup_table = Some(table.to_string());
        cp.extend_steps_done = 4;
        cp.resume_from = Some(2);
        store.save(&mut cp).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, cp);
        assert_eq!(loaded.lookup_table_address().unwrap(), Some(table));

        let raw = std::fs::read_to_string(store.checkpoint_path()).unwrap();
        assert!(raw.contains("\"table_extended\""));
    }

    #[test]
    fn test_mint_and_lut_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load_mint().unwrap().is_none());

        let mint = Keypair::new();
        store.save_mint(&mint).unwrap();
        assert_eq!(store.load_mint().unwrap().unwrap().pubkey(), mint.pubkey());

        let table = Pubkey::new_unique();
        store.save_lookup_table(&table).unwrap();
        assert_eq!(store.load_lookup_table().unwrap(), Some(table));
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
