//! Wallet management module
//!
//! The main wallet funds everything and owns the lookup table; the
//! ephemeral pool is generated once per run, persisted to `data.json` as an
//! array of base58 secret keys before any funds move, and swept at the end.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletRole {
    Main,
    Ephemeral,
}

/// A keypair together with the role it plays in a run
#[derive(Clone)]
pub struct Wallet {
    keypair: Arc<Keypair>,
    role: WalletRole,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("pubkey", &self.keypair.pubkey())
            .field("role", &self.role)
            .finish()
    }
}

impl Wallet {
    pub fn new(keypair: Keypair, role: WalletRole) -> Self {
        Self {
            keypair: Arc::new(keypair),
            role,
        }
    }

    /// Load the main wallet from a keypair file
    ///
    /// Accepts the 64-byte raw format, the Solana CLI JSON byte array, or a
    /// base58 string.
    pub fn from_file(path: &str) -> Result<Self> {
        let keypair_bytes = Zeroizing::new(
            std::fs::read(path).with_context(|| format!("Failed to read keypair file: {}", path))?,
        );

        let keypair = if keypair_bytes.len() == 64 {
            reject_all_zero(&keypair_bytes)?;
            Keypair::try_from(keypair_bytes.as_slice()).context("Invalid keypair bytes")?
        } else if keypair_bytes.first() == Some(&b'[') {
            let json: Zeroizing<Vec<u8>> = Zeroizing::new(
                serde_json::from_slice(&keypair_bytes).context("Failed to parse keypair JSON")?,
            );
            if json.len() != 64 {
                anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", json.len());
            }
            reject_all_zero(&json)?;
            Keypair::try_from(json.as_slice()).context("Invalid keypair from JSON")?
        } else {
            let text = std::str::from_utf8(&keypair_bytes).context("Keypair file is not UTF-8")?;
            return Self::from_base58(text.trim(), WalletRole::Main);
        };

        Ok(Self::new(keypair, WalletRole::Main))
    }

    pub fn from_base58(secret: &str, role: WalletRole) -> Result<Self> {
        let bytes = Zeroizing::new(
            bs58::decode(secret)
                .into_vec()
                .context("Secret key is not valid base58")?,
        );
        if bytes.len() != 64 {
            anyhow::bail!("Invalid secret key length: expected 64 bytes, got {}", bytes.len());
        }
        reject_all_zero(&bytes)?;
        let keypair = Keypair::try_from(bytes.as_slice()).context("Invalid secret key bytes")?;
        Ok(Self::new(keypair, role))
    }

    /// Resolve the main wallet from the env var first, then the keypair file
    pub fn main_from_config(config: &crate::config::WalletConfig) -> Result<Self> {
        if let Ok(secret) = std::env::var(&config.private_key_env) {
            let secret = Zeroizing::new(secret);
            if !secret.trim().is_empty() {
                return Self::from_base58(secret.trim(), WalletRole::Main)
                    .with_context(|| format!("{} holds an invalid key", config.private_key_env));
            }
        }
        match &config.keypair_path {
            Some(path) => Self::from_file(path),
            None => anyhow::bail!(
                "no main wallet: set {} or wallet.keypair_path",
                config.private_key_env
            ),
        }
    }

    pub fn to_base58(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(self.keypair.to_bytes());
        Zeroizing::new(bs58::encode(bytes.as_slice()).into_string())
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn role(&self) -> WalletRole {
        self.role
    }
}

fn reject_all_zero(bytes: &[u8]) -> Result<()> {
    if bytes.iter().all(|&b| b == 0) {
        anyhow::bail!("Invalid keypair: all-zero key rejected");
    }
    Ok(())
}

/// Ordered set of ephemeral wallets for one run
#[derive(Debug, Clone, Default)]
pub struct WalletPool {
    wallets: Vec<Wallet>,
}

impl WalletPool {
    pub fn generate(count: usize) -> Self {
        let wallets = (0..count)
            .map(|_| Wallet::new(Keypair::new(), WalletRole::Ephemeral))
            .collect();
        crate::metrics::metrics().pool_size.set(count as i64);
        info!(count, "Generated ephemeral wallet pool");
        Self { wallets }
    }

    /// Write the pool as a JSON array of base58 secret keys
    pub fn save(&self, path: &Path) -> Result<()> {
        let secrets: Vec<Zeroizing<String>> = self.wallets.iter().map(Wallet::to_base58).collect();
        let plain: Vec<&str> = secrets.iter().map(|s| s.as_str()).collect();
        let json = Zeroizing::new(serde_json::to_string_pretty(&plain)?);
        crate::checkpoint::write_atomic(path, json.as_bytes())
            .with_context(|| format!("Failed to persist wallet pool to {}", path.display()))?;
        debug!(path = %path.display(), count = self.wallets.len(), "Wallet pool persisted");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read wallet pool: {}", path.display()))?,
        );
        let secrets: Vec<String> =
            serde_json::from_str(&content).context("Wallet pool is not a JSON array of strings")?;
        let wallets = secrets
            .into_iter()
            .enumerate()
            .map(|(i, secret)| {
                let secret = Zeroizing::new(secret);
                Wallet::from_base58(&secret, WalletRole::Ephemeral)
                    .with_context(|| format!("Wallet {} in pool is invalid", i))
            })
            .collect::<Result<Vec<_>>>()?;
        if wallets.is_empty() {
            warn!(path = %path.display(), "Loaded an empty wallet pool");
        }
        crate::metrics::metrics().pool_size.set(wallets.len() as i64);
        Ok(Self { wallets })
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Wallet> {
        self.wallets.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Wallet> {
        self.wallets.iter()
    }

    pub fn pubkeys(&self) -> Vec<Pubkey> {
        self.wallets.iter().map(Wallet::pubkey).collect()
    }

    /// Hex SHA-256 over the ordered public keys, stored in the checkpoint to
    /// detect a pool file swapped between runs
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for wallet in &self.wallets {
            hasher.update(wallet.pubkey().as_ref());
        }
        hex::encode(hasher.finalize())
    }
}

/// Generate the mint keypair, grinding for `suffix` when one is given
///
/// Falls back to a plain random keypair after `max_attempts` misses.
pub fn generate_mint(suffix: Option<&str>, max_attempts: u64) -> Keypair {
    let Some(suffix) = suffix else {
        return Keypair::new();
    };
    for attempt in 0..max_attempts {
        let candidate = Keypair::new();
        if candidate.pubkey().to_string().ends_with(suffix) {
            info!(mint = %candidate.pubkey(), attempts = attempt + 1, "Vanity mint found");
            return candidate;
        }
    }
    warn!(suffix, max_attempts, "Vanity search exhausted, using a random mint");
    Keypair::new()
}
