//! Test Utilities Module
//!
//! An in-memory chain behind [`ChainRpc`] so lookup table, funding, recovery
//! and pipeline flows can be driven end to end without a node.
//!
//! Landed transactions are applied to mock state: system transfers move
//! lamports (atomically per transaction), lookup table create/extend write
//! real table account data, and token transfer/close/sell instructions
//! update the owner's holdings. Each send consumes one scripted
//! [`SendBehavior`]; an empty script means every send lands.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::launchpad::{bonk, pumpfun};
use crate::rpc_manager::{
    BlockhashInfo, ChainRpc, RpcManagerError, RpcResult, SignatureStatus, SimulationOutcome, TokenHolding,
};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use solana_sdk::{
    address_lookup_table::{self, state::AddressLookupTable},
    hash::Hash,
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::Signature,
    system_program,
    transaction::VersionedTransaction,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Blocks a blockhash stays valid for
pub const MOCK_BLOCKHASH_VALIDITY: u64 = 150;

/// What happens to the next transaction sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendBehavior {
    /// Applied and confirmed
    Land,
    /// Confirmed with an execution error, no state change
    LandWithError(String),
    /// Applied, but the node never reports a status
    LandUnconfirmed,
    /// Accepted and lost
    Drop,
    /// Transport error before the node sees it
    Reject,
}

/// Serialized lookup table account: 56-byte meta then the addresses
pub fn encode_lookup_table(authority: &Pubkey, addresses: &[Pubkey]) -> Vec<u8> {
    let mut data = Vec::with_capacity(56 + addresses.len() * 32);
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&u64::MAX.to_le_bytes());
    data.extend_from_slice(&0u64.to_le_bytes());
    data.push(0);
    data.push(1);
    data.extend_from_slice(authority.as_ref());
    data.extend_from_slice(&[0u8; 2]);
    for address in addresses {
        data.extend_from_slice(address.as_ref());
    }
    data
}

enum Effect {
    Transfer { from: Pubkey, to: Pubkey, lamports: u64 },
    CreateTable { table: Pubkey, authority: Pubkey },
    ExtendTable { table: Pubkey, addresses: Vec<Pubkey> },
    DebitTokens { account: Pubkey, amount: u64 },
    CloseTokenAccount { account: Pubkey },
}

pub struct MockRpc {
    balances: DashMap<Pubkey, u64>,
    accounts: DashMap<Pubkey, Vec<u8>>,
    token_accounts: DashMap<Pubkey, Vec<TokenHolding>>,
    statuses: DashMap<Signature, SignatureStatus>,
    sent: Mutex<Vec<VersionedTransaction>>,
    script: Mutex<VecDeque<SendBehavior>>,
    simulation_failures: AtomicU32,
    slot: AtomicU64,
    block_height: AtomicU64,
}

impl Default for MockRpc {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRpc {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
            accounts: DashMap::new(),
            token_accounts: DashMap::new(),
            statuses: DashMap::new(),
            sent: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            simulation_failures: AtomicU32::new(0),
            slot: AtomicU64::new(1_000),
            block_height: AtomicU64::new(500),
        }
    }

    pub fn set_balance(&self, pubkey: &Pubkey, lamports: u64) {
        self.balances.insert(*pubkey, lamports);
    }

    pub fn balance(&self, pubkey: &Pubkey) -> u64 {
        self.balances.get(pubkey).map(|b| *b).unwrap_or(0)
    }

    pub fn add_token_account(&self, owner: &Pubkey, holding: TokenHolding) {
        self.token_accounts.entry(*owner).or_default().push(holding);
    }

    pub fn token_holdings(&self, owner: &Pubkey) -> Vec<TokenHolding> {
        self.token_accounts.get(owner).map(|h| h.clone()).unwrap_or_default()
    }

    pub fn insert_lookup_table(&self, table: &Pubkey, authority: &Pubkey, addresses: &[Pubkey]) {
        self.accounts.insert(*table, encode_lookup_table(authority, addresses));
    }

    pub fn lookup_table_addresses(&self, table: &Pubkey) -> Vec<Pubkey> {
        self.accounts
            .get(table)
            .and_then(|data| AddressLookupTable::deserialize(&data).ok().map(|t| t.addresses.to_vec()))
            .unwrap_or_default()
    }

    /// Queue behaviors for the next sends, in order
    pub fn script_sends(&self, behaviors: impl IntoIterator<Item = SendBehavior>) {
        self.script.lock().extend(behaviors);
    }

    /// Fail the next `count` simulations
    pub fn fail_simulations(&self, count: u32) {
        self.simulation_failures.store(count, Ordering::SeqCst);
    }

    /// Every transaction the node accepted, in send order
    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    fn resolve_keys(&self, message: &VersionedMessage) -> Result<Vec<Pubkey>, String> {
        let mut keys = message.static_account_keys().to_vec();
        if let VersionedMessage::V0(v0) = message {
            let mut writable = Vec::new();
            let mut readonly = Vec::new();
            for lookup in &v0.address_table_lookups {
                let addresses = self.lookup_table_addresses(&lookup.account_key);
                let pick = |i: &u8| {
                    addresses
                        .get(*i as usize)
                        .copied()
                        .ok_or_else(|| format!("lookup index {} out of range for {}", i, lookup.account_key))
                };
                for i in &lookup.writable_indexes {
                    writable.push(pick(i)?);
                }
                for i in &lookup.readonly_indexes {
                    readonly.push(pick(i)?);
                }
            }
            keys.extend(writable);
            keys.extend(readonly);
        }
        Ok(keys)
    }

    fn holding_address_exists(&self, account: &Pubkey) -> bool {
        self.token_accounts
            .iter()
            .any(|entry| entry.value().iter().any(|h| h.address == *account))
    }

    fn decode_effects(&self, tx: &VersionedTransaction) -> Result<Vec<Effect>, String> {
        let keys = self.resolve_keys(&tx.message)?;
        let mut effects = Vec::new();

        for ix in tx.message.instructions() {
            let program = keys[ix.program_id_index as usize];
            let accounts: Vec<Pubkey> = ix.accounts.iter().map(|i| keys[*i as usize]).collect();
            let data = ix.data.as_slice();

            if program == system_program::ID {
                if data.len() >= 12 && data[..4] == 2u32.to_le_bytes() {
                    let lamports = u64::from_le_bytes(data[4..12].try_into().map_err(|_| "bad transfer")?);
                    effects.push(Effect::Transfer {
                        from: accounts[0],
                        to: accounts[1],
                        lamports,
                    });
                }
            } else if program == address_lookup_table::program::ID {
                match data.get(..4) {
                    Some(tag) if tag == 0u32.to_le_bytes() => effects.push(Effect::CreateTable {
                        table: accounts[0],
                        authority: accounts[1],
                    }),
                    Some(tag) if tag == 2u32.to_le_bytes() => {
                        let addresses = data[12..]
                            .chunks_exact(32)
                            .map(|c| Pubkey::try_from(c).map_err(|_| "bad address".to_string()))
                            .collect::<Result<Vec<_>, _>>()?;
                        effects.push(Effect::ExtendTable {
                            table: accounts[0],
                            addresses,
                        });
                    }
                    _ => {}
                }
            } else if program == spl_token::ID {
                match data.first() {
                    Some(12) if data.len() >= 9 => effects.push(Effect::DebitTokens {
                        account: accounts[0],
                        amount: u64::from_le_bytes(data[1..9].try_into().map_err(|_| "bad amount")?),
                    }),
                    Some(9) => effects.push(Effect::CloseTokenAccount { account: accounts[0] }),
                    _ => {}
                }
            } else if (program == pumpfun::accounts::PUMPFUN && data.starts_with(&pumpfun::SELL_DISCRIMINATOR))
                || (program == bonk::accounts::LAUNCHLAB && data.starts_with(&bonk::SELL_EXACT_IN_DISCRIMINATOR))
            {
                let amount = u64::from_le_bytes(data[8..16].try_into().map_err(|_| "bad amount")?);
                if let Some(account) = accounts.iter().find(|a| self.holding_address_exists(a)) {
                    effects.push(Effect::DebitTokens {
                        account: *account,
                        amount,
                    });
                }
            }
        }
        Ok(effects)
    }

    /// All-or-nothing: a transfer the source cannot cover rejects the whole
    /// transaction
    fn apply(&self, tx: &VersionedTransaction) -> Result<(), String> {
        let effects = self.decode_effects(tx)?;

        let mut pending: HashMap<Pubkey, i128> = HashMap::new();
        for effect in &effects {
            if let Effect::Transfer { from, to, lamports } = effect {
                let from_balance = *pending.entry(*from).or_insert(self.balance(from) as i128);
                if from_balance < *lamports as i128 {
                    return Err(format!("insufficient lamports in {from}"));
                }
                pending.insert(*from, from_balance - *lamports as i128);
                let to_balance = *pending.entry(*to).or_insert(self.balance(to) as i128);
                pending.insert(*to, to_balance + *lamports as i128);
            }
            if let Effect::CreateTable { table, .. } = effect {
                if self.accounts.contains_key(table) {
                    return Err(format!("account {table} already in use"));
                }
            }
        }

        for (pubkey, balance) in pending {
            self.balances.insert(pubkey, balance as u64);
        }
        for effect in effects {
            match effect {
                Effect::Transfer { .. } => {}
                Effect::CreateTable { table, authority } => {
                    self.insert_lookup_table(&table, &authority, &[]);
                }
                Effect::ExtendTable { table, addresses } => {
                    if let Some(mut data) = self.accounts.get_mut(&table) {
                        for address in addresses {
                            data.extend_from_slice(address.as_ref());
                        }
                    }
                }
                Effect::DebitTokens { account, amount } => {
                    for mut entry in self.token_accounts.iter_mut() {
                        for holding in entry.value_mut().iter_mut().filter(|h| h.address == account) {
                            holding.amount = holding.amount.saturating_sub(amount);
                        }
                    }
                }
                Effect::CloseTokenAccount { account } => {
                    for mut entry in self.token_accounts.iter_mut() {
                        entry.value_mut().retain(|h| h.address != account);
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    fn endpoint(&self) -> &str {
        "mock"
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> RpcResult<u64> {
        Ok(self.balance(pubkey))
    }

    async fn get_latest_blockhash(&self) -> RpcResult<BlockhashInfo> {
        Ok(BlockhashInfo {
            blockhash: Hash::new_unique(),
            last_valid_block_height: self.block_height.load(Ordering::SeqCst) + MOCK_BLOCKHASH_VALIDITY,
        })
    }

    async fn get_slot(&self) -> RpcResult<u64> {
        Ok(self.slot.fetch_add(1, Ordering::SeqCst))
    }

    async fn get_block_height(&self) -> RpcResult<u64> {
        Ok(self.block_height.load(Ordering::SeqCst))
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> RpcResult<Signature> {
        let behavior = self.script.lock().pop_front().unwrap_or(SendBehavior::Land);
        if behavior == SendBehavior::Reject {
            return Err(RpcManagerError::Transport {
                endpoint: self.endpoint().to_string(),
                message: "connection reset by peer".to_string(),
            });
        }

        let signature = tx.signatures[0];
        self.sent.lock().push(tx.clone());

        match behavior {
            SendBehavior::Land => {
                let err = self.apply(tx).err();
                self.statuses.insert(signature, SignatureStatus { confirmed: true, err });
            }
            SendBehavior::LandWithError(err) => {
                self.statuses.insert(
                    signature,
                    SignatureStatus {
                        confirmed: true,
                        err: Some(err),
                    },
                );
            }
            SendBehavior::LandUnconfirmed => {
                let _ = self.apply(tx);
            }
            SendBehavior::Drop | SendBehavior::Reject => {}
        }
        Ok(signature)
    }

    async fn simulate_transaction(&self, _tx: &VersionedTransaction) -> RpcResult<SimulationOutcome> {
        let failing = self
            .simulation_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(SimulationOutcome {
            err: failing.then(|| "custom program error: 0x1771".to_string()),
            logs: Vec::new(),
            units_consumed: Some(30_000),
        })
    }

    async fn get_signature_status(&self, signature: &Signature) -> RpcResult<Option<SignatureStatus>> {
        Ok(self.statuses.get(signature).map(|s| s.clone()))
    }

    async fn get_account_data(&self, pubkey: &Pubkey) -> RpcResult<Option<Vec<u8>>> {
        Ok(self.accounts.get(pubkey).map(|d| d.clone()))
    }

    async fn get_token_accounts(&self, owner: &Pubkey) -> RpcResult<Vec<TokenHolding>> {
        Ok(self.token_holdings(owner))
    }
}
