//! Raydium LaunchLab ("bonk") constant-product launchpad
//!
//! The quote side is WSOL, so each buy wraps SOL first: base ATA, WSOL ATA,
//! transfer, `sync_native`, then `buy_exact_in`. Three wallets fit in a
//! transaction.

use super::{
    put_string, with_slippage_down, InstructionSet, Launchpad, LaunchpadBuilder, TokenMetadata,
};
use crate::config::sol_to_lamports;
use crate::tx_builder::errors::{TransactionBuilderError, TxResult};
use crate::tx_builder::instructions::ComputeBudget;
use crate::tx_builder::lookup_table::{chunk_steps, LookupTableStep};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    system_instruction, system_program, sysvar,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use spl_token::native_mint;

pub const GROUP_SIZE: usize = 3;
pub const BUY_INSTRUCTIONS_PER_WALLET: usize = 5;

pub mod seeds {
    pub const POOL: &[u8] = b"pool";
    pub const POOL_VAULT: &[u8] = b"pool_vault";
    pub const METADATA: &[u8] = b"metadata";
}

pub mod accounts {
    use super::*;

    pub const LAUNCHLAB: Pubkey = pubkey!("LanMV9sAd7wArD4vJFi2qDdfnVhFxYSUg6eADduJ3uj");
    pub const AUTHORITY: Pubkey = pubkey!("WLHv2UAZm6z4KyaaELi5pjdbJh6RESMva1Rnn8pJVVh");
    pub const GLOBAL_CONFIG: Pubkey = pubkey!("6s1xP3hpbAfFoNtUNF8mfHsjr2Bd97JxFJRWLbL6aHuX");
    pub const PLATFORM_CONFIG: Pubkey = pubkey!("FfYek5vEz23cMkWsdJwG2oa6EphsvXSHrGpdALN4g6W1");
    pub const EVENT_AUTHORITY: Pubkey = pubkey!("2DPAtwB8L12vrMRExbLuyGnC7n2J5LNoZQSejeQGpwkr");
    pub const MPL_TOKEN_METADATA: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

    pub const PROTOCOL_FEE_RATE: u128 = 25;
    pub const PLATFORM_FEE_RATE: u128 = 100;
}

pub const INITIALIZE_DISCRIMINATOR: [u8; 8] = [175, 175, 109, 31, 13, 251, 127, 237];
pub const BUY_EXACT_IN_DISCRIMINATOR: [u8; 8] = [250, 234, 13, 123, 213, 156, 19, 236];
pub const SELL_EXACT_IN_DISCRIMINATOR: [u8; 8] = [149, 39, 222, 155, 211, 124, 152, 26];

pub const TOKEN_DECIMALS: u8 = 6;
pub const CURVE_SUPPLY: u64 = 1_000_000_000_000_000;
pub const CURVE_TOTAL_BASE_SELL: u64 = 793_100_000_000_000;
pub const CURVE_TOTAL_QUOTE_FUND_RAISING: u64 = 85_000_000_000;

/// Virtual reserves of a freshly initialized constant curve
pub const INITIAL_VIRTUAL_BASE: u128 = 1_073_025_605_596_382;
pub const INITIAL_VIRTUAL_QUOTE: u128 = 30_000_852_951;

pub fn pool_pda(base_mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[seeds::POOL, base_mint.as_ref(), native_mint::ID.as_ref()],
        &accounts::LAUNCHLAB,
    )
    .0
}

pub fn vault_pda(pool: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[seeds::POOL_VAULT, pool.as_ref(), mint.as_ref()], &accounts::LAUNCHLAB).0
}

pub fn platform_fee_vault_pda() -> Pubkey {
    Pubkey::find_program_address(
        &[accounts::PLATFORM_CONFIG.as_ref(), native_mint::ID.as_ref()],
        &accounts::LAUNCHLAB,
    )
    .0
}

pub fn creator_fee_vault_pda(creator: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[creator.as_ref(), native_mint::ID.as_ref()], &accounts::LAUNCHLAB).0
}

pub fn metadata_pda(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            seeds::METADATA,
            accounts::MPL_TOKEN_METADATA.as_ref(),
            mint.as_ref(),
        ],
        &accounts::MPL_TOKEN_METADATA,
    )
    .0
}

pub fn wsol_ata(owner: &Pubkey) -> Pubkey {
    get_associated_token_address(owner, &native_mint::ID)
}

/// Curve reserves as seen by the `index`-th buyer
#[derive(Debug, Clone, Copy)]
pub struct PoolCurve {
    pub virtual_base: u128,
    pub virtual_quote: u128,
    pub real_base: u128,
    pub real_quote: u128,
}

impl Default for PoolCurve {
    fn default() -> Self {
        Self {
            virtual_base: INITIAL_VIRTUAL_BASE,
            virtual_quote: INITIAL_VIRTUAL_QUOTE,
            real_base: 0,
            real_quote: 0,
        }
    }
}

impl PoolCurve {
    fn net_input(amount_in: u64) -> u128 {
        let amount = amount_in as u128;
        let fees = amount * accounts::PROTOCOL_FEE_RATE / 10_000 + amount * accounts::PLATFORM_FEE_RATE / 10_000;
        amount - fees
    }

    pub fn quote_buy(&self, amount_in: u64) -> u64 {
        let net = Self::net_input(amount_in);
        let input_reserve = self.virtual_quote + self.real_quote;
        let output_reserve = self.virtual_base.saturating_sub(self.real_base);
        if input_reserve + net == 0 {
            return 0;
        }
        (net * output_reserve / (input_reserve + net)) as u64
    }

    pub fn apply_buy(&mut self, amount_in: u64) -> u64 {
        let out = self.quote_buy(amount_in);
        self.real_base += out as u128;
        self.real_quote += Self::net_input(amount_in);
        out
    }

    pub fn after_buys(amount_in: u64, count: usize) -> Self {
        let mut curve = Self::default();
        for _ in 0..count {
            curve.apply_buy(amount_in);
        }
        curve
    }
}

#[derive(Debug, Clone)]
pub struct BonkBuilder {
    slippage_bps: u16,
}

impl BonkBuilder {
    pub fn new(slippage_bps: u16) -> Self {
        Self { slippage_bps }
    }

    fn trade_data(discriminator: [u8; 8], amount_in: u64, min_out: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(32);
        data.extend_from_slice(&discriminator);
        data.extend_from_slice(&amount_in.to_le_bytes());
        data.extend_from_slice(&min_out.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());
        data
    }

    /// Account list shared by `buy_exact_in` and `sell_exact_in`
    fn trade_accounts(wallet: &Pubkey, mint: &Pubkey, creator: &Pubkey) -> Vec<AccountMeta> {
        let pool = pool_pda(mint);
        vec![
            AccountMeta::new(*wallet, true),
            AccountMeta::new_readonly(accounts::AUTHORITY, false),
            AccountMeta::new_readonly(accounts::GLOBAL_CONFIG, false),
            AccountMeta::new_readonly(accounts::PLATFORM_CONFIG, false),
            AccountMeta::new(pool, false),
            AccountMeta::new(get_associated_token_address(wallet, mint), false),
            AccountMeta::new(wsol_ata(wallet), false),
            AccountMeta::new(vault_pda(&pool, mint), false),
            AccountMeta::new(vault_pda(&pool, &native_mint::ID), false),
            AccountMeta::new(*mint, false),
            AccountMeta::new_readonly(native_mint::ID, false),
            AccountMeta::new_readonly(spl_token::ID, false),
            AccountMeta::new_readonly(spl_token::ID, false),
            AccountMeta::new_readonly(accounts::EVENT_AUTHORITY, false),
            AccountMeta::new_readonly(accounts::LAUNCHLAB, false),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new(platform_fee_vault_pda(), false),
            AccountMeta::new(creator_fee_vault_pda(creator), false),
        ]
    }

    fn static_addresses(&self, main: &Pubkey, mint: &Pubkey) -> Vec<Pubkey> {
        let pool = pool_pda(mint);
        vec![
            *main,
            *mint,
            accounts::LAUNCHLAB,
            system_program::ID,
            spl_token::ID,
            spl_associated_token_account::ID,
            sysvar::rent::ID,
            solana_sdk::compute_budget::ID,
            native_mint::ID,
            accounts::GLOBAL_CONFIG,
            accounts::PLATFORM_CONFIG,
            pool,
            vault_pda(&pool, mint),
            vault_pda(&pool, &native_mint::ID),
            wsol_ata(main),
            accounts::AUTHORITY,
            platform_fee_vault_pda(),
            creator_fee_vault_pda(main),
            accounts::EVENT_AUTHORITY,
        ]
    }
}

fn token_error(e: solana_sdk::program_error::ProgramError) -> TransactionBuilderError {
    TransactionBuilderError::instruction_failed("spl-token", e.to_string())
}

impl LaunchpadBuilder for BonkBuilder {
    fn launchpad(&self) -> Launchpad {
        Launchpad::Bonk
    }

    fn program_id(&self) -> Pubkey {
        accounts::LAUNCHLAB
    }

    fn build_create(&self, main: &Pubkey, mint: &Pubkey, metadata: &TokenMetadata) -> TxResult<InstructionSet> {
        let pool = pool_pda(mint);
        let base_vault = vault_pda(&pool, mint);
        let quote_vault = vault_pda(&pool, &native_mint::ID);
        let metadata_account = metadata_pda(mint);

        let mut data = Vec::with_capacity(128 + metadata.name.len() + metadata.symbol.len() + metadata.uri.len());
        data.extend_from_slice(&INITIALIZE_DISCRIMINATOR);
        data.push(TOKEN_DECIMALS);
        put_string(&mut data, &metadata.name);
        put_string(&mut data, &metadata.symbol);
        put_string(&mut data, &metadata.uri);
        // CurveParams::Constant
        data.push(0);
        data.extend_from_slice(&CURVE_SUPPLY.to_le_bytes());
        data.extend_from_slice(&CURVE_TOTAL_BASE_SELL.to_le_bytes());
        data.extend_from_slice(&CURVE_TOTAL_QUOTE_FUND_RAISING.to_le_bytes());
        data.push(0);
        // VestingParams: no lock
        data.extend_from_slice(&[0u8; 24]);

        let ix = Instruction {
            program_id: accounts::LAUNCHLAB,
            accounts: vec![
                AccountMeta::new(*main, true),
                AccountMeta::new_readonly(*main, true),
                AccountMeta::new_readonly(accounts::GLOBAL_CONFIG, false),
                AccountMeta::new_readonly(accounts::PLATFORM_CONFIG, false),
                AccountMeta::new_readonly(accounts::AUTHORITY, false),
                AccountMeta::new(pool, false),
                AccountMeta::new(*mint, true),
                AccountMeta::new_readonly(native_mint::ID, false),
                AccountMeta::new(base_vault, false),
                AccountMeta::new(quote_vault, false),
                AccountMeta::new(metadata_account, false),
                AccountMeta::new_readonly(spl_token::ID, false),
                AccountMeta::new_readonly(spl_token::ID, false),
                AccountMeta::new_readonly(accounts::MPL_TOKEN_METADATA, false),
                AccountMeta::new_readonly(system_program::ID, false),
                AccountMeta::new_readonly(sysvar::rent::ID, false),
                AccountMeta::new_readonly(accounts::EVENT_AUTHORITY, false),
                AccountMeta::new_readonly(accounts::LAUNCHLAB, false),
            ],
            data,
        };

        Ok(InstructionSet {
            instructions: vec![ix],
            derived_addresses: vec![pool, base_vault, quote_vault, metadata_account],
        })
    }

    fn build_buy(
        &self,
        wallet: &Pubkey,
        mint: &Pubkey,
        creator: &Pubkey,
        lamports: u64,
        index: usize,
    ) -> TxResult<InstructionSet> {
        if lamports == 0 {
            return Err(TransactionBuilderError::instruction_failed("bonk", "buy amount cannot be zero"));
        }

        let expected_out = PoolCurve::after_buys(lamports, index).quote_buy(lamports);
        let min_out = with_slippage_down(expected_out, self.slippage_bps);
        let base_ata = get_associated_token_address(wallet, mint);
        let quote_ata = wsol_ata(wallet);

        let instructions = vec![
            create_associated_token_account_idempotent(wallet, wallet, mint, &spl_token::ID),
            create_associated_token_account_idempotent(wallet, wallet, &native_mint::ID, &spl_token::ID),
            system_instruction::transfer(wallet, &quote_ata, lamports),
            spl_token::instruction::sync_native(&spl_token::ID, &quote_ata).map_err(token_error)?,
            Instruction {
                program_id: accounts::LAUNCHLAB,
                accounts: Self::trade_accounts(wallet, mint, creator),
                data: Self::trade_data(BUY_EXACT_IN_DISCRIMINATOR, lamports, min_out),
            },
        ];

        Ok(InstructionSet {
            instructions,
            derived_addresses: vec![base_ata, quote_ata],
        })
    }

    fn build_sell(&self, wallet: &Pubkey, mint: &Pubkey, creator: &Pubkey, amount: u64) -> TxResult<InstructionSet> {
        if amount == 0 {
            return Err(TransactionBuilderError::instruction_failed("bonk", "sell amount cannot be zero"));
        }
        let quote_ata = wsol_ata(wallet);

        let instructions = vec![
            create_associated_token_account_idempotent(wallet, wallet, &native_mint::ID, &spl_token::ID),
            Instruction {
                program_id: accounts::LAUNCHLAB,
                accounts: Self::trade_accounts(wallet, mint, creator),
                data: Self::trade_data(SELL_EXACT_IN_DISCRIMINATOR, amount, 0),
            },
            spl_token::instruction::close_account(&spl_token::ID, &quote_ata, wallet, wallet, &[])
                .map_err(token_error)?,
        ];

        Ok(InstructionSet {
            instructions,
            derived_addresses: vec![get_associated_token_address(wallet, mint), quote_ata],
        })
    }

    fn lookup_table_steps(&self, main: &Pubkey, mint: &Pubkey, wallets: &[Pubkey]) -> Vec<LookupTableStep> {
        let atas = wallets.iter().map(|w| get_associated_token_address(w, mint)).collect();
        let wsol_atas = wallets.iter().map(wsol_ata).collect();
        chunk_steps([
            ("wallets", wallets.to_vec()),
            ("wallet_atas", atas),
            ("wsol_atas", wsol_atas),
            ("statics", self.static_addresses(main, mint)),
        ])
    }

    fn buy_instructions_per_wallet(&self) -> usize {
        BUY_INSTRUCTIONS_PER_WALLET
    }

    fn buy_compute_budget(&self) -> ComputeBudget {
        ComputeBudget::BONK_BUY
    }

    fn balance_overhead_lamports(&self) -> u64 {
        sol_to_lamports(0.05)
    }

    fn vanity_suffix(&self) -> &'static str {
        "bonk"
    }
}
