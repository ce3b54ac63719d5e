//! pump.fun bonding curve program
//!
//! Buys are two instructions per wallet (idempotent ATA create, then `buy`),
//! grouped four wallets to a transaction.

use super::{put_string, with_slippage_up, InstructionSet, Launchpad, LaunchpadBuilder, TokenMetadata};
use crate::config::sol_to_lamports;
use crate::tx_builder::errors::{TransactionBuilderError, TxResult};
use crate::tx_builder::instructions::ComputeBudget;
use crate::tx_builder::lookup_table::{chunk_steps, LookupTableStep};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    system_program, sysvar,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};

pub const GROUP_SIZE: usize = 4;
pub const BUY_INSTRUCTIONS_PER_WALLET: usize = 2;

pub mod seeds {
    pub const GLOBAL: &[u8] = b"global";
    pub const MINT_AUTHORITY: &[u8] = b"mint-authority";
    pub const BONDING_CURVE: &[u8] = b"bonding-curve";
    pub const CREATOR_VAULT: &[u8] = b"creator-vault";
    pub const METADATA: &[u8] = b"metadata";
    pub const USER_VOLUME_ACCUMULATOR: &[u8] = b"user_volume_accumulator";
}

pub mod accounts {
    use super::*;

    pub const PUMPFUN: Pubkey = pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
    pub const GLOBAL: Pubkey = pubkey!("4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf");
    pub const FEE_RECIPIENT: Pubkey = pubkey!("CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM");
    pub const EVENT_AUTHORITY: Pubkey = pubkey!("Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1");
    pub const GLOBAL_VOLUME_ACCUMULATOR: Pubkey = pubkey!("Hq2wp8uJ9jCPsYgNHex8RtqdvMPfVGoYwjvF1ATiwn2Y");
    pub const FEE_CONFIG: Pubkey = pubkey!("8Wf5TiAheLUqBrKXeYg2JtAFFMWtKdG2BSFgqUcPVwTt");
    pub const FEE_PROGRAM: Pubkey = pubkey!("pfeeUxB6jkeY1Hxd7CsFCAjcbHA9rWtchMGdZ6VojVZ");
    pub const MPL_TOKEN_METADATA: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");
}

pub const CREATE_DISCRIMINATOR: [u8; 8] = [24, 30, 200, 40, 5, 28, 7, 119];
pub const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
pub const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

pub const INITIAL_VIRTUAL_TOKEN_RESERVES: u64 = 1_073_000_000_000_000;
pub const INITIAL_VIRTUAL_SOL_RESERVES: u64 = 30_000_000_000;
pub const INITIAL_REAL_TOKEN_RESERVES: u64 = 793_100_000_000_000;
/// Protocol plus creator fee charged on the SOL side
pub const FEE_BASIS_POINTS: u64 = 100;

pub fn mint_authority_pda() -> Pubkey {
    Pubkey::find_program_address(&[seeds::MINT_AUTHORITY], &accounts::PUMPFUN).0
}

pub fn bonding_curve_pda(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[seeds::BONDING_CURVE, mint.as_ref()], &accounts::PUMPFUN).0
}

pub fn creator_vault_pda(creator: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[seeds::CREATOR_VAULT, creator.as_ref()], &accounts::PUMPFUN).0
}

pub fn user_volume_accumulator_pda(user: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[seeds::USER_VOLUME_ACCUMULATOR, user.as_ref()], &accounts::PUMPFUN).0
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

/// Fresh-curve reserves, advanced one buy at a time
#[derive(Debug, Clone, Copy)]
pub struct BondingCurve {
    pub virtual_token_reserves: u128,
    pub virtual_sol_reserves: u128,
    pub real_token_reserves: u128,
}

impl Default for BondingCurve {
    fn default() -> Self {
        Self {
            virtual_token_reserves: INITIAL_VIRTUAL_TOKEN_RESERVES as u128,
            virtual_sol_reserves: INITIAL_VIRTUAL_SOL_RESERVES as u128,
            real_token_reserves: INITIAL_REAL_TOKEN_RESERVES as u128,
        }
    }
}

impl BondingCurve {
    /// Tokens received for `lamports` (fee inclusive) at the current state
    pub fn quote_buy(&self, lamports: u64) -> u64 {
        if lamports == 0 || self.virtual_token_reserves == 0 {
            return 0;
        }
        let input = lamports as u128 * 10_000 / (10_000 + FEE_BASIS_POINTS as u128);
        let tokens = input * self.virtual_token_reserves / (self.virtual_sol_reserves + input);
        tokens.min(self.real_token_reserves) as u64
    }

    /// Apply a buy and return the tokens it received
    pub fn apply_buy(&mut self, lamports: u64) -> u64 {
        let tokens = self.quote_buy(lamports);
        let input = lamports as u128 * 10_000 / (10_000 + FEE_BASIS_POINTS as u128);
        self.virtual_token_reserves -= tokens as u128;
        self.real_token_reserves -= tokens as u128;
        self.virtual_sol_reserves += input;
        tokens
    }

    /// State after `count` equal buys of `lamports`
    pub fn after_buys(lamports: u64, count: usize) -> Self {
        let mut curve = Self::default();
        for _ in 0..count {
            curve.apply_buy(lamports);
        }
        curve
    }
}

#[derive(Debug, Clone)]
pub struct PumpFunBuilder {
    slippage_bps: u16,
}

impl PumpFunBuilder {
    pub fn new(slippage_bps: u16) -> Self {
        Self { slippage_bps }
    }

    fn trade_data(discriminator: [u8; 8], amount: u64, limit: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(24);
        data.extend_from_slice(&discriminator);
        data.extend_from_slice(&amount.to_le_bytes());
        data.extend_from_slice(&limit.to_le_bytes());
        data
    }

    /// Statics shared by every buy transaction
    fn static_addresses(&self, main: &Pubkey, mint: &Pubkey) -> Vec<Pubkey> {
        let bonding_curve = bonding_curve_pda(mint);
        vec![
            *main,
            *mint,
            accounts::PUMPFUN,
            spl_token::ID,
            spl_associated_token_account::ID,
            system_program::ID,
            sysvar::rent::ID,
            spl_token::native_mint::ID,
            solana_sdk::compute_budget::ID,
            creator_vault_pda(main),
            accounts::GLOBAL_VOLUME_ACCUMULATOR,
            accounts::FEE_CONFIG,
            accounts::FEE_PROGRAM,
            bonding_curve,
            get_associated_token_address(&bonding_curve, mint),
            accounts::FEE_RECIPIENT,
            accounts::EVENT_AUTHORITY,
            accounts::GLOBAL,
        ]
    }
}

impl LaunchpadBuilder for PumpFunBuilder {
    fn launchpad(&self) -> Launchpad {
        Launchpad::PumpFun
    }

    fn program_id(&self) -> Pubkey {
        accounts::PUMPFUN
    }

    fn build_create(&self, main: &Pubkey, mint: &Pubkey, metadata: &TokenMetadata) -> TxResult<InstructionSet> {
        let bonding_curve = bonding_curve_pda(mint);
        let associated_bonding_curve = get_associated_token_address(&bonding_curve, mint);
        let mint_authority = mint_authority_pda();
        let metadata_account = metadata_pda(mint);

        let mut data = Vec::with_capacity(
            8 + 12 + metadata.name.len() + metadata.symbol.len() + metadata.uri.len() + 32,
        );
        data.extend_from_slice(&CREATE_DISCRIMINATOR);
        put_string(&mut data, &metadata.name);
        put_string(&mut data, &metadata.symbol);
        put_string(&mut data, &metadata.uri);
        data.extend_from_slice(main.as_ref());

        let ix = Instruction {
            program_id: accounts::PUMPFUN,
            accounts: vec![
                AccountMeta::new(*mint, true),
                AccountMeta::new_readonly(mint_authority, false),
                AccountMeta::new(bonding_curve, false),
                AccountMeta::new(associated_bonding_curve, false),
                AccountMeta::new_readonly(accounts::GLOBAL, false),
                AccountMeta::new_readonly(accounts::MPL_TOKEN_METADATA, false),
                AccountMeta::new(metadata_account, false),
                AccountMeta::new(*main, true),
                AccountMeta::new_readonly(system_program::ID, false),
                AccountMeta::new_readonly(spl_token::ID, false),
                AccountMeta::new_readonly(spl_associated_token_account::ID, false),
                AccountMeta::new_readonly(sysvar::rent::ID, false),
                AccountMeta::new_readonly(accounts::EVENT_AUTHORITY, false),
                AccountMeta::new_readonly(accounts::PUMPFUN, false),
            ],
            data,
        };

        Ok(InstructionSet {
            instructions: vec![ix],
            derived_addresses: vec![bonding_curve, associated_bonding_curve, mint_authority, metadata_account],
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
            return Err(TransactionBuilderError::instruction_failed("pumpfun", "buy amount cannot be zero"));
        }

        let token_amount = BondingCurve::after_buys(lamports, index).quote_buy(lamports);
        if token_amount == 0 {
            return Err(TransactionBuilderError::instruction_failed(
                "pumpfun",
                format!("curve has no tokens left for wallet {index}"),
            ));
        }
        let max_sol_cost = with_slippage_up(lamports, self.slippage_bps);

        let bonding_curve = bonding_curve_pda(mint);
        let associated_bonding_curve = get_associated_token_address(&bonding_curve, mint);
        let user_ata = get_associated_token_address(wallet, mint);
        let creator_vault = creator_vault_pda(creator);
        let user_volume_accumulator = user_volume_accumulator_pda(wallet);

        let buy = Instruction {
            program_id: accounts::PUMPFUN,
            accounts: vec![
                AccountMeta::new_readonly(accounts::GLOBAL, false),
                AccountMeta::new(accounts::FEE_RECIPIENT, false),
                AccountMeta::new_readonly(*mint, false),
                AccountMeta::new(bonding_curve, false),
                AccountMeta::new(associated_bonding_curve, false),
                AccountMeta::new(user_ata, false),
                AccountMeta::new(*wallet, true),
                AccountMeta::new_readonly(system_program::ID, false),
                AccountMeta::new_readonly(spl_token::ID, false),
                AccountMeta::new(creator_vault, false),
                AccountMeta::new_readonly(accounts::EVENT_AUTHORITY, false),
                AccountMeta::new_readonly(accounts::PUMPFUN, false),
                AccountMeta::new(accounts::GLOBAL_VOLUME_ACCUMULATOR, false),
                AccountMeta::new(user_volume_accumulator, false),
                AccountMeta::new_readonly(accounts::FEE_CONFIG, false),
                AccountMeta::new_readonly(accounts::FEE_PROGRAM, false),
            ],
            data: Self::trade_data(BUY_DISCRIMINATOR, token_amount, max_sol_cost),
        };

        Ok(InstructionSet {
            instructions: vec![
                create_associated_token_account_idempotent(wallet, wallet, mint, &spl_token::ID),
                buy,
            ],
            derived_addresses: vec![user_ata, user_volume_accumulator],
        })
    }

    fn build_sell(&self, wallet: &Pubkey, mint: &Pubkey, creator: &Pubkey, amount: u64) -> TxResult<InstructionSet> {
        if amount == 0 {
            return Err(TransactionBuilderError::instruction_failed("pumpfun", "sell amount cannot be zero"));
        }

        let bonding_curve = bonding_curve_pda(mint);
        let associated_bonding_curve = get_associated_token_address(&bonding_curve, mint);
        let user_ata = get_associated_token_address(wallet, mint);

        // Recovery sells take whatever the curve pays
        let sell = Instruction {
            program_id: accounts::PUMPFUN,
            accounts: vec![
                AccountMeta::new_readonly(accounts::GLOBAL, false),
                AccountMeta::new(accounts::FEE_RECIPIENT, false),
                AccountMeta::new_readonly(*mint, false),
                AccountMeta::new(bonding_curve, false),
                AccountMeta::new(associated_bonding_curve, false),
                AccountMeta::new(user_ata, false),
                AccountMeta::new(*wallet, true),
                AccountMeta::new_readonly(system_program::ID, false),
                AccountMeta::new(creator_vault_pda(creator), false),
                AccountMeta::new_readonly(spl_token::ID, false),
                AccountMeta::new_readonly(accounts::EVENT_AUTHORITY, false),
                AccountMeta::new_readonly(accounts::PUMPFUN, false),
                AccountMeta::new_readonly(accounts::FEE_CONFIG, false),
                AccountMeta::new_readonly(accounts::FEE_PROGRAM, false),
            ],
            data: Self::trade_data(SELL_DISCRIMINATOR, amount, 0),
        };

        Ok(InstructionSet {
            instructions: vec![sell],
            derived_addresses: vec![user_ata],
        })
    }

    fn lookup_table_steps(&self, main: &Pubkey, mint: &Pubkey, wallets: &[Pubkey]) -> Vec<LookupTableStep> {
        let atas = wallets.iter().map(|w| get_associated_token_address(w, mint)).collect();
        let accumulators = wallets.iter().map(user_volume_accumulator_pda).collect();
        chunk_steps([
            ("wallets", wallets.to_vec()),
            ("wallet_atas", atas),
            ("volume_accumulators", accumulators),
            ("statics", self.static_addresses(main, mint)),
        ])
    }

    fn buy_instructions_per_wallet(&self) -> usize {
        BUY_INSTRUCTIONS_PER_WALLET
    }

    fn buy_compute_budget(&self) -> ComputeBudget {
        ComputeBudget::PUMP_BUY
    }

    fn balance_overhead_lamports(&self) -> u64 {
        sol_to_lamports(0.04)
    }

    fn vanity_suffix(&self) -> &'static str {
        "pump"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u64(data: &[u8], offset: usize) -> u64 {
        u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap())
    }

    #[test]
    fn test_buy_is_ata_then_buy_with_expected_accounts() {
        let builder = PumpFunBuilder::new(1_000);
        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let creator = Pubkey::new_unique();

        let set = builder.build_buy(&wallet, &mint, &creator, 100_000_000, 0).unwrap();
        assert_eq!(set.len(), BUY_INSTRUCTIONS_PER_WALLET);
        assert_eq!(set.instructions[0].program_id, spl_associated_token_account::ID);

        let buy = &set.instructions[1];
        assert_eq!(buy.program_id, accounts::PUMPFUN);
        assert_eq!(buy.data[..8], BUY_DISCRIMINATOR);
        assert_eq!(buy.accounts.len(), 16);
        assert_eq!(buy.accounts[0].pubkey, accounts::GLOBAL);
        assert_eq!(buy.accounts[3].pubkey, bonding_curve_pda(&mint));
        assert_eq!(buy.accounts[6].pubkey, wallet);
        assert!(buy.accounts[6].is_signer);
        assert_eq!(buy.accounts[9].pubkey, creator_vault_pda(&creator));
        assert_eq!(buy.accounts[13].pubkey, user_volume_accumulator_pda(&wallet));
        assert_eq!(buy.accounts[15].pubkey, accounts::FEE_PROGRAM);
        assert_eq!(buy.accounts.iter().filter(|a| a.is_signer).count(), 1);

        assert_eq!(read_u64(&buy.data, 16), 110_000_000);
        assert!(read_u64(&buy.data, 8) > 0);
    }

    #[test]
    fn test_later_buys_receive_fewer_tokens() {
        let builder = PumpFunBuilder::new(0);
        let mint = Pubkey::new_unique();
        let creator = Pubkey::new_unique();
        let amount = |index| {
            let set = builder
                .build_buy(&Pubkey::new_unique(), &mint, &creator, 500_000_000, index)
                .unwrap();
            read_u64(&set.instructions[1].data, 8)
        };
        assert!(amount(0) > amount(1));
        assert!(amount(1) > amount(5));
    }

    #[test]
    fn test_zero_lamport_buy_rejected() {
        let builder = PumpFunBuilder::new(0);
        let k = Pubkey::new_unique();
        let err = builder.build_buy(&k, &k, &k, 0, 0).unwrap_err();
        assert_eq!(err.category(), "instruction");
    }

    #[test]
    fn test_create_data_and_signers() {
        let builder = PumpFunBuilder::new(0);
        let main = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let metadata = TokenMetadata {
            name: "Name".to_string(),
            symbol: "SYM".to_string(),
            uri: "https://x/y.json".to_string(),
        };
        let set = builder.build_create(&main, &mint, &metadata).unwrap();
        let ix = &set.instructions[0];

        assert_eq!(ix.data[..8], CREATE_DISCRIMINATOR);
        assert_eq!(ix.data.len(), 8 + 4 + 4 + 4 + 3 + 4 + 16 + 32);
        assert_eq!(&ix.data[ix.data.len() - 32..], main.as_ref());
        let signers: Vec<Pubkey> = ix.accounts.iter().filter(|a| a.is_signer).map(|a| a.pubkey).collect();
        assert_eq!(signers, vec![mint, main]);
    }

    #[test]
    fn test_sell_puts_creator_vault_before_token_program() {
        let builder = PumpFunBuilder::new(0);
        let wallet = Pubkey::new_unique();
        let creator = Pubkey::new_unique();
        let set = builder.build_sell(&wallet, &Pubkey::new_unique(), &creator, 42).unwrap();
        let ix = &set.instructions[0];
        assert_eq!(ix.data[..8], SELL_DISCRIMINATOR);
        assert_eq!(read_u64(&ix.data, 8), 42);
        assert_eq!(ix.accounts[8].pubkey, creator_vault_pda(&creator));
        assert_eq!(ix.accounts[9].pubkey, spl_token::ID);
        assert_eq!(ix.accounts.len(), 14);
    }

    #[test]
    fn test_lookup_table_step_order() {
        let builder = PumpFunBuilder::new(0);
        let main = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let wallets: Vec<Pubkey> = (0..12).map(|_| Pubkey::new_unique()).collect();

        let steps = builder.lookup_table_steps(&main, &mint, &wallets);
        let labels: Vec<&str> = steps.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["wallets", "wallet_atas", "volume_accumulators", "statics"]);
        assert_eq!(steps[0].addresses, wallets);
        assert!(steps[3].addresses.contains(&accounts::GLOBAL));
        assert!(steps[3].addresses.contains(&creator_vault_pda(&main)));
    }
}
