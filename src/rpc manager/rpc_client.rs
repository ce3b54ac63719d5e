//! [`ChainRpc`] over the nonblocking Solana JSON-RPC client

use super::{
    BlockhashInfo, ChainRpc, RpcManagerError, RpcResult, SignatureStatus, SimulationOutcome,
    TokenHolding,
};
use crate::metrics::Timer;
use async_trait::async_trait;
use solana_account_decoder::UiAccountData;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
    rpc_request::TokenAccountsFilter,
};
use solana_sdk::{
    commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};
use std::{future::Future, str::FromStr, sync::Arc, time::Duration};
use tracing::{debug, instrument};

/// Production RPC handle shared by every stage of a run
#[derive(Clone)]
pub struct SolanaRpc {
    client: Arc<RpcClient>,
    endpoint: String,
    commitment: CommitmentConfig,
}

impl std::fmt::Debug for SolanaRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("endpoint", &self.endpoint)
            .field("commitment", &self.commitment.commitment)
            .finish_non_exhaustive()
    }
}

impl SolanaRpc {
    pub fn new(endpoint: &str, timeout: Duration, commitment: CommitmentConfig) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_timeout_and_commitment(
                endpoint.to_string(),
                timeout,
                commitment,
            )),
            endpoint: endpoint.to_string(),
            commitment,
        }
    }

    pub fn commitment(&self) -> CommitmentConfig {
        self.commitment
    }

    fn map_err(&self, err: solana_client::client_error::ClientError) -> RpcManagerError {
        RpcManagerError::from_client_error(err, &self.endpoint)
    }

    async fn timed<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let timer = Timer::with_name("rpc_latency_seconds");
        let out = fut.await;
        timer.finish();
        out
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn get_balance(&self, pubkey: &Pubkey) -> RpcResult<u64> {
        self.timed(self.client.get_balance_with_commitment(pubkey, self.commitment))
            .await
            .map(|response| response.value)
            .map_err(|e| self.map_err(e))
    }

    async fn get_latest_blockhash(&self) -> RpcResult<BlockhashInfo> {
        let (blockhash, last_valid_block_height) = self
            .timed(self.client.get_latest_blockhash_with_commitment(self.commitment))
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(BlockhashInfo {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn get_slot(&self) -> RpcResult<u64> {
        self.timed(self.client.get_slot_with_commitment(CommitmentConfig::confirmed()))
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_block_height(&self) -> RpcResult<u64> {
        self.timed(self.client.get_block_height_with_commitment(self.commitment))
            .await
            .map_err(|e| self.map_err(e))
    }

    #[instrument(skip(self, tx), fields(endpoint = %self.endpoint))]
    async fn send_transaction(&self, tx: &VersionedTransaction) -> RpcResult<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(0),
            ..Default::default()
        };
        let signature = self
            .timed(self.client.send_transaction_with_config(tx, config))
            .await
            .map_err(|e| self.map_err(e))?;
        debug!(signature = %signature, "Transaction broadcast");
        Ok(signature)
    }

    async fn simulate_transaction(&self, tx: &VersionedTransaction) -> RpcResult<SimulationOutcome> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: false,
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let response = self
            .timed(self.client.simulate_transaction_with_config(tx, config))
            .await
            .map_err(|e| self.map_err(e))?;
        let result = response.value;
        Ok(SimulationOutcome {
            err: result.err.map(|e| format!("{e:?}")),
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        })
    }

    async fn get_signature_status(&self, signature: &Signature) -> RpcResult<Option<SignatureStatus>> {
        let response = self
            .timed(self.client.get_signature_statuses(&[*signature]))
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(response
            .value
            .into_iter()
            .next()
            .flatten()
            .map(|status| SignatureStatus {
                confirmed: status.satisfies_commitment(self.commitment),
                err: status.err.map(|e| format!("{e:?}")),
            }))
    }

    async fn get_account_data(&self, pubkey: &Pubkey) -> RpcResult<Option<Vec<u8>>> {
        let response = self
            .timed(self.client.get_account_with_commitment(pubkey, self.commitment))
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(response.value.map(|account| account.data))
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn get_token_accounts(&self, owner: &Pubkey) -> RpcResult<Vec<TokenHolding>> {
        let keyed = self
            .timed(
                self.client
                    .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(spl_token::id())),
            )
            .await
            .map_err(|e| self.map_err(e))?;

        let mut holdings = Vec::with_capacity(keyed.len());
        for entry in keyed {
            let address = Pubkey::from_str(&entry.pubkey)
                .map_err(|e| RpcManagerError::Decode(format!("token account key: {e}")))?;
            match entry.account.data {
                UiAccountData::Json(parsed) => holdings.push(parse_token_holding(address, &parsed.parsed)?),
                _ => debug!(account = %address, "Skipping token account without parsed data"),
            }
        }
        Ok(holdings)
    }
}

/// Extract mint, raw amount and decimals from a `jsonParsed` token account
pub(crate) fn parse_token_holding(address: Pubkey, parsed: &serde_json::Value) -> RpcResult<TokenHolding> {
    let info = &parsed["info"];
    let mint = info["mint"]
        .as_str()
        .and_then(|s| Pubkey::from_str(s).ok())
        .ok_or_else(|| RpcManagerError::Decode(format!("missing mint for {address}")))?;
    let amount = info["tokenAmount"]["amount"]
        .as_str()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| RpcManagerError::Decode(format!("missing amount for {address}")))?;
    let decimals = info["tokenAmount"]["decimals"]
        .as_u64()
        .and_then(|d| u8::try_from(d).ok())
        .ok_or_else(|| RpcManagerError::Decode(format!("missing decimals for {address}")))?;

    Ok(TokenHolding {
        address,
        mint,
        amount,
        decimals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_token_holding() {
        let mint = Pubkey::new_unique();
        let address = Pubkey::new_unique();
        let parsed = json!({
            "type": "account",
            "info": {
                "mint": mint.to_string(),
                "owner": Pubkey::new_unique().to_string(),
                "tokenAmount": { "amount": "123456789", "decimals": 6, "uiAmount": 123.456789 }
            }
        });

        let holding = parse_token_holding(address, &parsed).unwrap();
        assert_eq!(holding.mint, mint);
        assert_eq!(holding.amount, 123_456_789);
        assert_eq!(holding.decimals, 6);
    }

    #[test]
    fn test_parse_token_holding_rejects_missing_fields() {
        let parsed = json!({ "info": { "mint": "not-a-key" } });
        let err = parse_token_holding(Pubkey::new_unique(), &parsed).unwrap_err();
        assert!(matches!(err, RpcManagerError::Decode(_)));
    }
}
