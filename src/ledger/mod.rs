//! Ledger boundary: account fetch, program-filtered account query,
//! transaction submit, and read-only view invocation.
//!
//! Every network call is normalized into `LedgerError` here; nothing from
//! the RPC layer is allowed to cross the crank loop as a panic or an opaque
//! failure mode.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_account_decoder::UiAccountEncoding;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{
    RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcSimulateTransactionConfig,
};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use tracing::debug;

use crate::error::LedgerError;

/// Capability surface the crank needs from the ledger
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Raw account data, or `None` if the account does not exist
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Addresses of all `program_id` accounts whose data starts with
    /// `discriminator`, optionally also matching `owner` bytes at `offset`.
    async fn query_program_accounts(
        &self,
        program_id: &Pubkey,
        discriminator: [u8; 8],
        owner_filter: Option<(usize, Pubkey)>,
    ) -> Result<Vec<Pubkey>, LedgerError>;

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError>;

    /// Submit and confirm. A structured program failure surfaces as
    /// `LedgerError::Program` with the program's own message.
    async fn submit_transaction(&self, tx: &Transaction) -> Result<Signature, LedgerError>;

    /// Execute a view-only transaction by simulation and return its return
    /// data. Program failures surface as `LedgerError::Program`.
    async fn invoke_view(&self, tx: &Transaction) -> Result<Vec<u8>, LedgerError>;
}

pub struct SolanaLedger {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaLedger {
    pub fn new(rpc_url: String) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            client: RpcClient::new_with_commitment(rpc_url, commitment),
            commitment,
        }
    }
}

#[async_trait]
impl LedgerGateway for SolanaLedger {
    async fn fetch_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await?;
        Ok(response.value.map(|account| account.data))
    }

    async fn query_program_accounts(
        &self,
        program_id: &Pubkey,
        discriminator: [u8; 8],
        owner_filter: Option<(usize, Pubkey)>,
    ) -> Result<Vec<Pubkey>, LedgerError> {
        let mut filters = vec![RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
            0,
            &discriminator,
        ))];
        if let Some((offset, owner)) = owner_filter {
            filters.push(RpcFilterType::Memcmp(Memcmp::new_base58_encoded(
                offset,
                owner.as_ref(),
            )));
        }

        let accounts = self
            .client
            .get_program_accounts_with_config(
                program_id,
                RpcProgramAccountsConfig {
                    filters: Some(filters),
                    account_config: RpcAccountInfoConfig {
                        encoding: Some(UiAccountEncoding::Base64),
                        commitment: Some(self.commitment),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .await?;

        Ok(accounts.into_iter().map(|(address, _)| address).collect())
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn submit_transaction(&self, tx: &Transaction) -> Result<Signature, LedgerError> {
        match self.client.send_and_confirm_transaction(tx).await {
            Ok(signature) => Ok(signature),
            Err(err) => match preflight_program_message(&err) {
                Some(message) => Err(LedgerError::Program { message }),
                None => Err(err.into()),
            },
        }
    }

    async fn invoke_view(&self, tx: &Transaction) -> Result<Vec<u8>, LedgerError> {
        let result = self
            .client
            .simulate_transaction_with_config(
                tx,
                RpcSimulateTransactionConfig {
                    sig_verify: false,
                    replace_recent_blockhash: true,
                    commitment: Some(self.commitment),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(err) = result.value.err {
            let message = result
                .value
                .logs
                .as_deref()
                .and_then(extract_program_message)
                .unwrap_or_else(|| format!("{:?}", err));
            return Err(LedgerError::Program { message });
        }

        let return_data = result.value.return_data.ok_or_else(|| {
            LedgerError::Malformed("view simulation produced no return data".to_string())
        })?;
        debug!("view returned {} via {}", return_data.data.0, return_data.program_id);
        BASE64
            .decode(&return_data.data.0)
            .map_err(|e| LedgerError::Malformed(format!("undecodable return data: {}", e)))
    }
}

/// Pull the program's own error message out of a failed preflight, if there
/// is one. Anything else is an unclassified transport failure.
fn preflight_program_message(err: &ClientError) -> Option<String> {
    if let ClientErrorKind::RpcError(RpcError::RpcResponseError {
        data: RpcResponseErrorData::SendTransactionPreflightFailure(sim),
        ..
    }) = err.kind()
    {
        return sim.logs.as_deref().and_then(extract_program_message);
    }
    None
}

fn extract_program_message(logs: &[String]) -> Option<String> {
    logs.iter().find_map(|line| {
        line.split("Error Message: ")
            .nth(1)
            .map(|tail| tail.trim_end_matches('.').to_string())
    })
}
