//! Routing boundary: candidate route discovery and materialization into
//! executable instructions, over a Jupiter-style quote HTTP API.

use std::str::FromStr;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::error::RoutingError;

/// One externally-ranked swap option. The service returns candidates
/// best-first; that order is authoritative for tie-breaking.
#[derive(Debug, Clone)]
pub struct RouteCandidate {
    pub out_amount: u64,
    /// Worst acceptable output under the quoted slippage
    pub other_amount_threshold: u64,
    /// Opaque route description, passed back verbatim on materialization
    pub route: serde_json::Value,
}

/// A candidate materialized into executable instruction groups
#[derive(Debug, Clone)]
pub struct MaterializedRoute {
    pub setup: Vec<Instruction>,
    pub swap: Instruction,
    pub cleanup: Vec<Instruction>,
}

/// Capability surface the crank needs from the routing service
#[async_trait]
pub trait RoutingGateway: Send + Sync {
    /// Ranked candidate routes for swapping `amount` of `input_mint` into
    /// `output_mint`, best-first
    async fn compute_routes(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u64,
    ) -> Result<Vec<RouteCandidate>, RoutingError>;

    /// Turn a candidate into executable instruction groups for `user`
    async fn materialize(
        &self,
        candidate: &RouteCandidate,
        user: &Pubkey,
    ) -> Result<MaterializedRoute, RoutingError>;
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Full route objects, kept opaque so materialization can echo them back
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapInstructionsResponse {
    #[serde(default)]
    setup_instructions: Vec<ApiInstruction>,
    swap_instruction: ApiInstruction,
    #[serde(default)]
    cleanup_instruction: Option<ApiInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInstruction {
    program_id: String,
    accounts: Vec<ApiAccountMeta>,
    /// base64-encoded instruction payload
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAccountMeta {
    pubkey: String,
    is_signer: bool,
    is_writable: bool,
}

pub struct JupiterRouter {
    http: reqwest::Client,
    base_url: String,
}

impl JupiterRouter {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl RoutingGateway for JupiterRouter {
    async fn compute_routes(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u64,
    ) -> Result<Vec<RouteCandidate>, RoutingError> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}&swapMode=ExactIn",
            self.base_url, input_mint, output_mint, amount, slippage_bps
        );

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(RoutingError::Api(format!(
                "quote request failed with status {}",
                response.status()
            )));
        }

        let quote: QuoteResponse = response.json().await?;
        debug!("routing service returned {} candidates", quote.data.len());

        quote
            .data
            .into_iter()
            .map(|route| {
                Ok(RouteCandidate {
                    out_amount: amount_field(&route, "outAmount")?,
                    other_amount_threshold: amount_field(&route, "otherAmountThreshold")?,
                    route,
                })
            })
            .collect()
    }

    async fn materialize(
        &self,
        candidate: &RouteCandidate,
        user: &Pubkey,
    ) -> Result<MaterializedRoute, RoutingError> {
        let url = format!("{}/swap-instructions", self.base_url);
        let body = serde_json::json!({
            "route": candidate.route,
            "userPublicKey": user.to_string(),
            "wrapUnwrapSOL": false,
        });

        let response = self.http.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(RoutingError::Api(format!(
                "swap-instructions request failed with status {}",
                response.status()
            )));
        }

        let instructions: SwapInstructionsResponse = response.json().await?;
        Ok(MaterializedRoute {
            setup: instructions
                .setup_instructions
                .iter()
                .map(decode_instruction)
                .collect::<Result<_, _>>()?,
            swap: decode_instruction(&instructions.swap_instruction)?,
            cleanup: instructions
                .cleanup_instruction
                .iter()
                .map(decode_instruction)
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Amounts come over the wire as decimal strings (they exceed JSON's safe
/// integer range).
fn amount_field(route: &serde_json::Value, field: &str) -> Result<u64, RoutingError> {
    route
        .get(field)
        .and_then(|v| v.as_str())
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| RoutingError::Api(format!("missing or unparseable {}", field)))
}

fn decode_instruction(api: &ApiInstruction) -> Result<Instruction, RoutingError> {
    let program_id = Pubkey::from_str(&api.program_id)
        .map_err(|_| RoutingError::MalformedInstruction(format!("program id {}", api.program_id)))?;
    let accounts = api
        .accounts
        .iter()
        .map(|meta| {
            Ok(AccountMeta {
                pubkey: Pubkey::from_str(&meta.pubkey).map_err(|_| {
                    RoutingError::MalformedInstruction(format!("account {}", meta.pubkey))
                })?,
                is_signer: meta.is_signer,
                is_writable: meta.is_writable,
            })
        })
        .collect::<Result<Vec<_>, RoutingError>>()?;
    let data = BASE64
        .decode(&api.data)
        .map_err(|e| RoutingError::MalformedInstruction(format!("payload: {}", e)))?;

    Ok(Instruction {
        program_id,
        accounts,
        data,
    })
}
