use std::str::FromStr;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;

use crate::error::{CrankError, CrankResult};

/// Jupiter v4 swap program (default routing program identity)
const DEFAULT_ROUTING_PROGRAM: &str = "JUP4Fb2cqiRUcaTHdrPC8h2gNsA2ETXiPDD33WcGuJB";

/// Process configuration, loaded from the environment once at startup.
///
/// The RPC endpoint and the two mints come in as positional arguments, not
/// env vars, because each pair runs as its own isolated process.
#[derive(Debug, Clone)]
pub struct Config {
    pub keypair_path: String,
    pub pool_program_id: Pubkey,
    pub routing_program_id: Pubkey,
    pub routing_api_url: String,
    /// Maximum relative degradation of a candidate's output threshold
    /// versus the best candidate, in basis points.
    pub slippage_tolerance_bps: u64,
    /// Steady-state delay between cycles
    pub poll_delay: Duration,
    /// Delay after a failed cycle
    pub error_delay: Duration,
    /// Delay before retrying a failed INIT from scratch
    pub init_retry_delay: Duration,
}

impl Config {
    pub fn from_env() -> CrankResult<Self> {
        let pool_program_id = std::env::var("POOL_PROGRAM_ID")
            .map_err(|_| CrankError::Config("POOL_PROGRAM_ID must be set".to_string()))?;
        let pool_program_id = Pubkey::from_str(&pool_program_id)
            .map_err(|_| CrankError::Config(format!("invalid POOL_PROGRAM_ID: {}", pool_program_id)))?;

        let routing_program_id = std::env::var("ROUTING_PROGRAM_ID")
            .unwrap_or_else(|_| DEFAULT_ROUTING_PROGRAM.to_string());
        let routing_program_id = Pubkey::from_str(&routing_program_id).map_err(|_| {
            CrankError::Config(format!("invalid ROUTING_PROGRAM_ID: {}", routing_program_id))
        })?;

        Ok(Self {
            keypair_path: std::env::var("KEYPAIR_PATH")
                .unwrap_or_else(|_| "id.json".to_string()),
            pool_program_id,
            routing_program_id,
            routing_api_url: std::env::var("ROUTING_API_URL")
                .unwrap_or_else(|_| "https://quote-api.jup.ag/v4".to_string()),
            slippage_tolerance_bps: parse_env_u64("SLIPPAGE_TOLERANCE_BPS", 500)?,
            poll_delay: Duration::from_secs(parse_env_u64("POLL_DELAY_SECS", 10)?),
            error_delay: Duration::from_secs(parse_env_u64("ERROR_DELAY_SECS", 60)?),
            init_retry_delay: Duration::from_secs(parse_env_u64("INIT_RETRY_DELAY_SECS", 30)?),
        })
    }
}

fn parse_env_u64(name: &str, default: u64) -> CrankResult<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| CrankError::Config(format!("invalid {}: {}", name, raw))),
        Err(_) => Ok(default),
    }
}
