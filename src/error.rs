use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Top-level error type for the crank process
#[derive(Error, Debug)]
pub enum CrankError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Program error: {message}")]
    Program { message: String },

    #[error("Transaction exceeds maximum serialized size")]
    SizeExceeded,

    #[error("Account not found: {0}")]
    AccountNotFound(Pubkey),

    #[error("Invalid account data: {0}")]
    InvalidAccountData(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised at the ledger (RPC) boundary
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Program error: {message}")]
    Program { message: String },

    #[error("RPC error: {0}")]
    Rpc(#[from] solana_client::client_error::ClientError),

    #[error("Malformed RPC response: {0}")]
    Malformed(String),
}

/// Errors raised at the routing-service (HTTP) boundary
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Routing API error: {0}")]
    Api(String),

    #[error("Malformed route instruction: {0}")]
    MalformedInstruction(String),
}

/// Result type alias for the crank
pub type CrankResult<T> = Result<T, CrankError>;
