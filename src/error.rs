//! Error types for the Warden relayer

use thiserror::Error;

/// Main error type for the relayer
#[derive(Error, Debug)]
pub enum RelayerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("RPC error on chain {chain_id}: {message}")]
    Rpc { chain_id: u64, message: String },

    #[error("Invalid event data for {id}: {message}")]
    InvalidEvent { id: String, message: String },

    #[error("Transaction {tx_hash} reverted on chain {chain_id}")]
    Reverted { chain_id: u64, tx_hash: String },

    #[error("Nonce conflict on chain {chain_id}: {message}")]
    NonceConflict { chain_id: u64, message: String },

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Insufficient funds on chain {chain_id}")]
    InsufficientFunds { chain_id: u64 },

    #[error("Ledger transition rejected for {id}: {message}")]
    Ledger { id: String, message: String },

    #[error("Chain {chain_id} not found")]
    ChainNotFound { chain_id: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayerError {
    /// Check if error is retryable with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayerError::Rpc { .. } | RelayerError::Timeout { .. }
        )
    }

    /// Check if error permanently fails the relay record (no automatic retry)
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            RelayerError::InvalidEvent { .. }
                | RelayerError::Reverted { .. }
                | RelayerError::InsufficientFunds { .. }
        )
    }
}

/// Result type for relayer operations
pub type RelayerResult<T> = Result<T, RelayerError>;
