//! Error types for the payout ledger

use crate::types::Address;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Sender account is not unlocked, the drain was aborted before any transfer
    #[error("Sender {0} is not authorized to send transactions")]
    Unauthorized(Address),

    /// A single transfer was rejected
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// A single transfer did not complete in time
    #[error("Transfer timeout after {0} seconds")]
    Timeout(u64),

    /// Node connection is down or unreachable
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Node answered with a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message reported by the node
        message: String,
    },

    /// Recipient or sender identity is malformed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Whether the error comes from the connection rather than the request
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::UpstreamUnavailable(_))
    }
}
