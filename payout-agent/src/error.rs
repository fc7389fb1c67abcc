//! Error types for the payout agent

use thiserror::Error;

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, Error>;

/// Agent errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger or node client error
    #[error("Ledger error: {0}")]
    Ledger(#[from] payout_ledger::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Pool fee outside [0, 1]
    #[error("Invalid pool fee {0}: must be between 0 and 1")]
    InvalidPoolFee(f64),

    /// Config file could not be parsed
    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Reward event channel closed
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
