//! Configuration for the payout agent

use crate::{rewards::PoolFee, Error, Result};
use payout_ledger::{PayoutMode, ValidityWindow};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Payout agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node RPC connection
    pub rpc: RpcConfig,

    /// Private key of the validator reward account (hex)
    pub private_key: String,

    /// Payout configuration
    pub payout: PayoutConfig,

    /// Block poller configuration
    pub poller: PollerConfig,
}

/// Node RPC connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// URL scheme (http or https)
    pub scheme: String,

    /// RPC host
    pub host: String,

    /// RPC port
    pub port: u16,

    /// Basic auth user
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<String>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8648,
            username: None,
            password: None,
            request_timeout_secs: 30,
        }
    }
}

impl RpcConfig {
    /// Endpoint URL
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Payout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutConfig {
    /// Fraction of every reward kept by the pool, in [0, 1]
    pub pool_fee: f64,

    /// Transaction kind used for payouts
    pub mode: PayoutMode,

    /// Seconds between drains
    pub frequency_secs: u64,

    /// Upper bound for a single transfer call, 0 disables it
    pub transfer_timeout_secs: u64,

    /// Validity start marker for payout transactions
    pub validity_window: ValidityWindow,

    /// Run one last drain before exiting
    pub drain_on_shutdown: bool,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            pool_fee: 0.0,
            mode: PayoutMode::Basic,
            frequency_secs: 3600,
            transfer_timeout_secs: 30,
            validity_window: ValidityWindow::default(),
            drain_on_shutdown: true,
        }
    }
}

impl PayoutConfig {
    /// Per-transfer timeout, if enabled
    pub fn transfer_timeout(&self) -> Option<Duration> {
        (self.transfer_timeout_secs > 0).then(|| Duration::from_secs(self.transfer_timeout_secs))
    }

    /// Interval between drains
    pub fn frequency(&self) -> Duration {
        Duration::from_secs(self.frequency_secs)
    }
}

/// Block poller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Milliseconds between block height checks
    pub poll_interval_ms: u64,

    /// Reward event channel capacity
    pub channel_capacity: usize,

    /// Seconds between consensus checks at startup
    pub consensus_poll_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            channel_capacity: 256,
            consensus_poll_secs: 1,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay values found in the environment
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("PAYOUT_RPC_HOST") {
            self.rpc.host = host;
        }

        if let Ok(port) = std::env::var("PAYOUT_RPC_PORT") {
            self.rpc.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid PAYOUT_RPC_PORT '{}': {}", port, e)))?;
        }

        if let Ok(key) = std::env::var("PAYOUT_PRIVATE_KEY") {
            self.private_key = key;
        }

        if let Ok(fee) = std::env::var("PAYOUT_POOL_FEE") {
            self.payout.pool_fee = fee
                .parse()
                .map_err(|e| Error::Config(format!("Invalid PAYOUT_POOL_FEE '{}': {}", fee, e)))?;
        }

        if let Ok(freq) = std::env::var("PAYOUT_FREQUENCY_SECS") {
            self.payout.frequency_secs = freq.parse().map_err(|e| {
                Error::Config(format!("Invalid PAYOUT_FREQUENCY_SECS '{}': {}", freq, e))
            })?;
        }

        Ok(())
    }

    /// Check the values a running agent depends on
    pub fn validate(&self) -> Result<()> {
        PoolFee::new(self.payout.pool_fee)?;

        if self.payout.frequency_secs == 0 {
            return Err(Error::Config("Payment frequency must be at least 1 second".to_string()));
        }
        if self.rpc.host.trim().is_empty() {
            return Err(Error::Config("RPC host is empty".to_string()));
        }
        if self.private_key.trim().is_empty() {
            return Err(Error::Config("Private key is empty".to_string()));
        }
        if self.rpc.request_timeout_secs == 0 {
            return Err(Error::Config("RPC request timeout must be at least 1 second".to_string()));
        }
        if self.poller.channel_capacity == 0 {
            return Err(Error::Config("Channel capacity must be positive".to_string()));
        }
        if self.poller.poll_interval_ms == 0 {
            return Err(Error::Config("Poll interval must be at least 1 millisecond".to_string()));
        }
        if self.poller.consensus_poll_secs == 0 {
            return Err(Error::Config("Consensus poll interval must be at least 1 second".to_string()));
        }

        Ok(())
    }

    /// Validated pool fee
    pub fn pool_fee(&self) -> Result<PoolFee> {
        PoolFee::new(self.payout.pool_fee)
    }
}
