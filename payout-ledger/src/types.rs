//! Core types for the payout ledger
//!
//! Amounts are integers in the chain's smallest unit and are never stored
//! as floating point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Amount in the smallest indivisible unit (Luna)
pub type Quantity = u64;

/// Account address (recipient, sender or validator)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse an address, rejecting empty input
    pub fn parse(raw: impl AsRef<str>) -> crate::Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidAddress("address is empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Transaction kind used to pay out rewards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMode {
    /// Plain value transfer
    #[default]
    Basic,
    /// Deposit into the recipient's stake
    Stake,
}

impl fmt::Display for PayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayoutMode::Basic => write!(f, "basic"),
            PayoutMode::Stake => write!(f, "stake"),
        }
    }
}

/// Validity start marker, passed through to the node untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidityWindow(String);

impl ValidityWindow {
    /// Create a validity window marker
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ValidityWindow {
    /// Relative to the current head
    fn default() -> Self {
        Self("+0".to_string())
    }
}

/// Pending credit for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAmount {
    /// Recipient
    pub recipient: Address,

    /// Accumulated amount
    pub amount: Quantity,
}

/// A single outgoing transfer instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Paying account
    pub sender: Address,

    /// Receiving account
    pub recipient: Address,

    /// Value to send
    pub amount: Quantity,

    /// Transaction fee, zero for payouts
    pub fee: Quantity,

    /// Validity start marker
    pub validity: ValidityWindow,

    /// Transfer kind
    pub mode: PayoutMode,
}

/// Transfer that the node accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentTransfer {
    /// Recipient
    pub recipient: Address,

    /// Amount sent
    pub amount: Quantity,

    /// Transaction hash returned by the node
    pub tx_hash: String,
}

/// Transfer that failed; the credit is not restored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFailure {
    /// Recipient
    pub recipient: Address,

    /// Amount that was not sent
    pub amount: Quantity,

    /// Failure description
    pub error: String,
}

/// Outcome of one drain cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainReport {
    /// Batch ID
    pub batch_id: Uuid,

    /// Lock acquired
    pub started_at: DateTime<Utc>,

    /// Lock released
    pub finished_at: DateTime<Utc>,

    /// Number of transfers attempted
    pub attempted: usize,

    /// Accepted transfers
    pub sent: Vec<SentTransfer>,

    /// Failed transfers
    pub failures: Vec<TransferFailure>,
}

impl DrainReport {
    pub(crate) fn start() -> Self {
        Self {
            batch_id: Uuid::now_v7(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            attempted: 0,
            sent: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Total value of accepted transfers
    pub fn total_sent(&self) -> Quantity {
        self.sent
            .iter()
            .fold(0, |acc: Quantity, t| acc.saturating_add(t.amount))
    }

    /// Whether every attempted transfer was accepted
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
