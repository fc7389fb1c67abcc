//! Ledger client interface
//!
//! The payment ledger never talks to the network itself; every transfer
//! goes through this seam.

use crate::{types::*, Result};
use async_trait::async_trait;

/// Node capability used to pay out pending credits
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Whether `address` is unlocked and may sign transactions
    async fn is_account_unlocked(&self, address: &Address) -> Result<bool>;

    /// Submit a transfer, returning the transaction hash
    async fn send_transfer(&self, transfer: &Transfer) -> Result<String>;
}
