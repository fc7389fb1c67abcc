//! Payout Ledger Core
//!
//! Pending-payment aggregation and batched disbursement for a validator
//! reward pool.
//!
//! # Architecture
//!
//! - **Single Lock**: registration and draining share one mutex
//! - **Aggregation**: credits for the same recipient are summed in place
//! - **Drain**: the whole mapping is emptied under the lock, one transfer per
//!   recipient, issued through a [`LedgerClient`]
//!
//! # Invariants
//!
//! - At most one pending entry per recipient
//! - Pending amount == Σ(registered amounts) since the last drain that removed it
//! - Every entry present at drain start is attempted exactly once
//! - A popped credit is consumed whether or not its transfer succeeded
//!
//! # Example
//!
//! ```no_run
//! use payout_ledger::{Address, LedgerClient, PaymentLedger, PayoutMode};
//!
//! async fn pay(client: &dyn LedgerClient, sender: &Address) -> payout_ledger::Result<()> {
//!     let ledger = PaymentLedger::new();
//!     ledger.register_payment(Address::parse("NQ07 0000")?, 100).await;
//!
//!     let report = ledger.process_payments(client, sender, PayoutMode::Basic).await?;
//!     println!("{} transfers attempted, {} failed", report.attempted, report.failures.len());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod error;
pub mod client;
pub mod payments;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    Address, DrainReport, PayoutMode, PendingAmount, Quantity, SentTransfer, Transfer,
    TransferFailure, ValidityWindow,
};
pub use client::LedgerClient;
pub use payments::PaymentLedger;
pub use metrics::Metrics;
