//! Pending payment aggregation and batched disbursement
//!
//! Credits arrive concurrently (one batch per rewarded block) and are summed
//! per recipient. A periodic drain empties the mapping and issues one
//! transfer per recipient.
//!
//! Both operations take the same lock, and the drain holds it until every
//! entry has been attempted. A registration that arrives mid-drain waits
//! and then starts a fresh accumulation; it is never folded into an
//! in-flight transfer.

use crate::{
    client::LedgerClient,
    metrics::Metrics,
    types::*,
    Error, Result,
};
use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Concurrency-safe mapping from recipient to pending amount
#[derive(Debug)]
pub struct PaymentLedger {
    /// Pending credits, guarded by the single ledger lock
    pending: Mutex<HashMap<Address, Quantity>>,

    /// Upper bound for a single transfer call
    transfer_timeout: Option<Duration>,

    /// Validity start marker for outgoing transfers
    validity: ValidityWindow,

    /// Metrics
    metrics: Metrics,
}

impl PaymentLedger {
    /// Create an empty ledger with no transfer timeout
    pub fn new() -> Self {
        Self::with_metrics(Metrics::default())
    }

    /// Create an empty ledger, surfacing metrics registration errors
    pub fn try_new() -> Result<Self> {
        Ok(Self::with_metrics(Metrics::new()?))
    }

    /// Create an empty ledger reporting into `metrics`
    pub fn with_metrics(metrics: Metrics) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            transfer_timeout: None,
            validity: ValidityWindow::default(),
            metrics,
        }
    }

    /// Bound every transfer call; a timed-out transfer counts as failed
    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = Some(timeout);
        self
    }

    /// Validity start marker used for outgoing transfers
    pub fn with_validity_window(mut self, validity: ValidityWindow) -> Self {
        self.validity = validity;
        self
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Add `amount` to the pending credit of `recipient`.
    ///
    /// A zero amount is a no-op. Waits while a drain is in progress.
    pub async fn register_payment(&self, recipient: Address, amount: Quantity) {
        if amount == 0 {
            debug!("Ignoring zero payment to '{}'", recipient);
            return;
        }

        let mut pending = self.pending.lock().await;
        let entry = pending.entry(recipient).or_insert(0);
        *entry = match entry.checked_add(amount) {
            Some(sum) => sum,
            None => {
                warn!("Pending amount overflow, saturating at {}", Quantity::MAX);
                Quantity::MAX
            }
        };
        self.metrics.record_registration(pending.len());
    }

    /// Drain every pending credit, one transfer per recipient.
    ///
    /// The sender must be unlocked; otherwise nothing is popped and
    /// [`Error::Unauthorized`] is returned. Per-transfer failures do not stop
    /// the drain and are collected in the report. A popped credit is consumed
    /// regardless of the transfer outcome.
    pub async fn process_payments<C>(
        &self,
        client: &C,
        sender: &Address,
        mode: PayoutMode,
    ) -> Result<DrainReport>
    where
        C: LedgerClient + ?Sized,
    {
        let unlocked = client
            .is_account_unlocked(sender)
            .await
            .map_err(|e| match e {
                Error::UpstreamUnavailable(_) => e,
                other => Error::UpstreamUnavailable(other.to_string()),
            })?;
        if !unlocked {
            return Err(Error::Unauthorized(sender.clone()));
        }

        let mut pending = self.pending.lock().await;
        let timer = Instant::now();
        let mut report = DrainReport::start();

        info!("Processing payments for {} recipients", pending.len());

        let recipients: Vec<Address> = pending.keys().cloned().collect();
        for recipient in recipients {
            let Some(amount) = pending.remove(&recipient) else {
                continue;
            };
            report.attempted += 1;
            info!("Sending reward of {} to address '{}'", amount, recipient);

            let transfer = Transfer {
                sender: sender.clone(),
                recipient,
                amount,
                fee: 0,
                validity: self.validity.clone(),
                mode,
            };

            match self.send(client, &transfer).await {
                Ok(tx_hash) => {
                    debug!("Transfer to '{}' accepted: {}", transfer.recipient, tx_hash);
                    self.metrics.record_transfer(true);
                    report.sent.push(SentTransfer {
                        recipient: transfer.recipient,
                        amount,
                        tx_hash,
                    });
                }
                Err(e) => {
                    warn!(
                        "Transfer of {} to '{}' failed: {}",
                        amount, transfer.recipient, e
                    );
                    self.metrics.record_transfer(false);
                    report.failures.push(TransferFailure {
                        recipient: transfer.recipient,
                        amount,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.finished_at = Utc::now();
        self.metrics.record_drain(timer.elapsed().as_secs_f64());

        info!(
            "Drain {} complete: {} attempted, {} sent, {} failed",
            report.batch_id,
            report.attempted,
            report.sent.len(),
            report.failures.len()
        );

        Ok(report)
    }

    async fn send<C>(&self, client: &C, transfer: &Transfer) -> Result<String>
    where
        C: LedgerClient + ?Sized,
    {
        match self.transfer_timeout {
            Some(limit) => tokio::time::timeout(limit, client.send_transfer(transfer))
                .await
                .map_err(|_| Error::Timeout(limit.as_secs()))?,
            None => client.send_transfer(transfer).await,
        }
    }

    /// Snapshot of all pending credits, in no particular order
    pub async fn pending(&self) -> Vec<PendingAmount> {
        self.pending
            .lock()
            .await
            .iter()
            .map(|(recipient, amount)| PendingAmount {
                recipient: recipient.clone(),
                amount: *amount,
            })
            .collect()
    }

    /// Pending credit of a single recipient
    pub async fn pending_amount(&self, recipient: &Address) -> Option<Quantity> {
        self.pending.lock().await.get(recipient).copied()
    }

    /// Sum of all pending credits
    pub async fn total_pending(&self) -> Quantity {
        self.pending
            .lock()
            .await
            .values()
            .fold(0, |acc: Quantity, amount| acc.saturating_add(*amount))
    }

    /// Number of recipients with a pending credit
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Whether nothing is pending
    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}

impl Default for PaymentLedger {
    fn default() -> Self {
        Self::new()
    }
}
