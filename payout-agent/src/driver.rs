//! Startup bootstrap and the periodic payout driver

use crate::{chain::ChainClient, Result};
use payout_ledger::{Address, DrainReport, LedgerClient, PaymentLedger, PayoutMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Accounts the agent runs for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorIdentity {
    /// Validator address
    pub validator_address: Address,

    /// Reward account; receives block rewards and pays stakers
    pub reward_address: Address,
}

/// Wait for consensus, import the reward key and unlock the reward account.
///
/// Fails with `Unauthorized` when the account is still locked afterwards,
/// which usually means the wrong private key was supplied.
pub async fn bootstrap<C>(
    client: &C,
    private_key: &str,
    consensus_poll: Duration,
) -> Result<ValidatorIdentity>
where
    C: ChainClient + LedgerClient + ?Sized,
{
    loop {
        match client.is_consensus_established().await {
            Ok(true) => break,
            Ok(false) => info!("Consensus: false"),
            Err(e) => warn!("Failed to query consensus state: {}", e),
        }
        tokio::time::sleep(consensus_poll).await;
    }
    info!("Consensus: true");

    let imported = client.import_raw_key(private_key).await?;
    info!("Imported key for '{}'", imported);

    let validator_address = client.validator_address().await?;
    let validator = client.validator_by_address(&validator_address).await?;
    let reward_address = validator.reward_address;
    info!(
        "Running for validator '{}' with reward address '{}'",
        validator_address, reward_address
    );

    client.unlock_account(&reward_address).await?;
    if !client.is_account_unlocked(&reward_address).await? {
        error!(
            "Couldn't unlock validator reward address '{}', perhaps an incorrect private key was specified?",
            reward_address
        );
        return Err(payout_ledger::Error::Unauthorized(reward_address).into());
    }

    Ok(ValidatorIdentity {
        validator_address,
        reward_address,
    })
}

/// Drains the payment ledger at a fixed cadence
pub struct PayoutDriver<C: ?Sized> {
    client: Arc<C>,
    ledger: Arc<PaymentLedger>,
    sender: Address,
    mode: PayoutMode,
    frequency: Duration,
    drain_on_shutdown: bool,
}

impl<C: LedgerClient + ?Sized> PayoutDriver<C> {
    /// Create driver
    pub fn new(
        client: Arc<C>,
        ledger: Arc<PaymentLedger>,
        sender: Address,
        mode: PayoutMode,
        frequency: Duration,
    ) -> Self {
        Self {
            client,
            ledger,
            sender,
            mode,
            frequency,
            drain_on_shutdown: false,
        }
    }

    /// Run one last drain when shutdown is signalled
    pub fn with_drain_on_shutdown(mut self, enabled: bool) -> Self {
        self.drain_on_shutdown = enabled;
        self
    }

    /// Drain every `frequency` until shutdown is signalled
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Payout driver started: {} payouts every {:?}",
            self.mode, self.frequency
        );

        let mut ticker = interval(self.frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.drain_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if self.drain_on_shutdown && !self.ledger.is_empty().await {
            info!("Shutting down, paying out remaining credits");
            self.drain_once().await;
        }

        info!("Payout driver stopped");
    }

    /// Run one drain cycle, logging its outcome.
    ///
    /// Returns `None` when the cycle was aborted before any transfer.
    pub async fn drain_once(&self) -> Option<DrainReport> {
        match self
            .ledger
            .process_payments(self.client.as_ref(), &self.sender, self.mode)
            .await
        {
            Ok(report) => {
                for failure in &report.failures {
                    warn!(
                        "Reward of {} to '{}' was not paid: {}",
                        failure.amount, failure.recipient, failure.error
                    );
                }
                Some(report)
            }
            Err(e @ payout_ledger::Error::Unauthorized(_)) => {
                error!("Payout cycle aborted: {}", e);
                None
            }
            Err(e) => {
                warn!("Payout cycle skipped: {}", e);
                None
            }
        }
    }
}

impl<C: ?Sized> std::fmt::Debug for PayoutDriver<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayoutDriver")
            .field("sender", &self.sender)
            .field("mode", &self.mode)
            .field("frequency", &self.frequency)
            .field("drain_on_shutdown", &self.drain_on_shutdown)
            .finish()
    }
}
