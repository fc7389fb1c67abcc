//! Reward share computation and the reward event handler
//!
//! Every reward paid to the validator's reward account is split among its
//! stakers in proportion to their stake, minus the pool fee. The split is
//! computed in floating point and truncated before it reaches the ledger.

use crate::{chain::Staker, Error, Result};
use payout_ledger::{Address, PaymentLedger, Quantity};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Fraction of every reward kept by the pool operator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolFee(f64);

impl PoolFee {
    /// Create a pool fee, rejecting values outside [0, 1]
    pub fn new(fee: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&fee) {
            return Err(Error::InvalidPoolFee(fee));
        }
        Ok(Self(fee))
    }

    /// Fee as a fraction
    pub fn value(&self) -> f64 {
        self.0
    }
}

/// A reward paid to the validator, with the stakers entitled to it
#[derive(Debug, Clone, PartialEq)]
pub struct RewardEvent {
    /// Block that carried the reward
    pub block_number: u32,

    /// Total reward amount
    pub reward: Quantity,

    /// Stakers at the time of the reward
    pub stakers: Vec<Staker>,
}

/// `floor(stake / total * reward * (1 - fee))`, or 0 when nothing is staked
pub fn compute_share(stake: Quantity, total_stake: Quantity, reward: Quantity, fee: PoolFee) -> Quantity {
    if total_stake == 0 {
        return 0;
    }
    let share = stake as f64 / total_stake as f64 * reward as f64 * (1.0 - fee.value());
    // `as` saturates and maps NaN to 0
    share as Quantity
}

/// Per-subscription context, built once at startup
#[derive(Debug, Clone)]
pub struct RewardContext {
    /// Pool fee
    pub pool_fee: PoolFee,

    /// Reward account; it pays, so it is never credited
    pub reward_address: Address,

    /// Pending payment ledger
    pub payments: Arc<PaymentLedger>,
}

impl RewardContext {
    /// Create context
    pub fn new(pool_fee: PoolFee, reward_address: Address, payments: Arc<PaymentLedger>) -> Self {
        Self {
            pool_fee,
            reward_address,
            payments,
        }
    }

    /// Split one reward among the stakers and register every non-zero share.
    ///
    /// Returns the number of payments registered.
    pub async fn on_reward_event(&self, event: &RewardEvent) -> usize {
        info!("Running for block {}", event.block_number);

        let total_stake = event
            .stakers
            .iter()
            .fold(0, |acc: Quantity, s| acc.saturating_add(s.balance));
        if total_stake == 0 {
            warn!(
                "Block {}: validator has no stake, reward of {} not distributed",
                event.block_number, event.reward
            );
            return 0;
        }

        let mut registered = 0;
        for staker in &event.stakers {
            let amount = compute_share(staker.balance, total_stake, event.reward, self.pool_fee);
            if amount == 0 || staker.address == self.reward_address {
                continue;
            }

            debug!(
                "Registering payment to '{}' for an amount of {}",
                staker.address, amount
            );
            self.payments
                .register_payment(staker.address.clone(), amount)
                .await;
            registered += 1;
        }

        registered
    }
}

/// Feed every received event to the context until the channel closes
pub async fn run_reward_handler(ctx: RewardContext, mut events: mpsc::Receiver<RewardEvent>) {
    info!("Reward handler started for '{}'", ctx.reward_address);

    while let Some(event) = events.recv().await {
        let registered = ctx.on_reward_event(&event).await;
        debug!(
            "Block {}: registered {} payments",
            event.block_number, registered
        );
    }

    info!("Reward event channel closed, handler stopping");
}
