//! Block poller
//!
//! Watches the chain head and turns every reward paid to the validator's
//! reward account into a [`RewardEvent`]. Heights are processed in order,
//! starting after the head observed at startup. A block whose queries fail
//! is retried on the next poll.

use crate::{
    chain::ChainClient,
    rewards::RewardEvent,
    Error, Result,
};
use payout_ledger::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Polls the node for reward inherents
pub struct BlockPoller<C: ?Sized> {
    client: Arc<C>,
    validator_address: Address,
    reward_address: Address,
    poll_interval: Duration,
    events: mpsc::Sender<RewardEvent>,
}

impl<C: ChainClient + ?Sized> BlockPoller<C> {
    /// Create poller
    pub fn new(
        client: Arc<C>,
        validator_address: Address,
        reward_address: Address,
        poll_interval: Duration,
        events: mpsc::Sender<RewardEvent>,
    ) -> Self {
        Self {
            client,
            validator_address,
            reward_address,
            poll_interval,
            events,
        }
    }

    /// Poll until shutdown is signalled or the event channel closes.
    ///
    /// The starting height is resolved on the first successful tick; until
    /// then the head query is retried every interval.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cursor: Option<u32> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(mut height) = cursor else {
                        match self.client.block_number().await {
                            Ok(head) => {
                                info!("Block poller starting at height {}", head);
                                cursor = Some(head);
                            }
                            Err(e) => warn!("Failed to query chain head: {}", e),
                        }
                        continue;
                    };
                    let polled = self.poll_once(&mut height).await;
                    cursor = Some(height);
                    match polled {
                        Ok(()) => {}
                        Err(e @ Error::ChannelClosed(_)) => return Err(e),
                        Err(e) => warn!("Block poll failed at height {}: {}", height + 1, e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        match cursor {
            Some(height) => info!("Block poller stopped at height {}", height),
            None => info!("Block poller stopped before reaching the chain"),
        }
        Ok(())
    }

    /// Process every block after `cursor` up to the current head.
    ///
    /// `cursor` advances past each block once its events are emitted.
    pub async fn poll_once(&self, cursor: &mut u32) -> Result<()> {
        let head = self.client.block_number().await?;
        while *cursor < head {
            let height = *cursor + 1;
            self.process_block(height).await?;
            *cursor = height;
        }
        Ok(())
    }

    async fn process_block(&self, height: u32) -> Result<()> {
        let inherents = self.client.inherents_by_block_number(height).await?;
        let rewards: Vec<_> = inherents
            .into_iter()
            .filter(|i| i.is_reward_for(&self.reward_address))
            .collect();

        if rewards.is_empty() {
            return Ok(());
        }
        debug!("Block {}: {} reward inherents", height, rewards.len());

        let stakers = self
            .client
            .stakers_by_validator(&self.validator_address)
            .await?;

        for reward in rewards {
            let event = RewardEvent {
                block_number: height,
                reward: reward.value,
                stakers: stakers.clone(),
            };
            self.events
                .send(event)
                .await
                .map_err(|_| Error::ChannelClosed("reward events".to_string()))?;
        }

        Ok(())
    }
}

impl<C: ?Sized> std::fmt::Debug for BlockPoller<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockPoller")
            .field("validator_address", &self.validator_address)
            .field("reward_address", &self.reward_address)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Inherent, Staker, Validator};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct MockChain {
        head: AtomicU32,
        inherents: HashMap<u32, Vec<Inherent>>,
        stakers: Vec<Staker>,
        fail_next: AtomicBool,
        fail_head: AtomicU32,
    }

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn reward(height: u32, target: &str, value: u64) -> Inherent {
        Inherent {
            kind: "reward".to_string(),
            block_number: height,
            target: Some(addr(target)),
            validator_address: Some(addr("VALIDATOR")),
            value,
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn is_consensus_established(&self) -> payout_ledger::Result<bool> {
            Ok(true)
        }

        async fn import_raw_key(&self, _private_key: &str) -> payout_ledger::Result<Address> {
            Ok(addr("REWARD"))
        }

        async fn unlock_account(&self, _address: &Address) -> payout_ledger::Result<bool> {
            Ok(true)
        }

        async fn validator_address(&self) -> payout_ledger::Result<Address> {
            Ok(addr("VALIDATOR"))
        }

        async fn validator_by_address(&self, address: &Address) -> payout_ledger::Result<Validator> {
            Ok(Validator {
                address: address.clone(),
                reward_address: addr("REWARD"),
            })
        }

        async fn stakers_by_validator(&self, _address: &Address) -> payout_ledger::Result<Vec<Staker>> {
            Ok(self.stakers.clone())
        }

        async fn block_number(&self) -> payout_ledger::Result<u32> {
            let failing = self
                .fail_head
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(payout_ledger::Error::UpstreamUnavailable("blip".to_string()));
            }
            Ok(self.head.load(Ordering::SeqCst))
        }

        async fn inherents_by_block_number(&self, height: u32) -> payout_ledger::Result<Vec<Inherent>> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(payout_ledger::Error::UpstreamUnavailable("timeout".to_string()));
            }
            Ok(self.inherents.get(&height).cloned().unwrap_or_default())
        }
    }

    fn chain() -> Arc<MockChain> {
        let mut inherents = HashMap::new();
        inherents.insert(2, vec![reward(2, "REWARD", 1000)]);
        inherents.insert(3, vec![reward(3, "SOMEONE_ELSE", 1000)]);
        inherents.insert(4, vec![reward(4, "REWARD", 10), reward(4, "REWARD", 20)]);
        inherents.insert(5, vec![reward(5, "REWARD", 500)]);

        Arc::new(MockChain {
            head: AtomicU32::new(4),
            inherents,
            stakers: vec![Staker {
                address: addr("A"),
                balance: 100,
            }],
            fail_next: AtomicBool::new(false),
            fail_head: AtomicU32::new(0),
        })
    }

    fn poller(chain: Arc<MockChain>) -> (BlockPoller<MockChain>, mpsc::Receiver<RewardEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let poller = BlockPoller::new(
            chain,
            addr("VALIDATOR"),
            addr("REWARD"),
            Duration::from_millis(10),
            tx,
        );
        (poller, rx)
    }

    #[tokio::test]
    async fn test_poll_once_emits_rewards_for_reward_address() {
        let (poller, mut rx) = poller(chain());
        let mut cursor = 0;
        poller.poll_once(&mut cursor).await.unwrap();
        assert_eq!(cursor, 4);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push((event.block_number, event.reward));
        }
        assert_eq!(events, vec![(2, 1000), (4, 10), (4, 20)]);
    }

    #[tokio::test]
    async fn test_poll_failure_keeps_cursor() {
        let chain = chain();
        chain.fail_next.store(true, Ordering::SeqCst);
        let (poller, mut rx) = poller(chain.clone());

        let mut cursor = 1;
        assert!(poller.poll_once(&mut cursor).await.is_err());
        assert_eq!(cursor, 1);
        assert!(rx.try_recv().is_err());

        // Retried on the next poll
        poller.poll_once(&mut cursor).await.unwrap();
        assert_eq!(cursor, 4);
        assert_eq!(rx.try_recv().unwrap().block_number, 2);
    }

    #[tokio::test]
    async fn test_closed_channel_is_fatal() {
        let (poller, rx) = poller(chain());
        drop(rx);

        let mut cursor = 1;
        let err = poller.poll_once(&mut cursor).await.unwrap_err();
        assert!(matches!(err, Error::ChannelClosed(_)));
    }

    #[tokio::test]
    async fn test_run_starts_at_head_and_stops_on_shutdown() {
        let chain = chain();
        let (poller, mut rx) = poller(chain.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(poller.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Blocks before startup are not replayed
        assert!(rx.try_recv().is_err());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_initial_head_query() {
        let chain = chain();
        chain.fail_head.store(2, Ordering::SeqCst);
        let (poller, mut rx) = poller(chain.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(poller.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        assert_eq!(chain.fail_head.load(Ordering::SeqCst), 0);

        // Polling started at height 4 despite the failed head queries
        chain.head.store(5, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let event = rx.try_recv().unwrap();
        assert_eq!((event.block_number, event.reward), (5, 500));
        assert!(rx.try_recv().is_err());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
