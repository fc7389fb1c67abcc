//! End-to-end flow against an in-memory node
//!
//! bootstrap → poll rewards → split by stake → periodic drain

use async_trait::async_trait;
use payout_agent::{
    bootstrap, run_reward_handler, BlockPoller, ChainClient, Error as AgentError, Inherent,
    PayoutDriver, PoolFee, RewardContext, Staker, Validator,
};
use payout_ledger::{
    Address, Error, LedgerClient, PaymentLedger, PayoutMode, Quantity, Result, Transfer,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

fn addr(s: &str) -> Address {
    Address::parse(s).unwrap()
}

/// In-memory node
struct MockNode {
    consensus_after: usize,
    consensus_checks: AtomicUsize,
    unlocked: AtomicBool,
    unlock_works: bool,
    head: AtomicU32,
    inherents: Mutex<HashMap<u32, Vec<Inherent>>>,
    stakers: Vec<Staker>,
    reject: Vec<Address>,
    transfers: Mutex<Vec<Transfer>>,
}

impl MockNode {
    fn new() -> Self {
        Self {
            consensus_after: 2,
            consensus_checks: AtomicUsize::new(0),
            unlocked: AtomicBool::new(false),
            unlock_works: true,
            head: AtomicU32::new(100),
            inherents: Mutex::new(HashMap::new()),
            stakers: vec![
                Staker { address: addr("NQ01 ALICE"), balance: 6_000 },
                Staker { address: addr("NQ02 BOB"), balance: 3_000 },
                Staker { address: addr("NQ07 REWARD"), balance: 1_000 },
            ],
            reject: Vec::new(),
            transfers: Mutex::new(Vec::new()),
        }
    }

    async fn produce_reward(&self, value: Quantity) {
        let height = self.head.fetch_add(1, Ordering::SeqCst) + 1;
        self.inherents.lock().await.insert(
            height,
            vec![Inherent {
                kind: "reward".to_string(),
                block_number: height,
                target: Some(addr("NQ07 REWARD")),
                validator_address: Some(addr("NQ12 VALIDATOR")),
                value,
            }],
        );
    }

    async fn paid(&self) -> HashMap<String, Quantity> {
        self.transfers
            .lock()
            .await
            .iter()
            .map(|t| (t.recipient.to_string(), t.amount))
            .collect()
    }
}

#[async_trait]
impl LedgerClient for MockNode {
    async fn is_account_unlocked(&self, _address: &Address) -> Result<bool> {
        Ok(self.unlocked.load(Ordering::SeqCst))
    }

    async fn send_transfer(&self, transfer: &Transfer) -> Result<String> {
        self.transfers.lock().await.push(transfer.clone());
        if self.reject.contains(&transfer.recipient) {
            return Err(Error::Rpc {
                code: -32000,
                message: "transaction rejected".to_string(),
            });
        }
        Ok(format!("0x{:04x}", self.transfers.lock().await.len()))
    }
}

#[async_trait]
impl ChainClient for MockNode {
    async fn is_consensus_established(&self) -> Result<bool> {
        let checks = self.consensus_checks.fetch_add(1, Ordering::SeqCst);
        Ok(checks >= self.consensus_after)
    }

    async fn import_raw_key(&self, _private_key: &str) -> Result<Address> {
        Ok(addr("NQ07 REWARD"))
    }

    async fn unlock_account(&self, _address: &Address) -> Result<bool> {
        if self.unlock_works {
            self.unlocked.store(true, Ordering::SeqCst);
        }
        Ok(self.unlock_works)
    }

    async fn validator_address(&self) -> Result<Address> {
        Ok(addr("NQ12 VALIDATOR"))
    }

    async fn validator_by_address(&self, address: &Address) -> Result<Validator> {
        Ok(Validator {
            address: address.clone(),
            reward_address: addr("NQ07 REWARD"),
        })
    }

    async fn stakers_by_validator(&self, _address: &Address) -> Result<Vec<Staker>> {
        Ok(self.stakers.clone())
    }

    async fn block_number(&self) -> Result<u32> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn inherents_by_block_number(&self, height: u32) -> Result<Vec<Inherent>> {
        Ok(self
            .inherents
            .lock()
            .await
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_waits_for_consensus_and_unlocks() {
    let node = MockNode::new();
    let identity = bootstrap(&node, "deadbeef", Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(identity.validator_address, addr("NQ12 VALIDATOR"));
    assert_eq!(identity.reward_address, addr("NQ07 REWARD"));
    assert_eq!(node.consensus_checks.load(Ordering::SeqCst), 3);
    assert!(node.unlocked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_bootstrap_fails_when_account_stays_locked() {
    let node = MockNode {
        consensus_after: 0,
        unlock_works: false,
        ..MockNode::new()
    };
    let err = bootstrap(&node, "wrong", Duration::from_millis(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Ledger(Error::Unauthorized(_))));
}

#[tokio::test]
async fn test_rewards_polled_split_and_paid() {
    let node = Arc::new(MockNode {
        consensus_after: 0,
        ..MockNode::new()
    });
    let identity = bootstrap(node.as_ref(), "deadbeef", Duration::from_millis(1))
        .await
        .unwrap();

    let ledger = Arc::new(PaymentLedger::new());
    let (tx, rx) = mpsc::channel(16);
    let ctx = RewardContext::new(
        PoolFee::new(0.1).unwrap(),
        identity.reward_address.clone(),
        ledger.clone(),
    );
    let handler = tokio::spawn(run_reward_handler(ctx, rx));

    let poller = BlockPoller::new(
        node.clone(),
        identity.validator_address.clone(),
        identity.reward_address.clone(),
        Duration::from_millis(10),
        tx,
    );

    let mut cursor = node.block_number().await.unwrap();
    node.produce_reward(10_000).await;
    node.produce_reward(20_000).await;
    poller.poll_once(&mut cursor).await.unwrap();
    drop(poller);
    handler.await.unwrap();

    // 30_000 * 0.9 split 60/30/10; the reward account's own share stays put
    assert_eq!(ledger.pending_amount(&addr("NQ01 ALICE")).await, Some(16_200));
    assert_eq!(ledger.pending_amount(&addr("NQ02 BOB")).await, Some(8_100));
    assert_eq!(ledger.pending_amount(&addr("NQ07 REWARD")).await, None);

    let driver = PayoutDriver::new(
        node.clone(),
        ledger.clone(),
        identity.reward_address.clone(),
        PayoutMode::Stake,
        Duration::from_secs(60),
    );
    let report = driver.drain_once().await.unwrap();
    assert_eq!(report.attempted, 2);
    assert!(report.is_clean());
    assert!(ledger.is_empty().await);

    let paid = node.paid().await;
    assert_eq!(paid.get("NQ01 ALICE"), Some(&16_200));
    assert_eq!(paid.get("NQ02 BOB"), Some(&8_100));
    assert!(node
        .transfers
        .lock()
        .await
        .iter()
        .all(|t| t.mode == PayoutMode::Stake && t.sender == addr("NQ07 REWARD")));
}

#[tokio::test]
async fn test_drain_once_reports_rejections() {
    let node = Arc::new(MockNode {
        reject: vec![addr("NQ02 BOB")],
        ..MockNode::new()
    });
    node.unlocked.store(true, Ordering::SeqCst);

    let ledger = Arc::new(PaymentLedger::new());
    ledger.register_payment(addr("NQ01 ALICE"), 10).await;
    ledger.register_payment(addr("NQ02 BOB"), 20).await;

    let driver = PayoutDriver::new(
        node.clone(),
        ledger.clone(),
        addr("NQ07 REWARD"),
        PayoutMode::Basic,
        Duration::from_secs(60),
    );
    let report = driver.drain_once().await.unwrap();

    assert_eq!(report.sent.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].recipient, addr("NQ02 BOB"));
    assert!(ledger.is_empty().await);
}

#[tokio::test]
async fn test_drain_once_aborts_when_locked() {
    let node = Arc::new(MockNode::new());
    let ledger = Arc::new(PaymentLedger::new());
    ledger.register_payment(addr("NQ01 ALICE"), 10).await;

    let driver = PayoutDriver::new(
        node.clone(),
        ledger.clone(),
        addr("NQ07 REWARD"),
        PayoutMode::Basic,
        Duration::from_secs(60),
    );

    assert!(driver.drain_once().await.is_none());
    assert!(node.transfers.lock().await.is_empty());
    assert_eq!(ledger.pending_amount(&addr("NQ01 ALICE")).await, Some(10));
}

#[tokio::test(start_paused = true)]
async fn test_driver_drains_on_schedule_and_on_shutdown() {
    let node = Arc::new(MockNode::new());
    node.unlocked.store(true, Ordering::SeqCst);

    let ledger = Arc::new(PaymentLedger::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = PayoutDriver::new(
        node.clone(),
        ledger.clone(),
        addr("NQ07 REWARD"),
        PayoutMode::Basic,
        Duration::from_secs(60),
    )
    .with_drain_on_shutdown(true);
    let task = tokio::spawn(driver.run(shutdown_rx));

    ledger.register_payment(addr("NQ01 ALICE"), 10).await;

    // Nothing is paid before the first interval elapses
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(node.transfers.lock().await.is_empty());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(node.transfers.lock().await.len(), 1);
    assert!(ledger.is_empty().await);

    // Registered after the drain: paid by the shutdown drain
    ledger.register_payment(addr("NQ01 ALICE"), 5).await;
    shutdown_tx.send(true).unwrap();
    task.await.unwrap();

    let transfers = node.transfers.lock().await;
    assert_eq!(transfers.len(), 2);
    assert_eq!(transfers[1].amount, 5);
}
