//! Validator Payout Agent
//!
//! Splits block rewards among a validator's stakers and pays them out in
//! periodic batches.
//!
//! # Architecture
//!
//! ```text
//!   BlockPoller ──RewardEvent──▶ reward handler ──register──▶ PaymentLedger
//!                                                                  ▲
//!   PayoutDriver ── every `frequency` seconds ─────── drain ───────┘
//!        │
//!        └──▶ RpcClient (sendBasicTransaction / sendStakeTransaction)
//! ```
//!
//! 1. **Bootstrap**: wait for consensus, import and unlock the reward account
//! 2. **Poll**: turn reward inherents into reward events
//! 3. **Register**: split each reward by stake and credit the ledger
//! 4. **Drain**: periodically pay every pending credit

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod chain;
pub mod config;
pub mod driver;
pub mod error;
pub mod poller;
pub mod rewards;
pub mod rpc;

// Re-exports
pub use chain::{ChainClient, Inherent, Staker, Validator};
pub use config::Config;
pub use driver::{bootstrap, PayoutDriver, ValidatorIdentity};
pub use error::{Error, Result};
pub use poller::BlockPoller;
pub use rewards::{compute_share, run_reward_handler, PoolFee, RewardContext, RewardEvent};
pub use rpc::RpcClient;
