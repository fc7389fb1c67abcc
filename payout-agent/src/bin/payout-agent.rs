//! Validator payout agent binary

use anyhow::Context;
use clap::Parser;
use payout_agent::{
    bootstrap, run_reward_handler, BlockPoller, Config, PayoutDriver, RewardContext, RpcClient,
};
use payout_ledger::{PaymentLedger, PayoutMode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Pays validator rewards out to stakers
#[derive(Debug, Parser)]
#[command(name = "payout-agent", version, about)]
struct Cli {
    /// TOML config file; flags override its values
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// RPC host for the node connection
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// RPC port for the node connection
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Private key of the validator reward account
    #[arg(short = 'k', long, env = "PAYOUT_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Pool fee to apply when sending rewards to stakers, between 0 and 1
    #[arg(short = 'p', long)]
    pool_fee: Option<f64>,

    /// Use staking transactions instead of basic transactions for payouts
    #[arg(short = 's', long)]
    stake_transactions: bool,

    /// Payments frequency in seconds
    #[arg(short = 'f', long)]
    frequency: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::default(),
        };
        config.apply_env()?;

        if let Some(host) = &self.host {
            config.rpc.host = host.clone();
        }
        if let Some(port) = self.port {
            config.rpc.port = port;
        }
        if let Some(key) = &self.private_key {
            config.private_key = key.clone();
        }
        if let Some(fee) = self.pool_fee {
            config.payout.pool_fee = fee;
        }
        if self.stake_transactions {
            config.payout.mode = PayoutMode::Stake;
        }
        if let Some(frequency) = self.frequency {
            config.payout.frequency_secs = frequency;
        }

        config.validate()?;
        Ok(config)
    }

    fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(cli.log_level().into()),
        )
        .init();

    let config = cli.load_config()?;
    let client = Arc::new(RpcClient::from_config(&config.rpc)?);
    tracing::info!("Starting payout agent against {}", client.url());

    let identity = bootstrap(
        client.as_ref(),
        &config.private_key,
        Duration::from_secs(config.poller.consensus_poll_secs),
    )
    .await?;

    let mut ledger =
        PaymentLedger::try_new()?.with_validity_window(config.payout.validity_window.clone());
    if let Some(timeout) = config.payout.transfer_timeout() {
        ledger = ledger.with_transfer_timeout(timeout);
    }
    let ledger = Arc::new(ledger);

    let (poller_shutdown, poller_shutdown_rx) = watch::channel(false);
    let (driver_shutdown, driver_shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::channel(config.poller.channel_capacity);

    let ctx = RewardContext::new(
        config.pool_fee()?,
        identity.reward_address.clone(),
        ledger.clone(),
    );
    let handler = tokio::spawn(run_reward_handler(ctx, events_rx));

    let poller = BlockPoller::new(
        client.clone(),
        identity.validator_address.clone(),
        identity.reward_address.clone(),
        Duration::from_millis(config.poller.poll_interval_ms),
        events_tx,
    );
    let mut poller = tokio::spawn(poller.run(poller_shutdown_rx));

    let driver = PayoutDriver::new(
        client.clone(),
        ledger.clone(),
        identity.reward_address.clone(),
        config.payout.mode,
        config.payout.frequency(),
    )
    .with_drain_on_shutdown(config.payout.drain_on_shutdown);
    let driver = tokio::spawn(driver.run(driver_shutdown_rx));

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            None
        }
        result = &mut poller => Some(result),
    };
    let poller_result = match finished {
        Some(result) => result,
        None => {
            tracing::info!("Shutting down payout agent");
            let _ = poller_shutdown.send(true);
            poller.await
        }
    };
    let poller_result: anyhow::Result<()> = match poller_result {
        Ok(result) => result.map_err(Into::into),
        Err(e) => Err(e.into()),
    };
    // Poller dropped the event sender; let the handler register its backlog
    // before the driver runs its final drain
    handler.await?;
    let _ = driver_shutdown.send(true);
    driver.await?;

    tracing::debug!("Final metrics:\n{}", ledger.metrics().encode());
    poller_result.context("Block poller failed")
}
