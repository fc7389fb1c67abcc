//! JSON-RPC node client
//!
//! Thin HTTP transport for the node's JSON-RPC 2.0 interface. Every result is
//! wrapped by the node in a `{ "data": ..., "metadata": ... }` envelope.
//! Transport failures surface as `UpstreamUnavailable`; error objects
//! returned by the node surface as `Rpc`.

use crate::{
    chain::{ChainClient, Inherent, Staker, Validator},
    config::RpcConfig,
    Error, Result,
};
use async_trait::async_trait;
use payout_ledger::{Address, LedgerClient, PayoutMode, Transfer};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<RpcEnvelope<T>>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Node client speaking JSON-RPC over HTTP
#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    credentials: Option<(String, Option<String>)>,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client for `url`
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: url.into(),
            credentials: None,
            next_id: AtomicU64::new(1),
        })
    }

    /// Create a client from configuration
    pub fn from_config(config: &RpcConfig) -> Result<Self> {
        let client = Self::new(config.url(), Duration::from_secs(config.request_timeout_secs))?;
        Ok(match &config.username {
            Some(user) => client.with_basic_auth(user.clone(), config.password.clone()),
            None => client,
        })
    }

    /// Authenticate every request
    pub fn with_basic_auth(mut self, username: String, password: Option<String>) -> Self {
        self.credentials = Some((username, password));
        self
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> payout_ledger::Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!("RPC request {}: {}", id, body);

        let mut request = self.http.post(&self.url).json(&body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request.send().await.map_err(|e| {
            payout_ledger::Error::UpstreamUnavailable(format!("{}: {}", method, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(payout_ledger::Error::UpstreamUnavailable(format!(
                "{}: HTTP {}",
                method, status
            )));
        }

        let response: RpcResponse<T> = response.json().await.map_err(|e| {
            payout_ledger::Error::UpstreamUnavailable(format!(
                "{}: malformed response: {}",
                method, e
            ))
        })?;

        if let Some(error) = response.error {
            return Err(payout_ledger::Error::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        response.result.map(|envelope| envelope.data).ok_or_else(|| {
            payout_ledger::Error::UpstreamUnavailable(format!("{}: empty response", method))
        })
    }
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn is_account_unlocked(&self, address: &Address) -> payout_ledger::Result<bool> {
        self.call("isAccountUnlocked", json!([address])).await
    }

    async fn send_transfer(&self, transfer: &Transfer) -> payout_ledger::Result<String> {
        let method = match transfer.mode {
            PayoutMode::Basic => "sendBasicTransaction",
            PayoutMode::Stake => "sendStakeTransaction",
        };
        self.call(
            method,
            json!([
                transfer.sender,
                transfer.recipient,
                transfer.amount,
                transfer.fee,
                transfer.validity,
            ]),
        )
        .await
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn is_consensus_established(&self) -> payout_ledger::Result<bool> {
        self.call("isConsensusEstablished", json!([])).await
    }

    async fn import_raw_key(&self, private_key: &str) -> payout_ledger::Result<Address> {
        self.call("importRawKey", json!([private_key, Value::Null])).await
    }

    async fn unlock_account(&self, address: &Address) -> payout_ledger::Result<bool> {
        self.call("unlockAccount", json!([address, Value::Null, Value::Null]))
            .await
    }

    async fn validator_address(&self) -> payout_ledger::Result<Address> {
        self.call("getValidatorAddress", json!([])).await
    }

    async fn validator_by_address(&self, address: &Address) -> payout_ledger::Result<Validator> {
        self.call("getValidatorByAddress", json!([address])).await
    }

    async fn stakers_by_validator(&self, address: &Address) -> payout_ledger::Result<Vec<Staker>> {
        self.call("getStakersByValidatorAddress", json!([address]))
            .await
    }

    async fn block_number(&self) -> payout_ledger::Result<u32> {
        self.call("getBlockNumber", json!([])).await
    }

    async fn inherents_by_block_number(&self, height: u32) -> payout_ledger::Result<Vec<Inherent>> {
        self.call("getInherentsByBlockNumber", json!([height])).await
    }
}
