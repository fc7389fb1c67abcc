//! Node queries used at startup and by the block poller

use async_trait::async_trait;
use payout_ledger::{Address, Quantity, Result};
use serde::{Deserialize, Serialize};

/// Validator as reported by the node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validator {
    /// Validator address
    pub address: Address,

    /// Account that receives the validator's block rewards
    pub reward_address: Address,
}

/// Staker delegating to a validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staker {
    /// Staker address
    pub address: Address,

    /// Staked balance
    pub balance: Quantity,
}

/// Inherent applied with a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inherent {
    /// Inherent kind, e.g. `reward`
    #[serde(rename = "type")]
    pub kind: String,

    /// Block the inherent belongs to
    #[serde(default)]
    pub block_number: u32,

    /// Receiving account, for rewards
    #[serde(default)]
    pub target: Option<Address>,

    /// Validator the inherent concerns
    #[serde(default)]
    pub validator_address: Option<Address>,

    /// Value, for rewards
    #[serde(default)]
    pub value: Quantity,
}

impl Inherent {
    /// Whether this is a reward paid to `reward_address`
    pub fn is_reward_for(&self, reward_address: &Address) -> bool {
        self.kind == "reward" && self.target.as_ref() == Some(reward_address)
    }
}

/// Node capability used for bootstrap and block polling
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Whether the node has reached consensus
    async fn is_consensus_established(&self) -> Result<bool>;

    /// Import a raw private key, returning its address
    async fn import_raw_key(&self, private_key: &str) -> Result<Address>;

    /// Unlock an imported account
    async fn unlock_account(&self, address: &Address) -> Result<bool>;

    /// Address of the validator run by this node
    async fn validator_address(&self) -> Result<Address>;

    /// Validator details
    async fn validator_by_address(&self, address: &Address) -> Result<Validator>;

    /// Stakers delegating to a validator
    async fn stakers_by_validator(&self, address: &Address) -> Result<Vec<Staker>>;

    /// Current head height
    async fn block_number(&self) -> Result<u32>;

    /// Inherents applied with the block at `height`
    async fn inherents_by_block_number(&self, height: u32) -> Result<Vec<Inherent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inherent_deserialize() {
        let json = r#"{
            "type": "reward",
            "blockNumber": 120,
            "target": "NQ07 REWARD",
            "validatorAddress": "NQ12 VALIDATOR",
            "value": 47500
        }"#;
        let inherent: Inherent = serde_json::from_str(json).unwrap();
        assert_eq!(inherent.block_number, 120);
        assert_eq!(inherent.value, 47500);
        assert!(inherent.is_reward_for(&Address::parse("NQ07 REWARD").unwrap()));
        assert!(!inherent.is_reward_for(&Address::parse("NQ99 OTHER").unwrap()));
    }

    #[test]
    fn test_non_reward_inherent() {
        let json = r#"{"type": "penalize", "validatorAddress": "NQ12 VALIDATOR"}"#;
        let inherent: Inherent = serde_json::from_str(json).unwrap();
        assert_eq!(inherent.value, 0);
        assert!(!inherent.is_reward_for(&Address::parse("NQ12 VALIDATOR").unwrap()));
    }
}
