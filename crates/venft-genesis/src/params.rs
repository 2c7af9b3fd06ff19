use serde::{Deserialize, Serialize};

use venft_core::constants::DEFAULT_DEPOSIT_ASSET;
use venft_core::types::{AssetId, Balance, Timestamp};

/// The genesis document.
///
/// Accounts are named by label; the ledger derives their ids with
/// `AccountId::from_label`, so the same label in an operation log refers to
/// the same account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisParams {
    /// Label of the account allowed to register and fund reward tokens.
    pub admin: String,
    /// Asset accepted as lock deposits.
    #[serde(default = "default_deposit_asset")]
    pub deposit_asset: AssetId,
    /// Ledger clock at genesis. When absent the node starts from wall time.
    #[serde(default)]
    pub start_time: Option<Timestamp>,
    /// Opening asset balances.
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,
    /// Reward tokens registered and funded by the admin at genesis.
    #[serde(default)]
    pub reward_tokens: Vec<GenesisRewardToken>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub account: String,
    pub asset: AssetId,
    pub amount: Balance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisRewardToken {
    pub token: AssetId,
    /// Emission per second.
    pub rate: Balance,
    /// Minted to the admin and deposited with `add_rewards`. Zero skips the deposit.
    #[serde(default)]
    pub funding: Balance,
}

impl GenesisParams {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn default_deposit_asset() -> AssetId {
    AssetId::new(DEFAULT_DEPOSIT_ASSET)
}
