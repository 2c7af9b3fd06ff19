use serde::{Deserialize, Serialize};

use crate::types::{AccountId, AssetId, Balance, LockId, Seconds, Timestamp};

// ── Operation ────────────────────────────────────────────────────────────────

/// Every state-changing request the ledger accepts is one of these variants.
/// The caller is carried alongside, never inside.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    // ── Locks ────────────────────────────────────────────────────────────────

    /// Escrow `amount` of the deposit asset for `duration` seconds.
    CreateLock { amount: Balance, duration: Seconds },

    /// Re-lock for `remaining + extra_duration`; the old id is burned.
    ExtendLock { lock_id: LockId, extra_duration: Seconds },

    /// Combine two locks into one holding their summed amount and power.
    MergeLocks { first: LockId, second: LockId },

    /// Return an expired lock's deposit to its owner.
    Withdraw { lock_id: LockId },

    /// Hand custody of an unstaked lock to another account.
    TransferLock { lock_id: LockId, to: AccountId },

    // ── Staking ──────────────────────────────────────────────────────────────

    Stake { lock_id: LockId },
    Unstake { lock_id: LockId },

    // ── Rewards ──────────────────────────────────────────────────────────────

    ClaimRewards { token: AssetId },
    ClaimAllRewards,

    /// Admin only.
    AddRewardToken { token: AssetId, rate: Balance },

    /// Fund an existing reward token from the caller's balance.
    AddRewards { token: AssetId, amount: Balance },

    /// Admin only. Accrual up to now uses the old rate.
    SetRewardRate { token: AssetId, rate: Balance },

    /// Settle accumulators and re-anchor the staked aggregate at now.
    UpdateGlobalVePower,
}

impl Operation {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateLock { .. } => "create_lock",
            Operation::ExtendLock { .. } => "extend_lock",
            Operation::MergeLocks { .. } => "merge_locks",
            Operation::Withdraw { .. } => "withdraw",
            Operation::TransferLock { .. } => "transfer_lock",
            Operation::Stake { .. } => "stake",
            Operation::Unstake { .. } => "unstake",
            Operation::ClaimRewards { .. } => "claim_rewards",
            Operation::ClaimAllRewards => "claim_all_rewards",
            Operation::AddRewardToken { .. } => "add_reward_token",
            Operation::AddRewards { .. } => "add_rewards",
            Operation::SetRewardRate { .. } => "set_reward_rate",
            Operation::UpdateGlobalVePower => "update_global_ve_power",
        }
    }
}

// ── Outcome ──────────────────────────────────────────────────────────────────

/// What a committed operation produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    LockCreated(LockId),
    LockReplaced { burned: Vec<LockId>, minted: LockId },
    Withdrawn { lock_id: LockId, amount: Balance },
    Transferred { lock_id: LockId, to: AccountId },
    Staked(LockId),
    Unstaked(LockId),
    Claimed(Vec<(AssetId, Balance)>),
    RewardsUpdated,
    Checkpointed { total_power: Balance },
}

// ── OpRecord ─────────────────────────────────────────────────────────────────

/// An entry of the append-only operation log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpRecord {
    pub seq: u64,
    pub at: Timestamp,
    pub caller: AccountId,
    pub op: Operation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape_is_stable() {
        let op = Operation::CreateLock { amount: 10u128.pow(20), duration: 86_400 };
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, r#"{"create_lock":{"amount":100000000000000000000,"duration":86400}}"#);
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);

        let unit: Operation = serde_json::from_str(r#""claim_all_rewards""#).unwrap();
        assert_eq!(unit, Operation::ClaimAllRewards);
    }

    #[test]
    fn accounts_serialize_as_b58() {
        let to = AccountId::from_label("bob");
        let op = Operation::TransferLock { lock_id: LockId(3), to: to.clone() };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["transfer_lock"]["to"], serde_json::Value::String(to.to_b58()));
    }

    #[test]
    fn record_survives_bincode() {
        let rec = OpRecord {
            seq: 9,
            at: 1_700_000_000,
            caller: AccountId::from_label("alice"),
            op: Operation::Stake { lock_id: LockId(4) },
        };
        let bytes = bincode::serialize(&rec).unwrap();
        let back: OpRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, rec);
    }
}
