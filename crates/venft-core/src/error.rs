use thiserror::Error;

use crate::types::{AccountId, AssetId, Balance, LockId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VenftError {
    // ── Lock errors ──────────────────────────────────────────────────────────
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("invalid lock duration: {duration} seconds (must be 1..={max})")]
    InvalidDuration { duration: u64, max: u64 },

    #[error("{caller} does not own {lock_id}")]
    NotOwner { lock_id: LockId, caller: AccountId },

    #[error("lock not found: {0}")]
    LockNotFound(LockId),

    #[error("lock period not ended (unlocks at {end_time})")]
    LockNotExpired { end_time: Timestamp },

    #[error("{0} has expired")]
    LockExpired(LockId),

    #[error("cannot merge {0} with itself")]
    InvalidMerge(LockId),

    // ── Staking errors ───────────────────────────────────────────────────────
    #[error("{0} is staked; unstake it first")]
    LockStaked(LockId),

    #[error("{0} is already staked")]
    AlreadyStaked(LockId),

    #[error("{caller} is not the staker of {lock_id}")]
    NotStaker { lock_id: LockId, caller: AccountId },

    // ── Reward errors ────────────────────────────────────────────────────────
    #[error("reward token already registered: {0}")]
    AlreadyRegistered(AssetId),

    #[error("unknown reward token: {0}")]
    UnknownRewardToken(AssetId),

    #[error("insufficient reward balance for {token}: need {need}, have {have}")]
    InsufficientRewardBalance { token: AssetId, need: Balance, have: Balance },

    // ── Auth / collaborators ─────────────────────────────────────────────────
    #[error("{0} is not authorized for this operation")]
    Unauthorized(AccountId),

    #[error("insufficient {asset} balance: need {need}, have {have}")]
    InsufficientBalance { asset: AssetId, need: Balance, have: Balance },

    #[error("clock moved backwards: {now} < {last}")]
    ClockRegression { now: Timestamp, last: Timestamp },

    #[error("invalid account id: {0}")]
    InvalidAccountId(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}
