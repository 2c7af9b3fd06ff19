//! Time-based views: when an owner's deposits unlock, and how long each
//! reward token can keep emitting at its current rate.
//!
//! Runway:  unallocated / rate   seconds, where unallocated is the funded
//! balance not yet credited to any staker. Emission stops (it does not go
//! negative) once that reaches zero.

use serde::{Deserialize, Serialize};

use venft_core::error::VenftError;
use venft_core::types::{AccountId, AssetId, Balance, LockId, Seconds, Timestamp};
use venft_state::{AssetLedger, Clock, StateEngine};

/// One lock's scheduled unlock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unlock {
    pub lock_id: LockId,
    pub unlock_at: Timestamp,
    pub amount: Balance,
    /// Deposit of this and every earlier unlock in the schedule.
    pub cumulative: Balance,
    pub staked: bool,
}

/// Every lock `owner` holds, in unlock order (ties by id).
pub fn unlock_schedule<A: AssetLedger, C: Clock>(engine: &StateEngine<A, C>, owner: &AccountId) -> Vec<Unlock> {
    let mut locks = engine.get_all_user_nfts(owner);
    locks.sort_by_key(|(id, lock, _)| (lock.end_time, *id));

    let mut cumulative: Balance = 0;
    locks
        .into_iter()
        .map(|(id, lock, _)| {
            cumulative = cumulative.saturating_add(lock.amount);
            Unlock {
                lock_id: id,
                unlock_at: lock.end_time,
                amount: lock.amount,
                cumulative,
                staked: engine.staker_of(id).is_some(),
            }
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRunway {
    pub token: AssetId,
    pub rate: Balance,
    pub unallocated: Balance,
    /// Seconds of emission left at `rate`; `None` when the rate is zero.
    pub runway: Option<Seconds>,
    /// `now + runway`.
    pub exhausted_at: Option<Timestamp>,
}

pub fn reward_runway<A: AssetLedger, C: Clock>(
    engine: &StateEngine<A, C>,
    token: &AssetId,
) -> Result<RewardRunway, VenftError> {
    let info = engine.get_reward_token_info(token)?;
    let unallocated = info.unallocated();
    let runway = (info.rate > 0).then(|| {
        let secs = unallocated / info.rate;
        Seconds::try_from(secs).unwrap_or(Seconds::MAX)
    });
    Ok(RewardRunway {
        token: token.clone(),
        rate: info.rate,
        unallocated,
        runway,
        exhausted_at: runway.map(|r| engine.now().saturating_add(r)),
    })
}
