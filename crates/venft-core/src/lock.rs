use serde::{Deserialize, Serialize};

use crate::aggregate::PowerLine;
use crate::decay::ve_power;
use crate::types::{AccountId, Balance, LockId, Seconds, Timestamp};

/// One escrowed deposit.
///
/// Extending or merging never edits a lock in place: the old id is burned and
/// a fresh lock with a new `start_time` is minted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub id: LockId,
    pub owner: AccountId,
    /// Deposit in base units of the deposit asset. Always > 0.
    pub amount: Balance,
    pub start_time: Timestamp,
    /// Requested duration, `1..=MAX_LOCK_DURATION`.
    pub lock_duration: Seconds,
    /// `start_time + lock_duration`.
    pub end_time: Timestamp,
}

impl Lock {
    pub fn new(
        id: LockId,
        owner: AccountId,
        amount: Balance,
        start_time: Timestamp,
        lock_duration: Seconds,
    ) -> Self {
        Self {
            id,
            owner,
            amount,
            start_time,
            lock_duration,
            end_time: start_time + lock_duration,
        }
    }

    /// Voting power at `now`; zero at and after `end_time`.
    pub fn power_at(&self, now: Timestamp) -> Balance {
        ve_power(self.amount, self.lock_duration, now.saturating_sub(self.start_time))
    }

    pub fn remaining_at(&self, now: Timestamp) -> Seconds {
        self.end_time.saturating_sub(now)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.end_time
    }

    /// This lock's contribution to an aggregate power line.
    pub fn line(&self) -> PowerLine {
        PowerLine::of(self.amount, self.end_time)
    }
}

/// Result of previewing a merge: what `merge_locks` would mint right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePreview {
    pub power: Balance,
    pub duration: Seconds,
    pub amount: Balance,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_LOCK_DURATION;

    fn lock(amount: Balance, duration: Seconds) -> Lock {
        Lock::new(LockId(1), AccountId::from_label("alice"), amount, 1_000, duration)
    }

    #[test]
    fn end_time_is_consistent() {
        let l = lock(100, 500);
        assert_eq!(l.end_time, 1_500);
        assert_eq!(l.remaining_at(1_200), 300);
        assert!(!l.is_expired(1_499));
        assert!(l.is_expired(1_500));
    }

    #[test]
    fn power_matches_line_contribution() {
        let l = lock(10u128.pow(20), MAX_LOCK_DURATION);
        let t = 1_000 + MAX_LOCK_DURATION / 3;
        assert_eq!(l.power_at(t), l.line().power_at(t));
        assert_eq!(l.power_at(l.end_time + 5), 0);
    }
}
