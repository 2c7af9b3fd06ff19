use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use venft_core::aggregate::{GlobalPowerInfo, PowerAggregate};
use venft_core::constants::MAX_LOCK_DURATION;
use venft_core::decay::{duration_for_power, ve_power};
use venft_core::error::VenftError;
use venft_core::lock::{Lock, MergePreview};
use venft_core::types::{AccountId, Balance, LockId, Seconds, Timestamp};

/// Every live lock, who holds it, and the aggregate of their power.
///
/// Mutators here are infallible: callers validate through the `check_*` /
/// `plan_*` helpers and move assets first, so a failure never leaves the
/// registry half-updated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRegistry {
    next_id: u64,
    locks: BTreeMap<LockId, Lock>,
    owners: BTreeMap<AccountId, BTreeSet<LockId>>,
    aggregate: PowerAggregate,
}

impl LockRegistry {
    pub fn new(now: Timestamp) -> Self {
        Self {
            next_id: 1,
            locks: BTreeMap::new(),
            owners: BTreeMap::new(),
            aggregate: PowerAggregate::new(now),
        }
    }

    // ── Lookups ───────────────────────────────────────────────────────────────

    pub fn get(&self, id: LockId) -> Result<&Lock, VenftError> {
        self.locks.get(&id).ok_or(VenftError::LockNotFound(id))
    }

    /// The lock, if `caller` owns it.
    pub fn owned(&self, caller: &AccountId, id: LockId) -> Result<&Lock, VenftError> {
        let lock = self.get(id)?;
        if &lock.owner != caller {
            return Err(VenftError::NotOwner { lock_id: id, caller: caller.clone() });
        }
        Ok(lock)
    }

    pub fn tokens_of(&self, owner: &AccountId) -> Vec<LockId> {
        self.owners
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn locks_of<'a>(&'a self, owner: &AccountId) -> impl Iterator<Item = &'a Lock> + 'a {
        self.owners
            .get(owner)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.locks.get(id))
    }

    /// Σ power of every lock `owner` holds, staked or not.
    pub fn owner_power(&self, owner: &AccountId, now: Timestamp) -> Balance {
        self.locks_of(owner).map(|l| l.power_at(now)).sum()
    }

    pub fn total_power_at(&self, now: Timestamp) -> Balance {
        self.aggregate.total_power_at(now)
    }

    pub fn info_at(&self, now: Timestamp) -> GlobalPowerInfo {
        self.aggregate.info_at(now)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    // ── Validation / planning ─────────────────────────────────────────────────

    pub fn check_create(amount: Balance, duration: Seconds) -> Result<(), VenftError> {
        if amount == 0 {
            return Err(VenftError::InvalidAmount);
        }
        check_duration(duration)
    }

    /// Duration of the lock `extend_lock` would mint: what is left of `lock`
    /// plus `extra`, which must still fit in `MAX_LOCK_DURATION`.
    pub fn extended_duration(lock: &Lock, extra: Seconds, now: Timestamp) -> Result<Seconds, VenftError> {
        if lock.is_expired(now) {
            return Err(VenftError::LockExpired(lock.id));
        }
        let duration = lock
            .remaining_at(now)
            .checked_add(extra)
            .ok_or(VenftError::InvalidDuration { duration: u64::MAX, max: MAX_LOCK_DURATION })?;
        check_duration(duration)?;
        Ok(duration)
    }

    /// What merging `a` and `b` at `now` mints. The duration is back-computed
    /// from the summed power and rounded up to a whole second, so the new
    /// lock starts with at least that power and at most `amount / MAX + 1`
    /// above it.
    pub fn plan_merge(a: &Lock, b: &Lock, now: Timestamp) -> Result<MergePreview, VenftError> {
        if a.id == b.id {
            return Err(VenftError::InvalidMerge(a.id));
        }
        for lock in [a, b] {
            if lock.is_expired(now) {
                return Err(VenftError::LockExpired(lock.id));
            }
        }
        let amount = a.amount.checked_add(b.amount).ok_or(VenftError::InvalidAmount)?;
        let power_sum = a.power_at(now) + b.power_at(now);
        let duration = duration_for_power(power_sum, amount).max(1);
        Ok(MergePreview {
            power: ve_power(amount, duration, 0),
            duration,
            amount,
        })
    }

    // ── Previews ──────────────────────────────────────────────────────────────

    pub fn preview_create(amount: Balance, duration: Seconds) -> Result<Balance, VenftError> {
        Self::check_create(amount, duration)?;
        Ok(ve_power(amount, duration, 0))
    }

    pub fn preview_extend(&self, id: LockId, extra: Seconds, now: Timestamp) -> Result<Balance, VenftError> {
        let lock = self.get(id)?;
        let duration = Self::extended_duration(lock, extra, now)?;
        Ok(ve_power(lock.amount, duration, 0))
    }

    pub fn preview_merge(&self, a: LockId, b: LockId, now: Timestamp) -> Result<MergePreview, VenftError> {
        if a == b {
            return Err(VenftError::InvalidMerge(a));
        }
        Self::plan_merge(self.get(a)?, self.get(b)?, now)
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    pub fn mint(&mut self, owner: AccountId, amount: Balance, duration: Seconds, now: Timestamp) -> LockId {
        let id = LockId(self.next_id);
        self.next_id += 1;

        let lock = Lock::new(id, owner.clone(), amount, now, duration);
        self.aggregate.checkpoint(now);
        self.aggregate.insert(lock.amount, lock.end_time);
        self.owners.entry(owner).or_default().insert(id);
        self.locks.insert(id, lock);
        id
    }

    pub fn burn(&mut self, id: LockId, now: Timestamp) -> Option<Lock> {
        let lock = self.locks.remove(&id)?;
        self.aggregate.checkpoint(now);
        self.aggregate.remove(lock.amount, lock.end_time);
        self.unindex(&lock.owner, id);
        Some(lock)
    }

    /// Move custody of `id` to `to`. Power is unaffected.
    pub fn reassign(&mut self, id: LockId, to: AccountId) {
        let Some(lock) = self.locks.get_mut(&id) else {
            return;
        };
        let from = std::mem::replace(&mut lock.owner, to.clone());
        self.unindex(&from, id);
        self.owners.entry(to).or_default().insert(id);
    }

    pub fn checkpoint(&mut self, now: Timestamp) {
        self.aggregate.checkpoint(now);
    }

    fn unindex(&mut self, owner: &AccountId, id: LockId) {
        if let Some(ids) = self.owners.get_mut(owner) {
            ids.remove(&id);
            if ids.is_empty() {
                self.owners.remove(owner);
            }
        }
    }
}

fn check_duration(duration: Seconds) -> Result<(), VenftError> {
    if duration == 0 || duration > MAX_LOCK_DURATION {
        return Err(VenftError::InvalidDuration { duration, max: MAX_LOCK_DURATION });
    }
    Ok(())
}
