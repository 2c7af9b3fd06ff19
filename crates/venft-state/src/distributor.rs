//! Multi-token reward distributor.
//!
//! The staked total is a decaying line, so accrual is split into segments at
//! every staked lock's end time and each segment is credited against the
//! power at its midpoint (see `venft_core::reward`). Owners never need to be
//! visited when the global counters move: each one settles lazily from the
//! values it last saw, stepping through the expiry marks of its own locks.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::debug;

use venft_core::aggregate::{GlobalPowerInfo, PowerAggregate, PowerLine};
use venft_core::error::VenftError;
use venft_core::lock::Lock;
use venft_core::reward::{AccPair, OwnerReward, RewardTokenEntry};
use venft_core::types::{AccountId, AssetId, Balance, Timestamp};

// ── Positions ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Bucket {
    line: PowerLine,
    locks: u32,
}

/// One owner's staked power and per-token settlement state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Staked locks that had not expired at the last settlement.
    line: PowerLine,
    expiries: BTreeMap<Timestamp, Bucket>,
    rewards: BTreeMap<AssetId, OwnerReward>,
}

impl Position {
    pub fn line(&self) -> &PowerLine {
        &self.line
    }

    pub fn unclaimed(&self, token: &AssetId) -> Balance {
        self.rewards.get(token).map(|r| r.unclaimed).unwrap_or(0)
    }

    fn is_idle(&self) -> bool {
        self.line.is_zero() && self.expiries.is_empty() && self.rewards.values().all(|r| r.unclaimed == 0)
    }

    fn add(&mut self, lock: &Lock) {
        let piece = lock.line();
        self.line.add(&piece);
        let bucket = self.expiries.entry(lock.end_time).or_default();
        bucket.line.add(&piece);
        bucket.locks += 1;
    }

    fn remove(&mut self, lock: &Lock) {
        let piece = lock.line();
        self.line.sub(&piece);
        if let Entry::Occupied(mut e) = self.expiries.entry(lock.end_time) {
            let bucket = e.get_mut();
            bucket.line.sub(&piece);
            bucket.locks = bucket.locks.saturating_sub(1);
            if bucket.locks == 0 {
                e.remove();
            }
        }
    }

    /// Credit every token up to `now`. Locks that ended in between are
    /// credited only up to their end, using `mark` to read a token's counter
    /// there. Returns the consumed `(end, locks)` buckets.
    fn settle<F>(&mut self, acc_now: &BTreeMap<AssetId, AccPair>, now: Timestamp, mark: F) -> Vec<(Timestamp, u32)>
    where
        F: Fn(Timestamp, &AssetId) -> AccPair,
    {
        let live = self.expiries.split_off(&now.saturating_add(1));
        let ended = std::mem::replace(&mut self.expiries, live);

        let mut consumed = Vec::with_capacity(ended.len());
        for (end, bucket) in ended {
            for token in acc_now.keys() {
                let acc = mark(end, token);
                self.rewards.entry(token.clone()).or_default().settle(&self.line, &acc);
            }
            self.line.sub(&bucket.line);
            consumed.push((end, bucket.locks));
        }
        for (token, acc) in acc_now {
            self.rewards.entry(token.clone()).or_default().settle(&self.line, acc);
        }
        consumed
    }
}

/// Accumulator values at a staked lock's end time, kept until every owner
/// with a lock ending then has settled past it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ExpiryMark {
    refs: u32,
    acc: BTreeMap<AssetId, AccPair>,
}

/// Result of advancing the global counters to some time, without committing.
struct Walk {
    acc: BTreeMap<AssetId, AccPair>,
    emitted: BTreeMap<AssetId, Balance>,
    marks: BTreeMap<Timestamp, BTreeMap<AssetId, AccPair>>,
}

// ── RewardDistributor ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDistributor {
    tokens: BTreeMap<AssetId, RewardTokenEntry>,
    /// Staked locks only. Its checkpoint time is the global settlement time.
    staked: PowerAggregate,
    positions: BTreeMap<AccountId, Position>,
    marks: BTreeMap<Timestamp, ExpiryMark>,
}

impl RewardDistributor {
    pub fn new(now: Timestamp) -> Self {
        Self {
            tokens: BTreeMap::new(),
            staked: PowerAggregate::new(now),
            positions: BTreeMap::new(),
            marks: BTreeMap::new(),
        }
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub fn token(&self, token: &AssetId) -> Result<&RewardTokenEntry, VenftError> {
        self.tokens
            .get(token)
            .ok_or_else(|| VenftError::UnknownRewardToken(token.clone()))
    }

    pub fn tokens(&self) -> impl Iterator<Item = &AssetId> {
        self.tokens.keys()
    }

    pub fn position(&self, owner: &AccountId) -> Option<&Position> {
        self.positions.get(owner)
    }

    /// The token's entry as it would read after settling to `now`.
    pub fn token_info(&self, token: &AssetId, now: Timestamp) -> Result<RewardTokenEntry, VenftError> {
        let mut info = self.token(token)?.clone();
        if now > self.staked.checkpoint_time() {
            let walk = self.walk(now);
            if let Some(acc) = walk.acc.get(token) {
                info.acc_per_power = *acc;
            }
            info.allocated = info
                .allocated
                .saturating_add(walk.emitted.get(token).copied().unwrap_or(0));
            info.last_update_time = now;
        }
        Ok(info)
    }

    pub fn pending(&self, owner: &AccountId, token: &AssetId, now: Timestamp) -> Result<Balance, VenftError> {
        self.token(token)?;
        Ok(self
            .projected_position(owner, now)
            .map(|pos| pos.unclaimed(token))
            .unwrap_or(0))
    }

    /// Pending amount of every registered token, in token order.
    pub fn pending_all(&self, owner: &AccountId, now: Timestamp) -> Vec<(AssetId, Balance)> {
        let pos = self.projected_position(owner, now);
        self.tokens
            .keys()
            .map(|token| {
                let amount = pos.as_ref().map(|p| p.unclaimed(token)).unwrap_or(0);
                (token.clone(), amount)
            })
            .collect()
    }

    /// Fails if paying `amount` of `token` at `now` would exceed what the
    /// distributor holds or has credited.
    pub fn ensure_payable(&self, token: &AssetId, amount: Balance, now: Timestamp) -> Result<(), VenftError> {
        let info = self.token_info(token, now)?;
        let have = info.allocated.min(info.remaining_balance);
        if amount > have {
            return Err(VenftError::InsufficientRewardBalance {
                token: token.clone(),
                need: amount,
                have,
            });
        }
        Ok(())
    }

    pub fn total_power_at(&self, now: Timestamp) -> Balance {
        self.staked.total_power_at(now)
    }

    pub fn info_at(&self, now: Timestamp) -> GlobalPowerInfo {
        self.staked.info_at(now)
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    pub fn add_token(&mut self, token: AssetId, rate: Balance, now: Timestamp) -> Result<(), VenftError> {
        if self.tokens.contains_key(&token) {
            return Err(VenftError::AlreadyRegistered(token));
        }
        self.checkpoint(now);
        self.tokens.insert(token, RewardTokenEntry::new(rate, now));
        Ok(())
    }

    /// Funds only count from `now` on; earlier intervals were already
    /// capped by what was available then.
    pub fn fund(&mut self, token: &AssetId, amount: Balance, now: Timestamp) -> Result<(), VenftError> {
        self.token(token)?;
        self.checkpoint(now);
        let entry = self.token_mut(token)?;
        entry.remaining_balance = entry.remaining_balance.saturating_add(amount);
        Ok(())
    }

    /// Accrual up to `now` is settled at the old rate.
    pub fn set_rate(&mut self, token: &AssetId, rate: Balance, now: Timestamp) -> Result<(), VenftError> {
        self.token(token)?;
        self.checkpoint(now);
        self.token_mut(token)?.rate = rate;
        Ok(())
    }

    /// Advance every token's counters to `now` and re-anchor the staked
    /// aggregate there.
    pub fn checkpoint(&mut self, now: Timestamp) {
        if now <= self.staked.checkpoint_time() {
            return;
        }
        let walk = self.walk(now);
        for (token, entry) in self.tokens.iter_mut() {
            if let Some(acc) = walk.acc.get(token) {
                entry.acc_per_power = *acc;
            }
            let emitted = walk.emitted.get(token).copied().unwrap_or(0);
            entry.allocated = entry.allocated.saturating_add(emitted);
            entry.last_update_time = now;
        }
        let crossed = walk.marks.len();
        for (end, acc) in walk.marks {
            if let Some(mark) = self.marks.get_mut(&end) {
                mark.acc = acc;
            }
        }
        self.staked.checkpoint(now);
        debug!(now, crossed, "distributor checkpoint");
    }

    /// Settle the global counters, then `owner`. Accounts that hold no
    /// position are left without one.
    pub fn settle_owner(&mut self, owner: &AccountId, now: Timestamp) {
        self.checkpoint(now);
        let acc_now: BTreeMap<AssetId, AccPair> = self
            .tokens
            .iter()
            .map(|(token, entry)| (token.clone(), entry.acc_per_power))
            .collect();
        let marks = &self.marks;
        let Some(pos) = self.positions.get_mut(owner) else {
            return;
        };
        let consumed = pos.settle(&acc_now, now, |end, token| {
            marks
                .get(&end)
                .and_then(|m| m.acc.get(token))
                .copied()
                .unwrap_or_default()
        });
        for (end, locks) in consumed {
            self.release_mark(end, locks);
        }
    }

    /// Zero `owner`'s settled balance of `token` and debit the token. Callers
    /// settle first and have already paid the amount out.
    pub fn take_unclaimed(&mut self, owner: &AccountId, token: &AssetId) -> Balance {
        let Some(reward) = self
            .positions
            .get_mut(owner)
            .and_then(|pos| pos.rewards.get_mut(token))
        else {
            return 0;
        };
        let paid = std::mem::take(&mut reward.unclaimed);
        if let Some(entry) = self.tokens.get_mut(token) {
            entry.remaining_balance = entry.remaining_balance.saturating_sub(paid);
            entry.allocated = entry.allocated.saturating_sub(paid);
        }
        self.prune(owner);
        paid
    }

    /// Add an active lock's power to `owner`. The lock must end after `now`.
    pub fn stake(&mut self, owner: &AccountId, lock: &Lock, now: Timestamp) {
        // A new position settles once with no power, which records the
        // current counters as its starting point.
        self.positions.entry(owner.clone()).or_default();
        self.settle_owner(owner, now);
        self.positions.entry(owner.clone()).or_default().add(lock);
        self.staked.insert(lock.amount, lock.end_time);
        self.marks.entry(lock.end_time).or_default().refs += 1;
    }

    /// Take a lock's remaining power away from `owner`. An expired lock was
    /// already dropped when `owner` settled past its end.
    pub fn unstake(&mut self, owner: &AccountId, lock: &Lock, now: Timestamp) {
        self.settle_owner(owner, now);
        if lock.end_time > now {
            if let Some(pos) = self.positions.get_mut(owner) {
                pos.remove(lock);
            }
            self.staked.remove(lock.amount, lock.end_time);
            self.release_mark(lock.end_time, 1);
        }
        self.prune(owner);
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn token_mut(&mut self, token: &AssetId) -> Result<&mut RewardTokenEntry, VenftError> {
        self.tokens
            .get_mut(token)
            .ok_or_else(|| VenftError::UnknownRewardToken(token.clone()))
    }

    /// Drop `owner`'s position once it has no power and nothing unclaimed.
    fn prune(&mut self, owner: &AccountId) {
        if let Entry::Occupied(e) = self.positions.entry(owner.clone()) {
            if e.get().is_idle() {
                e.remove();
            }
        }
    }

    fn release_mark(&mut self, end: Timestamp, locks: u32) {
        if let Entry::Occupied(mut e) = self.marks.entry(end) {
            let mark = e.get_mut();
            mark.refs = mark.refs.saturating_sub(locks);
            if mark.refs == 0 {
                e.remove();
            }
        }
    }

    /// Counters advanced from the last checkpoint to `now`, one segment per
    /// staked expiry in between.
    fn walk(&self, now: Timestamp) -> Walk {
        let mut walk = Walk {
            acc: self
                .tokens
                .iter()
                .map(|(token, entry)| (token.clone(), entry.acc_per_power))
                .collect(),
            emitted: BTreeMap::new(),
            marks: BTreeMap::new(),
        };
        let mut line = *self.staked.line();
        let mut t = self.staked.checkpoint_time();
        if now <= t {
            return walk;
        }
        for (end, bucket) in self.staked.expiries_through(now) {
            self.emit(&mut walk, &line, t, end);
            walk.marks.insert(end, walk.acc.clone());
            line.sub(bucket);
            t = end;
        }
        self.emit(&mut walk, &line, t, now);
        walk
    }

    fn emit(&self, walk: &mut Walk, line: &PowerLine, t0: Timestamp, t1: Timestamp) {
        if t1 <= t0 || line.is_zero() {
            return;
        }
        for (token, entry) in &self.tokens {
            let already = walk.emitted.get(token).copied().unwrap_or(0);
            let emission = entry
                .emission_for(t1 - t0)
                .min(entry.unallocated().saturating_sub(already));
            if let Some(delta) = AccPair::segment(line, t0, t1, emission) {
                if let Some(acc) = walk.acc.get_mut(token) {
                    acc.advance(&delta);
                }
                *walk.emitted.entry(token.clone()).or_default() += emission;
            }
        }
    }

    fn projected_position(&self, owner: &AccountId, now: Timestamp) -> Option<Position> {
        let mut pos = self.positions.get(owner)?.clone();
        let walk = self.walk(now);
        let settled_to = self.staked.checkpoint_time();
        pos.settle(&walk.acc, now, |end, token| {
            let recorded = if end <= settled_to {
                self.marks.get(&end).and_then(|m| m.acc.get(token))
            } else {
                walk.marks.get(&end).and_then(|m| m.get(token))
            };
            recorded.copied().unwrap_or_default()
        });
        Some(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use venft_core::constants::{MAX_LOCK_DURATION, SECONDS_PER_DAY};
    use venft_core::types::LockId;

    const UNIT: Balance = 10u128.pow(18);
    const T0: Timestamp = 1_700_000_000;

    fn alice() -> AccountId {
        AccountId::from_label("alice")
    }

    fn bob() -> AccountId {
        AccountId::from_label("bob")
    }

    fn reward() -> AssetId {
        AssetId::new("RWD")
    }

    fn lock(id: u64, owner: AccountId, amount: Balance, duration: u64) -> Lock {
        Lock::new(LockId(id), owner, amount, T0, duration)
    }

    fn funded(rate: Balance, funds: Balance) -> RewardDistributor {
        let mut d = RewardDistributor::new(T0);
        d.add_token(reward(), rate, T0).unwrap();
        d.fund(&reward(), funds, T0).unwrap();
        d
    }

    #[test]
    fn sole_staker_gets_rate_times_time() {
        let mut d = funded(UNIT, 1_000_000 * UNIT);
        d.stake(&alice(), &lock(1, alice(), 100 * UNIT, MAX_LOCK_DURATION), T0);
        let dt = 3 * SECONDS_PER_DAY;
        let pending = d.pending(&alice(), &reward(), T0 + dt).unwrap();
        let expected = UNIT * dt as u128;
        assert!(expected - pending <= 1, "{expected} vs {pending}");
    }

    #[test]
    fn pending_is_a_pure_projection() {
        let mut d = funded(UNIT, 1_000_000 * UNIT);
        d.stake(&alice(), &lock(1, alice(), 100 * UNIT, MAX_LOCK_DURATION), T0);
        let before = d.clone();
        d.pending(&alice(), &reward(), T0 + 1_000).unwrap();
        d.pending_all(&alice(), T0 + 5_000);
        d.token_info(&reward(), T0 + 5_000).unwrap();
        assert_eq!(d, before);
    }

    #[test]
    fn nothing_staked_keeps_funds_unallocated() {
        let mut d = funded(UNIT, 100 * UNIT);
        d.checkpoint(T0 + 50);
        let info = d.token_info(&reward(), T0 + 50).unwrap();
        assert_eq!(info.allocated, 0);
        assert_eq!(info.remaining_balance, 100 * UNIT);
        assert_eq!(info.acc_per_power, AccPair::default());
    }

    #[test]
    fn emission_stops_when_funds_run_out() {
        let mut d = funded(10, 100);
        d.stake(&alice(), &lock(1, alice(), 100 * UNIT, MAX_LOCK_DURATION), T0);
        let pending = d.pending(&alice(), &reward(), T0 + 1_000).unwrap();
        assert!((99..=100).contains(&pending), "{pending}");
        assert!(d.ensure_payable(&reward(), pending, T0 + 1_000).is_ok());
        assert!(d.ensure_payable(&reward(), 101, T0 + 1_000).is_err());
    }

    #[test]
    fn expired_lock_stops_earning_at_its_end() {
        let mut d = funded(UNIT, 1_000_000 * UNIT);
        let short = lock(1, alice(), 100 * UNIT, 10 * SECONDS_PER_DAY);
        d.stake(&alice(), &short, T0);
        d.stake(&bob(), &lock(2, bob(), 100 * UNIT, MAX_LOCK_DURATION), T0);

        let at_end = d.pending(&alice(), &reward(), short.end_time).unwrap();
        let later = d.pending(&alice(), &reward(), short.end_time + 30 * SECONDS_PER_DAY).unwrap();
        assert!(at_end > 0);
        assert_eq!(at_end, later);

        // Bob takes the whole emission after alice's lock ends.
        let bob_mid = d.pending(&bob(), &reward(), short.end_time).unwrap();
        let bob_late = d.pending(&bob(), &reward(), short.end_time + SECONDS_PER_DAY).unwrap();
        let day = UNIT * SECONDS_PER_DAY as u128;
        assert!(day - (bob_late - bob_mid) <= 2);
    }

    #[test]
    fn settling_past_an_expiry_releases_its_mark() {
        let mut d = funded(UNIT, 1_000_000 * UNIT);
        let short = lock(1, alice(), 100 * UNIT, 100);
        d.stake(&alice(), &short, T0);
        assert_eq!(d.marks.len(), 1);

        d.checkpoint(T0 + 200);
        assert_eq!(d.marks.len(), 1);
        assert!(d.marks[&short.end_time].acc.contains_key(&reward()));

        let projected = d.pending(&alice(), &reward(), T0 + 200).unwrap();
        d.settle_owner(&alice(), T0 + 200);
        assert!(d.marks.is_empty());
        assert_eq!(d.position(&alice()).unwrap().unclaimed(&reward()), projected);
        assert!(d.position(&alice()).unwrap().line().is_zero());
    }

    #[test]
    fn unstake_active_lock_clears_everything() {
        let mut d = funded(UNIT, 1_000_000 * UNIT);
        let l = lock(1, alice(), 100 * UNIT, MAX_LOCK_DURATION);
        d.stake(&alice(), &l, T0);
        d.unstake(&alice(), &l, T0 + 100);
        assert!(d.marks.is_empty());
        assert_eq!(d.total_power_at(T0 + 100), 0);
        let frozen = d.pending(&alice(), &reward(), T0 + 100).unwrap();
        assert_eq!(d.pending(&alice(), &reward(), T0 + 10_000).unwrap(), frozen);
    }

    #[test]
    fn take_unclaimed_debits_the_token() {
        let mut d = funded(UNIT, 1_000_000 * UNIT);
        d.stake(&alice(), &lock(1, alice(), 100 * UNIT, MAX_LOCK_DURATION), T0);
        d.settle_owner(&alice(), T0 + 100);
        let paid = d.take_unclaimed(&alice(), &reward());
        let entry = d.token(&reward()).unwrap();
        assert_eq!(entry.remaining_balance, 1_000_000 * UNIT - paid);
        assert!(entry.allocated <= 1);
        assert_eq!(d.take_unclaimed(&alice(), &reward()), 0);
    }

    #[test]
    fn settling_accounts_without_stake_adds_no_positions() {
        let mut d = funded(UNIT, 1_000_000 * UNIT);
        for i in 0..1_000 {
            let who = AccountId::from_label(&format!("drive-by-{i}"));
            d.settle_owner(&who, T0 + i);
            assert_eq!(d.take_unclaimed(&who, &reward()), 0);
        }
        assert!(d.positions.is_empty());
    }

    #[test]
    fn idle_positions_are_dropped() {
        let mut d = funded(UNIT, 1_000_000 * UNIT);
        let l = lock(1, alice(), 100 * UNIT, MAX_LOCK_DURATION);
        d.stake(&alice(), &l, T0);
        d.unstake(&alice(), &l, T0 + 100);
        // Rewards still owed keep the position alive.
        assert!(d.position(&alice()).is_some());
        assert!(d.take_unclaimed(&alice(), &reward()) > 0);
        assert!(d.position(&alice()).is_none());

        // Staking again starts from the current counters, not from zero.
        let again = lock(2, alice(), 100 * UNIT, MAX_LOCK_DURATION);
        d.stake(&alice(), &again, T0 + 1_000);
        assert_eq!(d.pending(&alice(), &reward(), T0 + 1_000).unwrap(), 0);
        let pending = d.pending(&alice(), &reward(), T0 + 1_100).unwrap();
        assert!(100 * UNIT - pending <= 1, "{pending}");
    }

    #[test]
    fn funding_or_pricing_an_unknown_token_fails() {
        let mut d = funded(UNIT, 0);
        let before = d.clone();
        let other = AssetId::new("OTHER");
        assert_eq!(
            d.fund(&other, 10, T0 + 5),
            Err(VenftError::UnknownRewardToken(other.clone()))
        );
        assert_eq!(
            d.set_rate(&other, 10, T0 + 5),
            Err(VenftError::UnknownRewardToken(other))
        );
        assert_eq!(d, before);
    }

    #[test]
    fn duplicate_and_unknown_tokens() {
        let mut d = funded(1, 0);
        assert_eq!(
            d.add_token(reward(), 2, T0),
            Err(VenftError::AlreadyRegistered(reward()))
        );
        let other = AssetId::new("OTHER");
        assert_eq!(
            d.pending(&alice(), &other, T0),
            Err(VenftError::UnknownRewardToken(other))
        );
    }
}
