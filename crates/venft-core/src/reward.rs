//! Reward accumulators.
//!
//! Over a segment `[t0, t1]` in which the staked total is the line `L` and
//! `E` reward units are emitted, an owner whose staked line is `L_u` earns
//!
//!   E * L_u(mid) / L(mid)
//!
//! i.e. their share of the power that existed over the segment. Writing
//! `Q = 2*bias - slope*(t0 + t1)` (twice the scaled midpoint power), that is
//!
//!   (bias_u * 2E/Q - slope_u * (t0 + t1)E/Q)
//!
//! so two cumulative counters per token, `per_power += 2E·S/Q` and
//! `per_power_time += (t0 + t1)E·S/Q`, let any owner settle in O(1) from the
//! values they last saw.

use serde::{Deserialize, Serialize};

use crate::aggregate::PowerLine;
use crate::constants::ACC_PRECISION;
use crate::math::{narrow, wide, U256};
use crate::types::{Balance, Seconds, Timestamp};

// ── AccPair ──────────────────────────────────────────────────────────────────

/// The `acc_per_power` counter of one reward token, scaled by `ACC_PRECISION`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccPair {
    pub per_power: U256,
    pub per_power_time: U256,
}

impl AccPair {
    /// Increment for emitting `emission` over `[t0, t1]` against `total`.
    /// `None` when nothing is staked or nothing is emitted.
    pub fn segment(total: &PowerLine, t0: Timestamp, t1: Timestamp, emission: Balance) -> Option<AccPair> {
        let q = total.doubled_midpoint(t0, t1);
        if q.is_zero() || emission == 0 {
            return None;
        }
        let scaled = wide(emission) * wide(ACC_PRECISION);
        Some(AccPair {
            per_power: U256::from(2u8) * scaled / q,
            per_power_time: (U256::from(t0) + U256::from(t1)) * scaled / q,
        })
    }

    pub fn advance(&mut self, delta: &AccPair) {
        self.per_power = self.per_power.saturating_add(delta.per_power);
        self.per_power_time = self.per_power_time.saturating_add(delta.per_power_time);
    }

    /// Reward earned by `line` while the counter moved from `self` to `to`.
    pub fn earned(&self, line: &PowerLine, to: &AccPair) -> Balance {
        let d_power = to.per_power.saturating_sub(self.per_power);
        let d_time = to.per_power_time.saturating_sub(self.per_power_time);
        let gross = line.bias.saturating_mul(d_power);
        let offset = line.slope.saturating_mul(d_time);
        narrow(gross.saturating_sub(offset) / wide(ACC_PRECISION))
    }
}

// ── RewardTokenEntry ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTokenEntry {
    /// Emission in base units per second.
    pub rate: Balance,
    pub acc_per_power: AccPair,
    pub last_update_time: Timestamp,
    /// Funded and not yet paid out.
    pub remaining_balance: Balance,
    /// Part of `remaining_balance` already credited to stakers.
    pub allocated: Balance,
    pub registered_at: Timestamp,
}

impl RewardTokenEntry {
    pub fn new(rate: Balance, now: Timestamp) -> Self {
        Self {
            rate,
            acc_per_power: AccPair::default(),
            last_update_time: now,
            remaining_balance: 0,
            allocated: 0,
            registered_at: now,
        }
    }

    pub fn unallocated(&self) -> Balance {
        self.remaining_balance.saturating_sub(self.allocated)
    }

    /// What the token can emit over `dt` seconds: the rate, capped by funds
    /// not yet credited to anyone.
    pub fn emission_for(&self, dt: Seconds) -> Balance {
        self.rate.saturating_mul(dt as u128).min(self.unallocated())
    }
}

// ── OwnerReward ──────────────────────────────────────────────────────────────

/// One owner's settlement state for one reward token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReward {
    pub acc_seen: AccPair,
    pub unclaimed: Balance,
}

impl OwnerReward {
    /// Credit what `line` earned up to `acc` and move the watermark there.
    pub fn settle(&mut self, line: &PowerLine, acc: &AccPair) {
        let earned = self.acc_seen.earned(line, acc);
        self.unclaimed = self.unclaimed.saturating_add(earned);
        self.acc_seen = *acc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_LOCK_DURATION;

    const UNIT: Balance = 10u128.pow(18);
    const T0: Timestamp = 1_700_000_000;

    #[test]
    fn sole_staker_earns_the_whole_emission() {
        let line = PowerLine::of(100 * UNIT, T0 + MAX_LOCK_DURATION);
        let e = 7 * 86_400 * UNIT / 10;
        let delta = AccPair::segment(&line, T0, T0 + 7 * 86_400, e).unwrap();
        let earned = AccPair::default().earned(&line, &delta);
        assert!(e - earned <= 1, "{e} vs {earned}");
    }

    #[test]
    fn shares_follow_midpoint_power() {
        let a = PowerLine::of(10 * UNIT, T0 + MAX_LOCK_DURATION);
        let b = PowerLine::of(100 * UNIT, T0 + MAX_LOCK_DURATION);
        let mut total = a;
        total.add(&b);
        let e = 1_000 * UNIT;
        let delta = AccPair::segment(&total, T0, T0 + 86_400, e).unwrap();
        let zero = AccPair::default();
        let ea = zero.earned(&a, &delta);
        let eb = zero.earned(&b, &delta);
        assert!((eb / 10).abs_diff(ea) <= 1);
        assert!(ea + eb <= e);
        assert!(e - (ea + eb) <= 2);
    }

    #[test]
    fn nothing_staked_emits_nothing() {
        assert!(AccPair::segment(&PowerLine::default(), T0, T0 + 10, 100).is_none());
        let line = PowerLine::of(UNIT, T0 + 100);
        assert!(AccPair::segment(&line, T0, T0 + 10, 0).is_none());
    }

    #[test]
    fn emission_is_capped_by_unallocated_funds() {
        let mut entry = RewardTokenEntry::new(10, T0);
        entry.remaining_balance = 50;
        entry.allocated = 20;
        assert_eq!(entry.emission_for(2), 20);
        assert_eq!(entry.emission_for(100), 30);
    }

    #[test]
    fn settle_moves_watermark() {
        let line = PowerLine::of(100 * UNIT, T0 + MAX_LOCK_DURATION);
        let delta = AccPair::segment(&line, T0, T0 + 100, 1_000).unwrap();
        let mut owner = OwnerReward::default();
        owner.settle(&line, &delta);
        let first = owner.unclaimed;
        owner.settle(&line, &delta);
        assert_eq!(owner.unclaimed, first);
        assert_eq!(owner.acc_seen, delta);
    }
}
