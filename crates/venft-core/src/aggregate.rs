//! Global power aggregate.
//!
//! Each live lock contributes `amount * (end - t) / MAX_LOCK_DURATION`, so a
//! set of locks sums to a line `(bias - slope * t) / MAX_LOCK_DURATION` with
//! `slope = Σ amount` and `bias = Σ amount * end`, valid until the earliest
//! `end` among them. Contributions are also bucketed by `end` so crossing an
//! expiry only touches that bucket.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::MAX_LOCK_DURATION;
use crate::math::{narrow, wide, U256};
use crate::types::{Balance, Timestamp};

// ── PowerLine ────────────────────────────────────────────────────────────────

/// A sum of lock contributions, scaled by `MAX_LOCK_DURATION`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerLine {
    /// Σ amount.
    pub slope: U256,
    /// Σ amount * end_time.
    pub bias: U256,
}

impl PowerLine {
    pub fn of(amount: Balance, end: Timestamp) -> Self {
        Self {
            slope: wide(amount),
            bias: wide(amount) * U256::from(end),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.slope.is_zero() && self.bias.is_zero()
    }

    pub fn add(&mut self, other: &PowerLine) {
        self.slope += other.slope;
        self.bias += other.bias;
    }

    pub fn sub(&mut self, other: &PowerLine) {
        self.slope = self.slope.saturating_sub(other.slope);
        self.bias = self.bias.saturating_sub(other.bias);
    }

    /// `MAX_LOCK_DURATION * power(t)`, clamped at zero.
    pub fn scaled_at(&self, t: Timestamp) -> U256 {
        self.bias.saturating_sub(self.slope * U256::from(t))
    }

    pub fn power_at(&self, t: Timestamp) -> Balance {
        narrow(self.scaled_at(t) / U256::from(MAX_LOCK_DURATION))
    }

    /// `2 * MAX_LOCK_DURATION * power((t0 + t1) / 2)`, without the halving.
    pub fn doubled_midpoint(&self, t0: Timestamp, t1: Timestamp) -> U256 {
        let two = U256::from(2u8);
        (two * self.bias).saturating_sub(self.slope * (U256::from(t0) + U256::from(t1)))
    }
}

// ── PowerAggregate ───────────────────────────────────────────────────────────

/// Snapshot of the aggregate as returned by `get_global_ve_power_info`.
///
/// `slope` and `offset` are in power units, floored from the exact line, so
/// `offset - slope * t` follows the total between expiries. Rounding makes
/// [`GlobalPowerInfo::linear_at`] read at most `t + 1` base units above the
/// exact total and never more than one below it; [`GlobalPowerInfo::power_at`]
/// is exact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPowerInfo {
    /// Power lost per second: `Σ amount / MAX_LOCK_DURATION`.
    pub slope: Balance,
    /// Power extrapolated back to `t = 0`: `Σ amount * end / MAX_LOCK_DURATION`.
    pub offset: Balance,
    pub checkpoint_time: Timestamp,
    /// The unrounded line, scaled by `MAX_LOCK_DURATION`.
    pub line: PowerLine,
}

impl GlobalPowerInfo {
    fn of(line: PowerLine, checkpoint_time: Timestamp) -> Self {
        let max = U256::from(MAX_LOCK_DURATION);
        Self {
            slope: narrow(line.slope / max),
            offset: narrow(line.bias / max),
            checkpoint_time,
            line,
        }
    }

    /// `offset - slope * t`, clamped at zero.
    pub fn linear_at(&self, t: Timestamp) -> Balance {
        self.offset.saturating_sub(self.slope.saturating_mul(t as u128))
    }

    pub fn power_at(&self, t: Timestamp) -> Balance {
        self.line.power_at(t)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerAggregate {
    /// Contributions of locks with `end > checkpoint_time`.
    line: PowerLine,
    checkpoint_time: Timestamp,
    /// The same contributions, bucketed by end time.
    expiries: BTreeMap<Timestamp, PowerLine>,
}

impl PowerAggregate {
    pub fn new(now: Timestamp) -> Self {
        Self {
            checkpoint_time: now,
            ..Self::default()
        }
    }

    pub fn line(&self) -> &PowerLine {
        &self.line
    }

    pub fn checkpoint_time(&self) -> Timestamp {
        self.checkpoint_time
    }

    pub fn info(&self) -> GlobalPowerInfo {
        GlobalPowerInfo::of(self.line, self.checkpoint_time)
    }

    /// Add a live lock. Callers checkpoint first, so `end > checkpoint_time`.
    pub fn insert(&mut self, amount: Balance, end: Timestamp) {
        let piece = PowerLine::of(amount, end);
        self.line.add(&piece);
        self.expiries.entry(end).or_default().add(&piece);
    }

    /// Remove a lock's contribution. A no-op once the lock's end has been
    /// checkpointed past: the contribution was already dropped then.
    pub fn remove(&mut self, amount: Balance, end: Timestamp) {
        if end <= self.checkpoint_time {
            return;
        }
        let piece = PowerLine::of(amount, end);
        self.line.sub(&piece);
        if let Some(bucket) = self.expiries.get_mut(&end) {
            bucket.sub(&piece);
            if bucket.is_zero() {
                self.expiries.remove(&end);
            }
        }
    }

    /// Re-anchor at `now`: drop every bucket that has expired.
    pub fn checkpoint(&mut self, now: Timestamp) {
        if now < self.checkpoint_time {
            return;
        }
        let live = self.expiries.split_off(&(now + 1));
        for bucket in self.expiries.values() {
            self.line.sub(bucket);
        }
        self.expiries = live;
        self.checkpoint_time = now;
    }

    /// Buckets ending in `(checkpoint_time, t]`, in time order.
    pub fn expiries_through(&self, t: Timestamp) -> impl Iterator<Item = (Timestamp, &PowerLine)> {
        self.expiries.range(..=t).map(|(end, line)| (*end, line))
    }

    /// The line as it would be after `checkpoint(t)`, without mutating.
    pub fn line_at(&self, t: Timestamp) -> PowerLine {
        let mut line = self.line;
        for (_, bucket) in self.expiries_through(t) {
            line.sub(bucket);
        }
        line
    }

    /// `info()` as it would read after `checkpoint(t)`.
    pub fn info_at(&self, t: Timestamp) -> GlobalPowerInfo {
        GlobalPowerInfo::of(self.line_at(t), t.max(self.checkpoint_time))
    }

    /// Σ power of all live locks at `t`. Pure projection; correct across
    /// expiries that have not been checkpointed yet.
    pub fn total_power_at(&self, t: Timestamp) -> Balance {
        self.line_at(t).power_at(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decay::ve_power;
    use proptest::prelude::*;

    const UNIT: Balance = 10u128.pow(18);
    const T0: Timestamp = 1_700_000_000;

    #[test]
    fn single_full_lock_decays_linearly() {
        let mut agg = PowerAggregate::new(T0);
        agg.insert(100 * UNIT, T0 + MAX_LOCK_DURATION);
        assert_eq!(agg.total_power_at(T0), 100 * UNIT);
        assert_eq!(agg.total_power_at(T0 + MAX_LOCK_DURATION / 4), 75 * UNIT);
        assert_eq!(agg.total_power_at(T0 + MAX_LOCK_DURATION), 0);
        assert_eq!(agg.total_power_at(T0 + 2 * MAX_LOCK_DURATION), 0);
    }

    #[test]
    fn projection_handles_uncheckpointed_expiry() {
        let mut agg = PowerAggregate::new(T0);
        agg.insert(100 * UNIT, T0 + MAX_LOCK_DURATION);
        agg.insert(200 * UNIT, T0 + MAX_LOCK_DURATION / 4);
        let t = T0 + MAX_LOCK_DURATION / 2;
        // The short lock expired without any event; the projection must not
        // keep subtracting its slope.
        assert_eq!(agg.total_power_at(t), 50 * UNIT);

        let mut checkpointed = agg.clone();
        checkpointed.checkpoint(t);
        assert_eq!(checkpointed.total_power_at(t), 50 * UNIT);
        assert_eq!(checkpointed.expiries_through(u64::MAX).count(), 1);
        assert_eq!(checkpointed.info().checkpoint_time, t);
    }

    #[test]
    fn remove_after_expiry_is_noop() {
        let mut agg = PowerAggregate::new(T0);
        agg.insert(100 * UNIT, T0 + 10);
        agg.checkpoint(T0 + 10);
        let before = agg.clone();
        agg.remove(100 * UNIT, T0 + 10);
        assert_eq!(agg, before);
        assert!(agg.line().is_zero());
    }

    #[test]
    fn remove_live_lock_restores_line() {
        let mut agg = PowerAggregate::new(T0);
        agg.insert(100 * UNIT, T0 + 1_000);
        let before = agg.clone();
        agg.insert(5 * UNIT, T0 + 500);
        agg.remove(5 * UNIT, T0 + 500);
        assert_eq!(agg, before);
    }

    #[test]
    fn info_reproduces_total() {
        let mut agg = PowerAggregate::new(T0);
        agg.insert(100 * UNIT, T0 + MAX_LOCK_DURATION);
        agg.insert(200 * UNIT, T0 + MAX_LOCK_DURATION / 2);
        let info = agg.info();
        let t = T0 + MAX_LOCK_DURATION / 4;
        assert_eq!(info.power_at(t), agg.total_power_at(t));
    }

    #[test]
    fn offset_and_slope_are_in_power_units() {
        let mut agg = PowerAggregate::new(T0);
        agg.insert(MAX_LOCK_DURATION as u128 * UNIT, T0 + MAX_LOCK_DURATION);
        let info = agg.info();
        // One full-length lock of MAX * UNIT loses exactly UNIT per second.
        assert_eq!(info.slope, UNIT);
        assert_eq!(info.offset, (T0 + MAX_LOCK_DURATION) as u128 * UNIT);
        assert_eq!(info.linear_at(T0), agg.total_power_at(T0));
    }

    proptest! {
        #[test]
        fn aggregate_matches_sum_of_individuals(
            locks in prop::collection::vec((1u128..1_000_000 * UNIT, 1u64..=MAX_LOCK_DURATION), 1..12),
            offsets in prop::collection::vec(0u64..=MAX_LOCK_DURATION, 1..6),
        ) {
            let mut agg = PowerAggregate::new(T0);
            for (amount, duration) in &locks {
                agg.insert(*amount, T0 + duration);
            }
            for offset in offsets {
                let t = T0 + offset;
                let individual: Balance = locks
                    .iter()
                    .map(|(a, d)| ve_power(*a, *d, offset))
                    .sum();
                let total = agg.total_power_at(t);
                // floor of the sum vs sum of floors
                prop_assert!(total >= individual);
                prop_assert!(total - individual < locks.len() as u128);
            }
        }

        #[test]
        fn total_follows_offset_minus_slope_t(
            locks in prop::collection::vec((1u128..1_000_000 * UNIT, 1u64..=MAX_LOCK_DURATION), 1..12),
            offset in 0u64..=MAX_LOCK_DURATION,
        ) {
            let mut agg = PowerAggregate::new(T0);
            for (amount, duration) in &locks {
                agg.insert(*amount, T0 + duration);
            }
            let t = T0 + offset;
            let info = agg.info_at(t);
            let total = agg.total_power_at(t);
            let linear = info.linear_at(t);
            prop_assert_eq!(info.power_at(t), total);
            prop_assert!(linear + 1 >= total);
            prop_assert!(linear <= total + t as u128 + 1);
        }
    }
}
