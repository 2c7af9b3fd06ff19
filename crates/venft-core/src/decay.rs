//! The decay law.
//!
//! Voting power falls linearly from `amount * duration / MAX_LOCK_DURATION`
//! at creation to zero at expiry:
//!
//!   power = amount * max(duration - elapsed, 0) / MAX_LOCK_DURATION   (floor)
//!
//! Every other component derives power from [`ve_power`]; nothing recomputes
//! decay on its own.

use crate::constants::MAX_LOCK_DURATION;
use crate::math::{mul_div_ceil, mul_div_floor};
use crate::types::{Balance, Seconds};

/// Voting power of `amount` locked for `duration`, `elapsed` seconds in.
pub fn ve_power(amount: Balance, duration: Seconds, elapsed: Seconds) -> Balance {
    let remaining = duration.saturating_sub(elapsed);
    mul_div_floor(amount, remaining as u128, MAX_LOCK_DURATION as u128)
}

/// Smallest duration whose fresh power for `amount` reaches `power`, capped
/// at `MAX_LOCK_DURATION`. Used to back-compute the duration of a merged lock.
pub fn duration_for_power(power: Balance, amount: Balance) -> Seconds {
    if amount == 0 {
        return 0;
    }
    let secs = mul_div_ceil(power, MAX_LOCK_DURATION as u128, amount);
    secs.min(MAX_LOCK_DURATION as u128) as Seconds
}
