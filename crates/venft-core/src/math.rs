//! 256-bit helpers.
//!
//! Balances fit in `u128`, but `amount * timestamp` and accumulator products
//! do not, so intermediates are widened to `U256` and narrowed on the way out.

pub use alloy_primitives::U256;

use crate::types::Balance;

#[inline]
pub fn wide(x: u128) -> U256 {
    U256::from(x)
}

/// Narrow to `u128`, saturating at `u128::MAX`.
#[inline]
pub fn narrow(x: U256) -> u128 {
    u128::try_from(x).unwrap_or(u128::MAX)
}

/// floor(a * b / d). `d == 0` yields 0.
pub fn mul_div_floor(a: u128, b: u128, d: u128) -> Balance {
    if d == 0 {
        return 0;
    }
    narrow(wide(a) * wide(b) / wide(d))
}

/// ceil(a * b / d). `d == 0` yields 0.
pub fn mul_div_ceil(a: u128, b: u128, d: u128) -> Balance {
    if d == 0 {
        return 0;
    }
    let num = wide(a) * wide(b);
    let d = wide(d);
    let q = num / d;
    if q * d == num {
        narrow(q)
    } else {
        narrow(q + U256::from(1u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_and_ceil() {
        assert_eq!(mul_div_floor(7, 3, 2), 10);
        assert_eq!(mul_div_ceil(7, 3, 2), 11);
        assert_eq!(mul_div_ceil(6, 3, 2), 9);
        assert_eq!(mul_div_floor(5, 5, 0), 0);
    }

    #[test]
    fn wide_products_do_not_overflow() {
        let big = u128::MAX / 2;
        assert_eq!(mul_div_floor(big, 1_000_000, 1_000_000), big);
        assert_eq!(mul_div_floor(u128::MAX, 2, 1), u128::MAX);
    }
}
