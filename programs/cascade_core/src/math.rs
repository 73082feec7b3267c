// programs/cascade_core/src/math.rs
//
// Fixed-point helpers shared by every Cascade program.
// All intermediates are u128 so `a * b` never overflows for u64 inputs.

use crate::constants::{BPS_DENOMINATOR, SECONDS_PER_YEAR};

/// Rounding direction for share/asset conversions.
/// Conversions always round in favor of the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// Compute `a * b / c` with explicit rounding.
/// Returns `None` on division by zero or if the result does not fit in u64.
pub fn mul_div(a: u64, b: u64, c: u64, rounding: Rounding) -> Option<u64> {
    if c == 0 {
        return None;
    }
    let numerator = (a as u128).checked_mul(b as u128)?;
    let denominator = c as u128;
    let quotient = numerator / denominator;
    let result = match rounding {
        Rounding::Down => quotient,
        Rounding::Up if numerator % denominator != 0 => quotient.checked_add(1)?,
        Rounding::Up => quotient,
    };
    u64::try_from(result).ok()
}

/// `amount * bps / 10_000`, rounded down.
pub fn bps_of(amount: u64, bps: u16) -> Option<u64> {
    mul_div(amount, bps as u64, BPS_DENOMINATOR, Rounding::Down)
}

/// Pro-rate an annual basis-point rate over `elapsed` seconds:
/// `amount * bps * elapsed / (10_000 * SECONDS_PER_YEAR)`, rounded down.
pub fn prorate_annual_bps(amount: u64, bps: u16, elapsed: i64) -> Option<u64> {
    if elapsed <= 0 || bps == 0 || amount == 0 {
        return Some(0);
    }
    let numerator = (amount as u128)
        .checked_mul(bps as u128)?
        .checked_mul(elapsed as u128)?;
    let denominator = (BPS_DENOMINATOR as u128) * (SECONDS_PER_YEAR as u128);
    u64::try_from(numerator / denominator).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mul_div_rounding() {
        assert_eq!(mul_div(10, 3, 4, Rounding::Down), Some(7));
        assert_eq!(mul_div(10, 3, 4, Rounding::Up), Some(8));
        // Exact division never rounds up
        assert_eq!(mul_div(10, 4, 4, Rounding::Up), Some(10));
    }

    #[test]
    fn test_mul_div_zero_denominator() {
        assert_eq!(mul_div(1, 1, 0, Rounding::Down), None);
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // u64::MAX * u64::MAX / u64::MAX fits because of the u128 intermediate
        assert_eq!(
            mul_div(u64::MAX, u64::MAX, u64::MAX, Rounding::Down),
            Some(u64::MAX)
        );
        assert_eq!(mul_div(u64::MAX, 2, 1, Rounding::Down), None);
    }

    #[test]
    fn test_bps_of() {
        assert_eq!(bps_of(10_000, 6_000), Some(6_000));
        assert_eq!(bps_of(999, 1), Some(0));
    }

    #[test]
    fn test_prorate_annual_thirty_days() {
        // 10,000 USDC (6 decimals) at 3% for 30 days
        let senior = 10_000_000_000u64;
        let accrued = prorate_annual_bps(senior, 300, 30 * 86_400).unwrap();
        assert_eq!(accrued, 24_657_534);
    }

    #[test]
    fn test_prorate_annual_non_positive_elapsed() {
        assert_eq!(prorate_annual_bps(1_000, 300, 0), Some(0));
        assert_eq!(prorate_annual_bps(1_000, 300, -5), Some(0));
    }
}
