//! Fixed-point Math for the lending pool
//!
//! Ray (1e27), wad (1e18) and basis-point arithmetic. Every helper takes an
//! explicit rounding direction and fails closed: products are formed in 256
//! bits and any result that does not fit back into `u128` is an error.

use primitive_types::U256;

use crate::constants::precision::{PERCENTAGE_FACTOR, RAY, WAD};
use crate::constants::time::SECONDS_PER_YEAR;
use crate::errors::{LendError, LendResult};

/// Rounding direction for a division
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero (floor)
    Down,
    /// Away from zero (ceil)
    Up,
}

/// Calculate `a * b / denominator` with a 256-bit intermediate
pub fn mul_div(a: u128, b: u128, denominator: u128, rounding: Rounding) -> LendResult<u128> {
    if denominator == 0 {
        return Err(LendError::DivisionByZero);
    }

    let product = U256::from(a) * U256::from(b);
    let den = U256::from(denominator);
    let mut quotient = product / den;

    if rounding == Rounding::Up && !(product % den).is_zero() {
        quotient = quotient
            .checked_add(U256::one())
            .ok_or(LendError::Overflow)?;
    }

    if quotient > U256::from(u128::MAX) {
        return Err(LendError::Overflow);
    }
    Ok(quotient.as_u128())
}

/// Multiply two ray values (or an amount by a ray)
pub fn ray_mul(a: u128, b: u128, rounding: Rounding) -> LendResult<u128> {
    mul_div(a, b, RAY, rounding)
}

/// Divide by a ray value
pub fn ray_div(a: u128, b: u128, rounding: Rounding) -> LendResult<u128> {
    mul_div(a, RAY, b, rounding)
}

/// Multiply two wad values
pub fn wad_mul(a: u128, b: u128, rounding: Rounding) -> LendResult<u128> {
    mul_div(a, b, WAD, rounding)
}

/// Divide by a wad value
pub fn wad_div(a: u128, b: u128, rounding: Rounding) -> LendResult<u128> {
    mul_div(a, WAD, b, rounding)
}

/// Apply a basis-point percentage: `value * bps / 10000`
pub fn percent_mul(value: u128, bps: u64, rounding: Rounding) -> LendResult<u128> {
    mul_div(value, bps as u128, PERCENTAGE_FACTOR as u128, rounding)
}

/// Inverse of `percent_mul`: `value * 10000 / bps`
pub fn percent_div(value: u128, bps: u64, rounding: Rounding) -> LendResult<u128> {
    mul_div(value, PERCENTAGE_FACTOR as u128, bps as u128, rounding)
}

/// Linear interest factor over `[last, now]`
///
/// factor = RAY + rate * Δt / SECONDS_PER_YEAR
pub fn linear_interest(rate: u128, last: u64, now: u64) -> LendResult<u128> {
    if now < last {
        return Err(LendError::TimeWentBackwards { last, now });
    }
    let elapsed = (now - last) as u128;
    let accrued = mul_div(rate, elapsed, SECONDS_PER_YEAR as u128, Rounding::Down)?;
    safe_add(RAY, accrued)
}

/// 10^decimals as u128
pub fn pow10(decimals: u8) -> LendResult<u128> {
    10u128.checked_pow(decimals as u32).ok_or(LendError::Overflow)
}

/// Value of `amount` (with `decimals`) in oracle base units at `price`
pub fn to_base_value(amount: u128, price: u128, decimals: u8, rounding: Rounding) -> LendResult<u128> {
    mul_div(amount, price, pow10(decimals)?, rounding)
}

/// Amount (with `decimals`) worth `value` oracle base units at `price`
pub fn from_base_value(value: u128, price: u128, decimals: u8, rounding: Rounding) -> LendResult<u128> {
    if price == 0 {
        return Err(LendError::PriceZero { what: "conversion" });
    }
    mul_div(value, pow10(decimals)?, price, rounding)
}

// ============ Safe Math Helpers ============

/// Safe addition
pub fn safe_add(a: u128, b: u128) -> LendResult<u128> {
    a.checked_add(b).ok_or(LendError::Overflow)
}

/// Safe subtraction
pub fn safe_sub(a: u128, b: u128) -> LendResult<u128> {
    a.checked_sub(b).ok_or(LendError::Underflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mul_div_rounding() {
        assert_eq!(mul_div(10, 1, 3, Rounding::Down).unwrap(), 3);
        assert_eq!(mul_div(10, 1, 3, Rounding::Up).unwrap(), 4);
        assert_eq!(mul_div(9, 1, 3, Rounding::Up).unwrap(), 3);
    }

    #[test]
    fn test_mul_div_large_intermediate() {
        // 1e30 * 1e27 overflows u128 but the quotient fits
        let amount = 1_000_000_000_000u128 * WAD;
        assert_eq!(ray_mul(amount, RAY, Rounding::Down).unwrap(), amount);
        assert_eq!(ray_div(amount, RAY, Rounding::Down).unwrap(), amount);
    }

    #[test]
    fn test_mul_div_fails_closed() {
        assert_eq!(mul_div(u128::MAX, 2, 1, Rounding::Down), Err(LendError::Overflow));
        assert_eq!(mul_div(1, 1, 0, Rounding::Down), Err(LendError::DivisionByZero));
    }

    #[test]
    fn test_percent_mul() {
        assert_eq!(percent_mul(1_000, 4_000, Rounding::Down).unwrap(), 400);
        assert_eq!(percent_mul(3, 5_000, Rounding::Down).unwrap(), 1);
        assert_eq!(percent_mul(3, 5_000, Rounding::Up).unwrap(), 2);
        assert_eq!(percent_div(400, 4_000, Rounding::Down).unwrap(), 1_000);
    }

    #[test]
    fn test_linear_interest() {
        // 10% APR for a full year
        let rate = RAY / 10;
        let factor = linear_interest(rate, 0, SECONDS_PER_YEAR).unwrap();
        assert_eq!(factor, RAY + RAY / 10);

        // No time elapsed
        assert_eq!(linear_interest(rate, 100, 100).unwrap(), RAY);

        // Backwards time rejected
        assert!(matches!(
            linear_interest(rate, 100, 99),
            Err(LendError::TimeWentBackwards { .. })
        ));
    }

    #[test]
    fn test_base_value_conversion() {
        // 2 tokens (18 decimals) at 1.5 base units each = 3 base units
        let amount = 2 * WAD;
        let price = WAD + WAD / 2;
        let value = to_base_value(amount, price, 18, Rounding::Down).unwrap();
        assert_eq!(value, 3 * WAD);
        assert_eq!(from_base_value(value, price, 18, Rounding::Down).unwrap(), amount);

        // 6-decimal asset priced at 0.0005 base units
        let usdc = 1_000_000u128;
        let usdc_price = WAD / 2_000;
        assert_eq!(to_base_value(usdc, usdc_price, 6, Rounding::Down).unwrap(), WAD / 2_000);
    }

    #[test]
    fn test_safe_math() {
        assert_eq!(safe_add(1, 2).unwrap(), 3);
        assert_eq!(safe_add(u128::MAX, 1), Err(LendError::Overflow));
        assert_eq!(safe_sub(1, 2), Err(LendError::Underflow));
    }

    proptest! {
        #[test]
        fn prop_linear_interest_never_below_one(rate in 0u128..(RAY * 10), dt in 0u64..(10 * SECONDS_PER_YEAR)) {
            let factor = linear_interest(rate, 1_000, 1_000 + dt).unwrap();
            prop_assert!(factor >= RAY);
        }

        #[test]
        fn prop_floor_never_exceeds_ceil(a in 0u128..u64::MAX as u128, b in 0u128..u64::MAX as u128, d in 1u128..u64::MAX as u128) {
            let down = mul_div(a, b, d, Rounding::Down).unwrap();
            let up = mul_div(a, b, d, Rounding::Up).unwrap();
            prop_assert!(up >= down);
            prop_assert!(up - down <= 1);
        }
    }
}
