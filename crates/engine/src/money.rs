//! Checked decimal arithmetic for cost values.
//!
//! Every fallible operation maps to [`HppError::Calculation`], so an overflow
//! or a division by zero fails the calculation instead of producing a value.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{HppError, Result};

/// Decimal places kept for per-unit costs.
pub const COST_SCALE: u32 = 4;

/// Round a per-unit cost to [`COST_SCALE`] places, half away from zero.
#[must_use]
pub fn round_cost(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(COST_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `a + b`, failing on overflow.
///
/// # Errors
///
/// Returns `HppError::Calculation` if the sum is not representable.
pub fn add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| HppError::Calculation(format!("{a} + {b} overflows")))
}

/// `a - b`, failing on overflow.
///
/// # Errors
///
/// Returns `HppError::Calculation` if the difference is not representable.
pub fn sub(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_sub(b)
        .ok_or_else(|| HppError::Calculation(format!("{a} - {b} overflows")))
}

/// `a * b`, failing on overflow.
///
/// # Errors
///
/// Returns `HppError::Calculation` if the product is not representable.
pub fn mul(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| HppError::Calculation(format!("{a} * {b} overflows")))
}

/// `a / b`, failing on division by zero or overflow.
///
/// # Errors
///
/// Returns `HppError::Calculation` if `b` is zero or the quotient is not
/// representable.
pub fn div(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_div(b)
        .ok_or_else(|| HppError::Calculation(format!("{a} / {b} is not representable")))
}

/// Sum an iterator of values, failing on overflow.
///
/// # Errors
///
/// Returns `HppError::Calculation` if any partial sum is not representable.
pub fn sum<I>(values: I) -> Result<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values.into_iter().try_fold(Decimal::ZERO, add)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_cost_half_away_from_zero() {
        assert_eq!(round_cost(Decimal::new(123_455, 5)), Decimal::new(12_346, 4));
        assert_eq!(round_cost(Decimal::new(-123_455, 5)), Decimal::new(-12_346, 4));
    }

    #[test]
    fn test_division_by_zero_is_calculation_error() {
        let err = div(Decimal::ONE, Decimal::ZERO).unwrap_err();
        assert!(matches!(err, HppError::Calculation(_)));
    }

    #[test]
    fn test_overflow_is_calculation_error() {
        assert!(mul(Decimal::MAX, Decimal::TWO).is_err());
        assert!(add(Decimal::MAX, Decimal::ONE).is_err());
    }

    #[test]
    fn test_sum() {
        let total = sum([Decimal::from(2000), Decimal::from(500)]).unwrap();
        assert_eq!(total, Decimal::from(2500));
        assert_eq!(sum(Vec::new()).unwrap(), Decimal::ZERO);
    }
}
