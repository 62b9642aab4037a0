//! Pure, deterministic tick/price arithmetic.
//!
//! Nothing in this module touches the network or the clock. Every
//! comparison that matters for correctness (stability threshold, rebalance
//! ratio) is performed as integer cross-multiplication; `price()` exists
//! only to express `sqrtPriceX96² / 2^192` exactly, never as a float.

use crate::error::CoreError;
use alloy_primitives::U256;

/// Uniswap-V3-style protocol tick bound.
pub const MAX_TICK: i32 = 887_272;
pub const MIN_TICK: i32 = -887_272;

/// 512-bit integer used for intermediate price arithmetic. `sqrtPriceX96`
/// is bounded by the protocol to roughly 2^160, so its square (needed for
/// `price = sqrtPriceX96² / 2^192`) can exceed a 256-bit integer; widening
/// to 512 bits keeps every intermediate product exact instead of reaching
/// for floating point.
pub type WideUint = ruint::Uint<512, 8>;

fn widen(x: U256) -> WideUint {
    let limbs = x.as_limbs();
    WideUint::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3], 0, 0, 0, 0])
}

/// Narrow a wide value back to `U256`. Returns `None` if it does not fit,
/// which callers treat as a validation failure rather than silent
/// truncation.
fn narrow(x: WideUint) -> Option<U256> {
    let limbs = x.as_limbs();
    if limbs[4..].iter().any(|&l| l != 0) {
        return None;
    }
    Some(U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]]))
}

/// `price = sqrtPriceX96² / 2^192`, kept as an exact rational (numerator
/// over the implicit, shared denominator `2^192`) so that ratio
/// comparisons never lose precision. Used only for
/// comparisons and for the rebalance calculator's value conversion — never
/// compared via floating point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Price {
    numerator_q192: WideUint,
}

const Q192: u32 = 192;

impl Price {
    pub fn from_sqrt_price_x96(sqrt_price_x96: U256) -> Self {
        let w = widen(sqrt_price_x96);
        Self {
            numerator_q192: w * w,
        }
    }

    /// `amount0 * price`, i.e. `amount0 * numerator_q192 / 2^192`, truncated
    /// toward zero. Assumes `amount0` and the pool's sqrt price both stay
    /// within realistic ERC-20/production-pool magnitudes (comfortably
    /// under 2^160 each) so the 512-bit intermediate never overflows;
    /// returns `Validation` if it would.
    pub fn convert(&self, amount0: U256) -> Result<U256, CoreError> {
        let product = widen(amount0) * self.numerator_q192;
        let shifted = product >> (Q192 as usize);
        narrow(shifted)
            .ok_or_else(|| CoreError::Validation("price conversion overflowed".to_string()))
    }

    /// `|self − other| / other <= threshold_ppm / 1_000_000`, evaluated by
    /// cross-multiplication so no division ever rounds the comparison.
    pub fn within_threshold_ppm(&self, other: &Price, threshold_ppm: u32) -> bool {
        let (hi, lo) = if self.numerator_q192 >= other.numerator_q192 {
            (self.numerator_q192, other.numerator_q192)
        } else {
            (other.numerator_q192, self.numerator_q192)
        };
        let diff = hi - lo;
        let lhs = diff * WideUint::from(1_000_000u64);
        let rhs = other.numerator_q192 * WideUint::from(threshold_ppm as u64);
        lhs <= rhs
    }

    /// Inverse of [`Price::convert`]: the token0 amount whose value (in
    /// token1) is `value_in_1`, i.e. `value_in_1 * 2^192 / numerator_q192`,
    /// truncating toward zero.
    pub fn invert_convert(&self, value_in_1: U256) -> Result<U256, CoreError> {
        if self.numerator_q192.is_zero() {
            return Err(CoreError::Validation("price is zero".to_string()));
        }
        let scaled = widen(value_in_1) << (Q192 as usize);
        let result = scaled / self.numerator_q192;
        narrow(result)
            .ok_or_else(|| CoreError::Validation("price inversion overflowed".to_string()))
    }

    /// Test-only constructor for an exact `numerator/denominator` price,
    /// bypassing the sqrtPriceX96 derivation so rebalance tests can assert
    /// against round human prices.
    #[cfg(test)]
    pub fn for_test_ratio(numerator: U256, denominator: U256) -> Price {
        let numerator_q192 = (widen(numerator) << (Q192 as usize)) / widen(denominator);
        Price { numerator_q192 }
    }
}

/// Compute the symmetric tick range `[lower, upper]` centered on
/// `current_tick`:
/// `half = width/2`, `base = currentTick / spacing` (truncating toward
/// zero), `lower = (base - half) * spacing`, `upper = (base + half) *
/// spacing`. `width` must be even; odd widths are rejected upstream by the
/// caller (config validation), but this function re-checks defensively
/// since it is also exercised directly by tests.
pub fn tick_bounds(current_tick: i32, width: i32, spacing: i32) -> Result<(i32, i32), CoreError> {
    if width % 2 != 0 {
        return Err(CoreError::Validation(format!(
            "range width {width} must be even"
        )));
    }
    if spacing <= 0 {
        return Err(CoreError::Validation("tick spacing must be positive".into()));
    }
    let half = width / 2;
    let base = current_tick / spacing; // Rust's `/` truncates toward zero, matching spec.
    let lower = (base - half) * spacing;
    let upper = (base + half) * spacing;
    if lower < MIN_TICK || upper > MAX_TICK {
        return Err(CoreError::Validation(format!(
            "tick bounds ({lower}, {upper}) exceed protocol range"
        )));
    }
    Ok((lower, upper))
}

/// `currentTick < tickLower || currentTick > tickUpper`.
pub fn is_out_of_range(current_tick: i32, tick_lower: i32, tick_upper: i32) -> bool {
    current_tick < tick_lower || current_tick > tick_upper
}

/// `desired * (10000 - slippageBps) / 10000`, truncating. `slippageBps`
/// must be in `[1, 5000]`; validated by the caller (config / call site),
/// not here, so this stays a pure function usable in isolation by tests.
pub fn min_amount(desired: U256, slippage_bps: u32) -> U256 {
    let keep = U256::from(10_000u32.saturating_sub(slippage_bps));
    desired.saturating_mul(keep) / U256::from(10_000u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_bounds_symmetry() {
        let (lower, upper) = tick_bounds(10_000, 6, 200).unwrap();
        assert_eq!((lower, upper), (9_400, 10_600));
        let (lower, upper) = tick_bounds(10_000, 2, 200).unwrap();
        assert_eq!((lower, upper), (9_800, 10_200));
    }

    #[test]
    fn tick_bounds_width_must_be_even() {
        assert!(tick_bounds(10_000, 5, 200).is_err());
    }

    #[test]
    fn tick_bounds_always_multiple_of_spacing_and_symmetric_width() {
        for t in [-887_271, -123_456, 0, 1, 500_000, 887_271] {
            for w in [2, 4, 10, 100] {
                let spacing = 60;
                if let Ok((lower, upper)) = tick_bounds(t, w, spacing) {
                    assert_eq!(upper - lower, w * spacing);
                    assert_eq!(lower % spacing, 0);
                    assert_eq!(upper % spacing, 0);
                }
            }
        }
    }

    #[test]
    fn out_of_range_matches_bounds_round_trip() {
        let (lower, upper) = tick_bounds(10_000, 6, 200).unwrap();
        assert!(!is_out_of_range(lower, lower, upper));
        assert!(!is_out_of_range(upper, lower, upper));
        assert!(is_out_of_range(lower - 1, lower, upper));
        assert!(is_out_of_range(upper + 1, lower, upper));
    }

    #[test]
    fn out_of_range_detection_scenario() {
        assert!(is_out_of_range(-251_000, -250_000, -248_000));
    }

    #[test]
    fn slippage_minimum_scenario() {
        assert_eq!(
            min_amount(U256::from(1_000_000u64), 500),
            U256::from(950_000u64)
        );
    }

    #[test]
    fn slippage_monotonic_and_bounded() {
        let desired = U256::from(1_000_000_000u64);
        assert_eq!(min_amount(desired, 0), desired);
        let mut prev = desired;
        for bps in [1, 10, 100, 1000, 5000] {
            let got = min_amount(desired, bps);
            assert!(got <= prev);
            assert!(got <= desired);
            prev = got;
        }
    }

    #[test]
    fn price_ordering_and_threshold() {
        let p1 = Price::from_sqrt_price_x96(U256::from(1_000_000_000_000u64));
        let p2 = Price::from_sqrt_price_x96(U256::from(1_000_001_000_000u64));
        assert!(p1 < p2);
        // ~2ppm relative delta in sqrtPrice implies ~4ppm in price; comfortably
        // inside a 1% (10_000ppm) threshold.
        assert!(p1.within_threshold_ppm(&p2, 10_000));
        assert!(!p1.within_threshold_ppm(&p2, 1));
    }

    #[test]
    fn price_convert_matches_manual_ratio() {
        // price = 1 (sqrtPriceX96 = 2^96) so converting amount0 should be a no-op.
        let one_x96 = U256::from(1u64) << 96;
        let price = Price::from_sqrt_price_x96(one_x96);
        let amount0 = U256::from(123_456_789u64);
        assert_eq!(price.convert(amount0).unwrap(), amount0);
    }
}
