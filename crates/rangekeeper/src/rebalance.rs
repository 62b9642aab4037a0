//! Given current balances and pool price, decides direction and size of
//! swap needed to reach a 1:1 value ratio.

use crate::math::Price;
use alloy_primitives::U256;

/// Direction of the swap the calculator recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// Swap token1 into token0.
    Token1ToToken0,
    /// Swap token0 into token1.
    Token0ToToken1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalancePlan {
    pub direction: SwapDirection,
    pub amount_in: U256,
}

/// Below this absolute value-in-token1 delta, no swap is issued — avoids
/// churning on dust-sized imbalances.
pub const DEFAULT_DUST_TOLERANCE_WEI: u64 = 1_000;

/// Compute the swap (if any) needed to bring `(balance0, balance1)` to an
/// equal value split:
/// 1. `value0_in_1 = balance0 * price`, `total_in_1 = value0_in_1 +
///    balance1`, `target_each = total_in_1 / 2`.
/// 2. If `balance1 > target_each`: swap the excess token1 into token0.
/// 3. Else if `value0_in_1 > target_each`: swap the excess token0 value
///    into token1.
/// 4. Else: no swap.
pub fn plan_rebalance(
    balance0: U256,
    balance1: U256,
    price: &Price,
    dust_tolerance_wei: U256,
) -> Result<Option<RebalancePlan>, crate::error::CoreError> {
    let value0_in_1 = price.convert(balance0)?;
    let total_in_1 = value0_in_1 + balance1;
    let target_each = total_in_1 / U256::from(2u8);

    if balance1 > target_each {
        let delta = balance1 - target_each;
        if delta <= dust_tolerance_wei {
            return Ok(None);
        }
        return Ok(Some(RebalancePlan {
            direction: SwapDirection::Token1ToToken0,
            amount_in: delta,
        }));
    }

    if value0_in_1 > target_each {
        let delta_in_1 = value0_in_1 - target_each;
        if delta_in_1 <= dust_tolerance_wei {
            return Ok(None);
        }
        // Convert the token1-denominated excess back into a token0 amount:
        // amount0 = delta_in_1 / price. Since `Price::convert` only
        // multiplies, invert by solving amount0 * price = delta_in_1 via
        // a direct ratio on the same sqrtPrice-derived numerator.
        let amount0 = invert_convert(price, delta_in_1)?;
        if amount0.is_zero() {
            return Ok(None);
        }
        return Ok(Some(RebalancePlan {
            direction: SwapDirection::Token0ToToken1,
            amount_in: amount0,
        }));
    }

    Ok(None)
}

/// `value_in_1 / price`, i.e. the token0 amount whose value is
/// `value_in_1`. Implemented by scaling up before dividing to preserve
/// precision, truncating toward zero like the rest of this module's
/// integer arithmetic.
fn invert_convert(price: &Price, value_in_1: U256) -> Result<U256, crate::error::CoreError> {
    price.invert_convert(value_in_1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn balanced_rebalance_scenario() {
        let balance0 = U256::from(1_000_000_000_000_000_000u128); // 1e18
        let balance1 = U256::from(30_000_000u64); // 30e6
        // price = 25e6 / 1e18, expressed via sqrtPriceX96 so that
        // Price::convert(1e18) == 25_000_000.
        let price = Price::for_test_ratio(U256::from(25_000_000u64), balance0);
        let plan = plan_rebalance(balance0, balance1, &price, U256::from(1u64))
            .unwrap()
            .expect("expected a swap");
        assert_eq!(plan.direction, SwapDirection::Token1ToToken0);
        assert_eq!(plan.amount_in, U256::from(2_500_000u64));
    }

    #[test]
    fn already_balanced_within_dust_needs_no_swap() {
        let balance0 = U256::from(0u64);
        let balance1 = U256::from(500u64);
        let price = Price::from_sqrt_price_x96(U256::from(1u64) << 96);
        let plan = plan_rebalance(balance0, balance1, &price, U256::from(1_000u64)).unwrap();
        assert!(plan.is_none());
    }
}
