//! In-memory record of the active position and cumulative financial
//! counters for the active position.

use crate::chain::{Chain, Value};
use crate::contracts::methods;
use crate::error::CoreError;
use alloy_primitives::{Address, U256};
use serde::Serialize;

/// Opaque identifier of a farming program, passed through verbatim when
/// exiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncentiveKey {
    pub reward_token: Address,
    pub bonus_reward_token: Address,
    pub pool: Address,
    pub nonce: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub token_id: U256,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub incentive: Option<IncentiveKey>,
}

/// Snapshot of a position's current token amounts, as read from the NFT
/// manager's `positions(tokenId)`. The ledger does not refresh this
/// automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionSnapshot {
    pub token_id: U256,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: U256,
    pub tokens_owed0: U256,
    pub tokens_owed1: U256,
}

/// Monotonically non-decreasing financial counters. Net P&L is
/// `cumulativeRewards − cumulativeGas − cumulativeSwapFees`, all expressed
/// in native gas-token wei.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinancialCounters {
    pub cumulative_gas: U256,
    pub cumulative_rewards: U256,
    pub cumulative_swap_fees: U256,
}

impl FinancialCounters {
    pub fn add_gas(&mut self, gas_cost: U256) {
        self.cumulative_gas += gas_cost;
    }

    pub fn add_rewards(&mut self, rewards_in_wei: U256) {
        self.cumulative_rewards += rewards_in_wei;
    }

    pub fn add_swap_fees(&mut self, fees_in_wei: U256) {
        self.cumulative_swap_fees += fees_in_wei;
    }

    /// `cumulativeRewards − cumulativeGas − cumulativeSwapFees`, signed
    /// since costs may exceed rewards.
    pub fn net_pnl(&self) -> i128 {
        let rewards: i128 = self.cumulative_rewards.try_into().unwrap_or(i128::MAX);
        let gas: i128 = self.cumulative_gas.try_into().unwrap_or(i128::MAX);
        let fees: i128 = self.cumulative_swap_fees.try_into().unwrap_or(i128::MAX);
        rewards - gas - fees
    }
}

/// Holds at most one active [`Position`] plus the lifetime financial
/// counters. Owned exclusively by the phase supervisor.
#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    position: Option<Position>,
    pub counters: FinancialCounters,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, position: Position) {
        self.position = Some(position);
    }

    pub fn clear(&mut self) {
        self.position = None;
    }

    pub fn current(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn set_incentive(&mut self, incentive: Option<IncentiveKey>) {
        if let Some(p) = self.position.as_mut() {
            p.incentive = incentive;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none()
    }

    /// Reads the active position's current token amounts straight from
    /// the NFT manager. Does not mutate the ledger or
    /// `counters` — the caller decides what, if anything, to do with a
    /// fresh snapshot.
    pub async fn snapshot(
        &self,
        chain: &dyn Chain,
        position_manager: Address,
    ) -> Result<PositionSnapshot, CoreError> {
        let position = self
            .position
            .as_ref()
            .ok_or_else(|| CoreError::Validation("no active position to snapshot".into()))?;

        let response = chain
            .call(
                position_manager,
                methods::POSITIONS,
                &[Value::Uint(position.token_id)],
            )
            .await?;
        let fields = response
            .first()
            .ok_or_else(|| CoreError::Transient("empty positions() response".into()))?
            .as_tuple()?;
        let liquidity = fields
            .first()
            .ok_or_else(|| CoreError::Transient("positions() missing liquidity field".into()))?
            .as_uint()?;
        let tokens_owed0 = fields
            .get(1)
            .ok_or_else(|| CoreError::Transient("positions() missing tokensOwed0".into()))?
            .as_uint()?;
        let tokens_owed1 = fields
            .get(2)
            .ok_or_else(|| CoreError::Transient("positions() missing tokensOwed1".into()))?
            .as_uint()?;

        Ok(PositionSnapshot {
            token_id: position.token_id,
            tick_lower: position.tick_lower,
            tick_upper: position.tick_upper,
            liquidity,
            tokens_owed0,
            tokens_owed1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::test_support::FakeChain;

    #[tokio::test]
    async fn snapshot_reads_current_amounts_through_the_chain() {
        let mut ledger = PositionLedger::new();
        ledger.set(Position {
            token_id: U256::from(1u64),
            tick_lower: -60,
            tick_upper: 60,
            incentive: None,
        });
        let chain = FakeChain::new();
        chain.push_call_response(Ok(vec![Value::Tuple(vec![
            Value::Uint(U256::from(500u64)),
            Value::Uint(U256::from(7u64)),
            Value::Uint(U256::from(9u64)),
        ])]));
        let snapshot = ledger.snapshot(&chain, Address::ZERO).await.unwrap();
        assert_eq!(snapshot.token_id, U256::from(1u64));
        assert_eq!(snapshot.liquidity, U256::from(500u64));
        assert_eq!(snapshot.tokens_owed0, U256::from(7u64));
        assert_eq!(snapshot.tokens_owed1, U256::from(9u64));
    }

    #[tokio::test]
    async fn snapshot_without_a_position_is_a_validation_error() {
        let ledger = PositionLedger::new();
        let chain = FakeChain::new();
        let err = ledger.snapshot(&chain, Address::ZERO).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn starts_empty_and_tracks_set_clear() {
        let mut ledger = PositionLedger::new();
        assert!(ledger.is_empty());
        ledger.set(Position {
            token_id: U256::from(1u64),
            tick_lower: -100,
            tick_upper: 100,
            incentive: None,
        });
        assert!(!ledger.is_empty());
        ledger.clear();
        assert!(ledger.is_empty());
    }

    #[test]
    fn financial_counters_are_non_decreasing_and_net_pnl_matches() {
        let mut c = FinancialCounters::default();
        c.add_gas(U256::from(100u64));
        c.add_rewards(U256::from(50u64));
        c.add_swap_fees(U256::from(10u64));
        assert_eq!(c.net_pnl(), 50 - 100 - 10);
        let gas_before = c.cumulative_gas;
        c.add_gas(U256::from(5u64));
        assert!(c.cumulative_gas >= gas_before);
    }
}
