//! `Withdraw(tokenId, slippageBps)`. Atomicity across
//! `decreaseLiquidity`/`collect`/`burn` is guaranteed by the multicall —
//! either all three land or none do.

use super::{PrimitiveOutcome, PrimitiveResult, TxRecord};
use crate::chain::{Chain, SendOptions, Value};
use crate::contracts::methods;
use crate::error::CoreError;
use crate::ledger::FinancialCounters;
use crate::math::min_amount;
use crate::report::{Report, ReportKind, ReportSink};
use crate::supervisor::Phase;
use alloy_primitives::{Address, U256};

pub const WITHDRAW_DEADLINE_SECS: u64 = 20 * 60;
/// `amount{0,1}Max` sentinel meaning "collect everything owed" (spec
/// §4.G, `2^128 - 1`).
const COLLECT_ALL: u128 = u128::MAX;

#[derive(Debug, Clone, Copy)]
pub struct WithdrawResult {
    pub amount0: U256,
    pub amount1: U256,
}

pub async fn withdraw(
    chain: &dyn Chain,
    position_manager: Address,
    wallet: Address,
    token_id: U256,
    slippage_bps: u32,
    counters: &mut FinancialCounters,
    reports: &ReportSink,
    phase: Phase,
    at: u64,
) -> PrimitiveResult<WithdrawResult> {
    let position_values = chain
        .call(position_manager, methods::POSITIONS, &[Value::Uint(token_id)])
        .await?;
    let fields = position_values
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

    let min0 = min_amount(tokens_owed0, slippage_bps);
    let min1 = min_amount(tokens_owed1, slippage_bps);
    let deadline = at + WITHDRAW_DEADLINE_SECS;

    let tx_hash = chain
        .send(
            position_manager,
            methods::MULTICALL,
            &[Value::Array(vec![
                Value::Tuple(vec![
                    Value::Bytes(methods::DECREASE_LIQUIDITY.as_bytes().to_vec().into()),
                    Value::Uint(token_id),
                    Value::Uint(liquidity),
                    Value::Uint(min0),
                    Value::Uint(min1),
                    Value::Uint(U256::from(deadline)),
                ]),
                Value::Tuple(vec![
                    Value::Bytes(methods::COLLECT.as_bytes().to_vec().into()),
                    Value::Uint(token_id),
                    Value::Address(wallet),
                    Value::Uint(U256::from(COLLECT_ALL)),
                    Value::Uint(U256::from(COLLECT_ALL)),
                ]),
                Value::Tuple(vec![
                    Value::Bytes(methods::BURN.as_bytes().to_vec().into()),
                    Value::Uint(token_id),
                ]),
            ])],
            SendOptions::default(),
        )
        .await?;
    reports.emit(Report::new(
        at,
        phase,
        ReportKind::GasCost,
        format!("submitted withdraw multicall for {token_id}"),
    ));

    let receipt = chain.wait(tx_hash).await?;
    if receipt.status != crate::chain::TxStatus::Success {
        return Err(CoreError::TransactionReverted {
            tx_hash: receipt.tx_hash.to_string(),
            reason: "withdraw multicall reverted".into(),
        });
    }

    let record = TxRecord::from_receipt(&receipt, "withdraw", at);
    counters.add_gas(record.gas_cost);

    reports.emit(
        Report::new(at, phase, ReportKind::GasCost, "position withdrawn")
            .with_token_id(token_id)
            .with_gas(record.gas_cost, counters.cumulative_gas),
    );

    Ok(PrimitiveOutcome::new(
        vec![record],
        WithdrawResult {
            amount0: tokens_owed0,
            amount1: tokens_owed1,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::test_support::FakeChain;
    use crate::report::channel;

    #[tokio::test]
    async fn withdraw_reads_owed_amounts_and_confirms() {
        let chain = FakeChain::new();
        chain.push_call_response(Ok(vec![Value::Tuple(vec![
            Value::Uint(U256::from(500u64)),
            Value::Uint(U256::from(10u64)),
            Value::Uint(U256::from(20u64)),
        ])]));
        let mut counters = FinancialCounters::default();
        let (sink, _stream) = channel();
        let outcome = withdraw(
            &chain,
            Address::ZERO,
            Address::ZERO,
            U256::from(1u64),
            100,
            &mut counters,
            &sink,
            Phase::RebalancingRequired,
            0,
        )
        .await
        .unwrap();
        assert_eq!(outcome.domain_outputs.amount0, U256::from(10u64));
        assert_eq!(outcome.domain_outputs.amount1, U256::from(20u64));
        assert_eq!(outcome.tx_records.len(), 1);
    }
}
