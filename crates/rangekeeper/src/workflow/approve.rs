//! `Approve(token, spender, amount)`.

use super::{PrimitiveOutcome, PrimitiveResult, TxRecord};
use crate::chain::{Chain, SendOptions, Value};
use crate::contracts::methods;
use crate::error::CoreError;
use crate::ledger::FinancialCounters;
use crate::report::{Report, ReportKind, ReportSink};
use crate::supervisor::Phase;
use alloy_primitives::{Address, U256};

/// Reads `allowance(owner, spender)`; submits `approve(spender, amount)`
/// only if the current allowance is insufficient.
pub async fn approve(
    chain: &dyn Chain,
    token: Address,
    owner: Address,
    spender: Address,
    amount: U256,
    counters: &mut FinancialCounters,
    reports: &ReportSink,
    phase: Phase,
    at: u64,
) -> PrimitiveResult<()> {
    let allowance_values = chain
        .call(
            token,
            methods::ALLOWANCE,
            &[Value::Address(owner), Value::Address(spender)],
        )
        .await?;
    let current_allowance = allowance_values
        .first()
        .ok_or_else(|| CoreError::Transient("empty allowance() response".into()))?
        .as_uint()?;

    if current_allowance >= amount {
        return Ok(PrimitiveOutcome::new(Vec::new(), ()));
    }

    let tx_hash = chain
        .send(
            token,
            methods::APPROVE,
            &[Value::Address(spender), Value::Uint(amount)],
            SendOptions::default(),
        )
        .await?;
    reports.emit(Report::new(
        at,
        phase,
        ReportKind::GasCost,
        format!("submitted approve({spender}, {amount})"),
    ));

    let receipt = chain.wait(tx_hash).await?;
    if receipt.status != crate::chain::TxStatus::Success {
        return Err(CoreError::TransactionReverted {
            tx_hash: receipt.tx_hash.to_string(),
            reason: "approve reverted".into(),
        });
    }

    let record = TxRecord::from_receipt(&receipt, "approve", at);
    counters.add_gas(record.gas_cost);
    reports.emit(
        Report::new(at, phase, ReportKind::GasCost, "approve confirmed")
            .with_gas(record.gas_cost, counters.cumulative_gas),
    );

    Ok(PrimitiveOutcome::new(vec![record], ()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::test_support::FakeChain;
    use crate::report::channel;
    use alloy_primitives::Address;

    #[tokio::test]
    async fn sufficient_allowance_skips_transaction() {
        let chain = FakeChain::new();
        chain.push_call_response(Ok(vec![Value::Uint(U256::from(1_000u64))]));
        let mut counters = FinancialCounters::default();
        let (sink, _stream) = channel();
        let outcome = approve(
            &chain,
            Address::ZERO,
            Address::ZERO,
            Address::ZERO,
            U256::from(100u64),
            &mut counters,
            &sink,
            Phase::Initializing,
            0,
        )
        .await
        .unwrap();
        assert!(outcome.tx_records.is_empty());
        assert!(chain.sends.lock().is_empty());
    }

    #[tokio::test]
    async fn insufficient_allowance_submits_approve() {
        let chain = FakeChain::new();
        chain.push_call_response(Ok(vec![Value::Uint(U256::ZERO)]));
        let mut counters = FinancialCounters::default();
        let (sink, _stream) = channel();
        let outcome = approve(
            &chain,
            Address::ZERO,
            Address::ZERO,
            Address::ZERO,
            U256::from(100u64),
            &mut counters,
            &sink,
            Phase::Initializing,
            0,
        )
        .await
        .unwrap();
        assert_eq!(outcome.tx_records.len(), 1);
        assert_eq!(chain.sends.lock().len(), 1);
        assert!(counters.cumulative_gas > U256::ZERO);
    }
}
