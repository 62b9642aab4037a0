//! `Stake(tokenId, gauge)`.

use super::{PrimitiveOutcome, PrimitiveResult, TxRecord};
use crate::chain::{Chain, SendOptions, Value};
use crate::contracts::methods;
use crate::error::CoreError;
use crate::ledger::FinancialCounters;
use crate::report::{Report, ReportKind, ReportSink};
use crate::supervisor::Phase;
use alloy_primitives::{Address, U256};

pub async fn stake(
    chain: &dyn Chain,
    position_manager: Address,
    gauge: Address,
    wallet: Address,
    token_id: U256,
    counters: &mut FinancialCounters,
    reports: &ReportSink,
    phase: Phase,
    at: u64,
) -> PrimitiveResult<()> {
    let owner_values = chain
        .call(position_manager, methods::OWNER_OF, &[Value::Uint(token_id)])
        .await?;
    let owner = owner_values
        .first()
        .ok_or_else(|| CoreError::Transient("empty ownerOf() response".into()))?
        .as_address()?;
    if owner != wallet {
        return Err(CoreError::OwnershipMismatch {
            token_id,
            expected: wallet,
        });
    }

    let mut tx_records = Vec::new();

    let approved_values = chain
        .call(
            position_manager,
            methods::GET_APPROVED,
            &[Value::Uint(token_id)],
        )
        .await?;
    let approved = approved_values
        .first()
        .ok_or_else(|| CoreError::Transient("empty getApproved() response".into()))?
        .as_address()?;

    if approved != gauge {
        let tx_hash = chain
            .send(
                position_manager,
                methods::APPROVE,
                &[Value::Address(gauge), Value::Uint(token_id)],
                SendOptions::default(),
            )
            .await?;
        let receipt = chain.wait(tx_hash).await?;
        if receipt.status != crate::chain::TxStatus::Success {
            return Err(CoreError::TransactionReverted {
                tx_hash: receipt.tx_hash.to_string(),
                reason: "nft approve reverted".into(),
            });
        }
        let record = TxRecord::from_receipt(&receipt, "approve_nft", at);
        counters.add_gas(record.gas_cost);
        tx_records.push(record);
    }

    let tx_hash = chain
        .send(
            gauge,
            methods::DEPOSIT,
            &[Value::Uint(token_id)],
            SendOptions::default(),
        )
        .await?;
    reports.emit(Report::new(
        at,
        phase,
        ReportKind::GasCost,
        format!("submitted stake deposit({token_id})"),
    ));

    let receipt = chain.wait(tx_hash).await?;
    if receipt.status != crate::chain::TxStatus::Success {
        return Err(CoreError::TransactionReverted {
            tx_hash: receipt.tx_hash.to_string(),
            reason: "gauge deposit reverted".into(),
        });
    }
    let record = TxRecord::from_receipt(&receipt, "stake", at);
    counters.add_gas(record.gas_cost);
    tx_records.push(record);

    reports.emit(
        Report::new(at, phase, ReportKind::GasCost, "position staked")
            .with_token_id(token_id)
            .with_gas(tx_records.last().unwrap().gas_cost, counters.cumulative_gas),
    );

    Ok(PrimitiveOutcome::new(tx_records, ()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::test_support::FakeChain;
    use crate::report::channel;

    #[tokio::test]
    async fn owner_mismatch_fails_before_any_transaction() {
        let chain = FakeChain::new();
        chain.push_call_response(Ok(vec![Value::Address(Address::from([9u8; 20]))]));
        let mut counters = FinancialCounters::default();
        let (sink, _stream) = channel();
        let err = stake(
            &chain,
            Address::ZERO,
            Address::ZERO,
            Address::ZERO,
            U256::from(1u64),
            &mut counters,
            &sink,
            Phase::Initializing,
            0,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::OwnershipMismatch { .. }));
        assert!(chain.sends.lock().is_empty());
    }

    #[tokio::test]
    async fn already_approved_skips_approve_transaction() {
        let chain = FakeChain::new();
        chain.push_call_response(Ok(vec![Value::Address(Address::ZERO)])); // ownerOf == wallet (ZERO)
        chain.push_call_response(Ok(vec![Value::Address(Address::ZERO)])); // getApproved == gauge (ZERO)
        let mut counters = FinancialCounters::default();
        let (sink, _stream) = channel();
        let outcome = stake(
            &chain,
            Address::ZERO,
            Address::ZERO,
            Address::ZERO,
            U256::from(1u64),
            &mut counters,
            &sink,
            Phase::Initializing,
            0,
        )
        .await
        .unwrap();
        // Only the gauge deposit transaction, no nft approve.
        assert_eq!(outcome.tx_records.len(), 1);
        assert_eq!(chain.sends.lock().len(), 1);
    }
}
