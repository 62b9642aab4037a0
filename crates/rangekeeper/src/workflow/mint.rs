//! `Mint(max0, max1, width, slippageBps)`.

use super::approve::approve;
use super::{PrimitiveOutcome, PrimitiveResult, TxRecord};
use crate::chain::{Chain, SendOptions, Value};
use crate::contracts::{methods, ContractAddresses, TRANSFER_EVENT_SIGNATURE};
use crate::error::CoreError;
use crate::ledger::FinancialCounters;
use crate::math::{min_amount, tick_bounds, Price};
use crate::report::{Report, ReportKind, ReportSink};
use crate::supervisor::Phase;
use alloy_primitives::{Address, U256};

pub const MINT_DEADLINE_SECS: u64 = 20 * 60;

#[derive(Debug, Clone, Copy)]
pub struct MintResult {
    pub token_id: U256,
    pub amount0: U256,
    pub amount1: U256,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

/// Splits `(max_token0, max_token1)` into a desired `(amount0, amount1)`
/// matching the current price's value ratio, capping whichever side is
/// the limiting one. Mirrors `rebalance::plan_rebalance`'s idiom since
/// Mint always follows a rebalance that already equalized value at this
/// price (see DESIGN.md).
fn desired_amounts(
    max_token0: U256,
    max_token1: U256,
    price: &Price,
) -> Result<(U256, U256), CoreError> {
    let value0_in_1_at_max = price.convert(max_token0)?;
    if value0_in_1_at_max <= max_token1 {
        Ok((max_token0, value0_in_1_at_max))
    } else {
        let amount0 = price.invert_convert(max_token1)?;
        Ok((amount0, max_token1))
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn mint(
    chain: &dyn Chain,
    contracts: &ContractAddresses,
    wallet: Address,
    current_tick: i32,
    sqrt_price_x96: U256,
    tick_spacing: i32,
    range_width: i32,
    max_token0: U256,
    max_token1: U256,
    balance0: U256,
    balance1: U256,
    slippage_bps: u32,
    counters: &mut FinancialCounters,
    reports: &ReportSink,
    phase: Phase,
    at: u64,
) -> PrimitiveResult<MintResult> {
    let (tick_lower, tick_upper) = tick_bounds(current_tick, range_width, tick_spacing)?;
    let price = Price::from_sqrt_price_x96(sqrt_price_x96);
    let (desired0, desired1) = desired_amounts(max_token0, max_token1, &price)?;

    if balance0 < desired0 {
        return Err(CoreError::InsufficientBalance {
            needed: desired0,
            available: balance0,
        });
    }
    if balance1 < desired1 {
        return Err(CoreError::InsufficientBalance {
            needed: desired1,
            available: balance1,
        });
    }

    let min0 = min_amount(desired0, slippage_bps);
    let min1 = min_amount(desired1, slippage_bps);

    let mut tx_records = Vec::new();

    let approve0 = approve(
        chain,
        contracts.token0,
        wallet,
        contracts.position_manager,
        desired0,
        counters,
        reports,
        phase,
        at,
    )
    .await?;
    tx_records.extend(approve0.tx_records);

    let approve1 = approve(
        chain,
        contracts.token1,
        wallet,
        contracts.position_manager,
        desired1,
        counters,
        reports,
        phase,
        at,
    )
    .await?;
    tx_records.extend(approve1.tx_records);

    let deadline = at + MINT_DEADLINE_SECS;
    let tx_hash = chain
        .send(
            contracts.position_manager,
            methods::MINT,
            &[
                Value::Address(contracts.token0),
                Value::Address(contracts.token1),
                Value::Int(tick_lower as i128),
                Value::Int(tick_upper as i128),
                Value::Uint(desired0),
                Value::Uint(desired1),
                Value::Uint(min0),
                Value::Uint(min1),
                Value::Address(wallet),
                Value::Uint(U256::from(deadline)),
            ],
            SendOptions::default(),
        )
        .await?;
    reports.emit(Report::new(
        at,
        phase,
        ReportKind::GasCost,
        format!("submitted mint [{tick_lower}, {tick_upper}]"),
    ));

    let receipt = chain.wait(tx_hash).await?;
    if receipt.status != crate::chain::TxStatus::Success {
        return Err(CoreError::TransactionReverted {
            tx_hash: receipt.tx_hash.to_string(),
            reason: "mint reverted".into(),
        });
    }

    let record = TxRecord::from_receipt(&receipt, "mint", at);
    counters.add_gas(record.gas_cost);
    tx_records.push(record);

    let decoded = chain.parse_logs(&receipt, TRANSFER_EVENT_SIGNATURE)?;
    let token_id = decoded
        .iter()
        .filter(|log| log.address == contracts.position_manager)
        .find_map(|log| log.values.last().and_then(|v| v.as_uint().ok()))
        .ok_or_else(|| CoreError::Transient("mint receipt missing Transfer log".into()))?;

    reports.emit(
        Report::new(at, phase, ReportKind::PositionCreated, "position minted")
            .with_token_id(token_id)
            .with_gas(tx_records.last().unwrap().gas_cost, counters.cumulative_gas),
    );

    Ok(PrimitiveOutcome::new(
        tx_records,
        MintResult {
            token_id,
            amount0: desired0,
            amount1: desired1,
            tick_lower,
            tick_upper,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::test_support::FakeChain;
    use crate::chain::{DecodedLog, Receipt, TxStatus};
    use crate::report::channel;
    use alloy_primitives::B256;

    fn sample_contracts() -> ContractAddresses {
        ContractAddresses {
            pool: Address::ZERO,
            token0: Address::ZERO,
            token1: Address::ZERO,
            position_manager: Address::ZERO,
            router: Address::ZERO,
            gauge: Address::ZERO,
            farming_center: Address::ZERO,
            reward_token: Address::ZERO,
            bonus_reward_token: Address::ZERO,
        }
    }

    #[tokio::test]
    async fn insufficient_balance_is_rejected_before_any_transaction() {
        let chain = FakeChain::new();
        let mut counters = FinancialCounters::default();
        let (sink, _stream) = channel();
        let one_x96 = U256::from(1u64) << 96;
        let err = mint(
            &chain,
            &sample_contracts(),
            Address::ZERO,
            0,
            one_x96,
            60,
            6,
            U256::from(1_000u64),
            U256::from(1_000u64),
            U256::from(1u64), // balance0 too small
            U256::from(1_000u64),
            100,
            &mut counters,
            &sink,
            Phase::Initializing,
            0,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance { .. }));
        assert!(chain.sends.lock().is_empty());
    }

    #[tokio::test]
    async fn missing_transfer_log_is_a_transient_failure() {
        let chain = FakeChain::new();
        chain.push_call_response(Ok(vec![Value::Uint(U256::ZERO)])); // allowance0
        chain.push_call_response(Ok(vec![Value::Uint(U256::ZERO)])); // allowance1
        chain.push_wait_response(Ok(Receipt {
            tx_hash: B256::ZERO,
            status: TxStatus::Success,
            gas_used: 21_000,
            effective_gas_price: U256::from(1u64),
            logs: Vec::new(),
        }));
        chain.push_wait_response(Ok(Receipt {
            tx_hash: B256::ZERO,
            status: TxStatus::Success,
            gas_used: 21_000,
            effective_gas_price: U256::from(1u64),
            logs: Vec::new(),
        }));
        chain.push_wait_response(Ok(Receipt {
            tx_hash: B256::ZERO,
            status: TxStatus::Success,
            gas_used: 200_000,
            effective_gas_price: U256::from(1u64),
            logs: Vec::new(),
        }));
        let mut counters = FinancialCounters::default();
        let (sink, _stream) = channel();
        let one_x96 = U256::from(1u64) << 96;
        let result = mint(
            &chain,
            &sample_contracts(),
            Address::ZERO,
            0,
            one_x96,
            60,
            6,
            U256::from(1_000u64),
            U256::from(1_000u64),
            U256::from(1_000u64),
            U256::from(1_000u64),
            100,
            &mut counters,
            &sink,
            Phase::Initializing,
            0,
        )
        .await;
        // FakeChain::parse_logs returns an empty vec by default, so this
        // primitive surfaces the documented transient failure rather than
        // a bogus token id.
        assert!(matches!(result, Err(CoreError::Transient(_))));
    }

    #[tokio::test]
    async fn successful_mint_decodes_token_id_from_transfer_log() {
        let chain = FakeChain::new();
        chain.push_call_response(Ok(vec![Value::Uint(U256::ZERO)])); // allowance0
        chain.push_call_response(Ok(vec![Value::Uint(U256::ZERO)])); // allowance1
        chain.push_wait_response(Ok(Receipt {
            tx_hash: B256::ZERO,
            status: TxStatus::Success,
            gas_used: 21_000,
            effective_gas_price: U256::from(1u64),
            logs: Vec::new(),
        }));
        chain.push_wait_response(Ok(Receipt {
            tx_hash: B256::ZERO,
            status: TxStatus::Success,
            gas_used: 21_000,
            effective_gas_price: U256::from(1u64),
            logs: Vec::new(),
        }));
        chain.push_wait_response(Ok(Receipt {
            tx_hash: B256::ZERO,
            status: TxStatus::Success,
            gas_used: 200_000,
            effective_gas_price: U256::from(1u64),
            logs: Vec::new(),
        }));
        chain.push_parse_logs_response(Ok(vec![DecodedLog {
            address: Address::ZERO,
            values: vec![Value::Uint(U256::from(42u64))],
        }]));
        let mut counters = FinancialCounters::default();
        let (sink, _stream) = channel();
        let one_x96 = U256::from(1u64) << 96;
        let result = mint(
            &chain,
            &sample_contracts(),
            Address::ZERO,
            0,
            one_x96,
            60,
            6,
            U256::from(1_000u64),
            U256::from(1_000u64),
            U256::from(1_000u64),
            U256::from(1_000u64),
            100,
            &mut counters,
            &sink,
            Phase::Initializing,
            0,
        )
        .await
        .unwrap();
        assert_eq!(result.domain_outputs.token_id, U256::from(42u64));
    }
}
