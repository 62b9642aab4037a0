//! `Swap(tokenIn, tokenOut, amountIn, minOut, deadline)`.

use super::approve::approve;
use super::{PrimitiveOutcome, PrimitiveResult, TxRecord};
use crate::chain::{Chain, SendOptions, Value};
use crate::contracts::{methods, TRANSFER_EVENT_SIGNATURE};
use crate::error::CoreError;
use crate::ledger::FinancialCounters;
use crate::math::min_amount;
use crate::report::{Report, ReportKind, ReportSink};
use crate::supervisor::Phase;
use alloy_primitives::{Address, U256};

/// Deadline window added to `now` for every router call.
pub const SWAP_DEADLINE_SECS: u64 = 20 * 60;

#[derive(Debug, Clone, Copy)]
pub struct SwapResult {
    pub amount_out: U256,
}

#[allow(clippy::too_many_arguments)]
pub async fn swap(
    chain: &dyn Chain,
    router: Address,
    wallet: Address,
    token_in: Address,
    token_out: Address,
    amount_in: U256,
    slippage_bps: u32,
    expected_out: U256,
    counters: &mut FinancialCounters,
    reports: &ReportSink,
    phase: Phase,
    now_unix_secs: u64,
) -> PrimitiveResult<SwapResult> {
    let mut tx_records = Vec::new();

    let approve_outcome = approve(
        chain,
        token_in,
        wallet,
        router,
        amount_in,
        counters,
        reports,
        phase,
        now_unix_secs,
    )
    .await?;
    tx_records.extend(approve_outcome.tx_records);

    let min_out = min_amount(expected_out, slippage_bps);
    let deadline = now_unix_secs + SWAP_DEADLINE_SECS;

    let tx_hash = chain
        .send(
            router,
            methods::SWAP_EXACT_TOKENS_FOR_TOKENS,
            &[
                Value::Address(token_in),
                Value::Address(token_out),
                Value::Uint(amount_in),
                Value::Uint(min_out),
                Value::Uint(U256::from(deadline)),
            ],
            SendOptions::default(),
        )
        .await?;
    reports.emit(Report::new(
        now_unix_secs,
        phase,
        ReportKind::GasCost,
        format!("submitted swap {amount_in} {token_in} -> {token_out}"),
    ));

    let receipt = chain.wait(tx_hash).await?;
    if receipt.status != crate::chain::TxStatus::Success {
        return Err(CoreError::TransactionReverted {
            tx_hash: receipt.tx_hash.to_string(),
            reason: "swap reverted".into(),
        });
    }

    let record = TxRecord::from_receipt(&receipt, "swap", now_unix_secs);
    counters.add_gas(record.gas_cost);
    tx_records.push(record);

    // Prefer the actual amount transferred to the wallet, decoded from the
    // receipt's Transfer logs; fall back to the slippage-protected minimum
    // when no such log is present.
    let decoded = chain.parse_logs(&receipt, TRANSFER_EVENT_SIGNATURE)?;
    let amount_out = decoded
        .iter()
        .filter(|log| log.address == token_out)
        .find_map(|log| log.values.last().and_then(|v| v.as_uint().ok()))
        .unwrap_or(min_out);

    // `expected_out` is the pre-trade, price-implied output; whatever it
    // exceeds the actually-received amount by is spent as AMM fee plus
    // slippage. Favorable execution (amount_out > expected_out) costs
    // nothing. Same 1:1 reference-unit simplification as reward accounting
    // (see SPEC_FULL.md).
    counters.add_swap_fees(expected_out.saturating_sub(amount_out));

    reports.emit(
        Report::new(now_unix_secs, phase, ReportKind::SwapComplete, "swap confirmed")
            .with_gas(tx_records.last().unwrap().gas_cost, counters.cumulative_gas),
    );

    Ok(PrimitiveOutcome::new(
        tx_records,
        SwapResult { amount_out },
    ))
}
