//! `Unstake(tokenId, incentiveKey)`.
//!
//! The `IncentiveKey.nonce` is always read from on-chain `deposits(tokenId)`
//! and compared against the caller-supplied key — never taken as a
//! caller-supplied constant.

use super::{PrimitiveOutcome, PrimitiveResult, TxRecord};
use crate::chain::{Chain, SendOptions, Value};
use crate::contracts::methods;
use crate::error::CoreError;
use crate::ledger::{FinancialCounters, IncentiveKey};
use crate::math::Price;
use crate::report::{Report, ReportKind, ReportSink};
use crate::supervisor::Phase;
use alloy_primitives::{Address, U256};

/// Rewards claimed in the same multicall, in the reward token's own
/// smallest unit — not yet converted to wei.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewardAmounts {
    pub reward: U256,
    pub bonus_reward: U256,
}

#[allow(clippy::too_many_arguments)]
pub async fn unstake(
    chain: &dyn Chain,
    farming_center: Address,
    token_id: U256,
    incentive: &IncentiveKey,
    reward_price: Option<&Price>,
    counters: &mut FinancialCounters,
    reports: &ReportSink,
    phase: Phase,
    at: u64,
) -> PrimitiveResult<RewardAmounts> {
    let deposit_values = chain
        .call(farming_center, methods::DEPOSITS, &[Value::Uint(token_id)])
        .await?;
    let on_chain_nonce = deposit_values
        .first()
        .ok_or_else(|| CoreError::Transient("empty deposits() response".into()))?
        .as_uint()?;

    if on_chain_nonce.is_zero() {
        return Err(CoreError::NotStaked { token_id });
    }
    if on_chain_nonce != incentive.nonce {
        return Err(CoreError::IncentiveMismatch { token_id });
    }

    let exit_call = Value::Tuple(vec![
        Value::Address(incentive.reward_token),
        Value::Address(incentive.bonus_reward_token),
        Value::Address(incentive.pool),
        Value::Uint(incentive.nonce),
    ]);

    let tx_hash = chain
        .send(
            farming_center,
            methods::MULTICALL,
            &[Value::Array(vec![
                Value::Tuple(vec![
                    Value::Bytes(methods::EXIT_FARMING.as_bytes().to_vec().into()),
                    exit_call,
                    Value::Uint(token_id),
                ]),
                Value::Tuple(vec![
                    Value::Bytes(methods::CLAIM_REWARD.as_bytes().to_vec().into()),
                    Value::Address(incentive.reward_token),
                ]),
                Value::Tuple(vec![
                    Value::Bytes(methods::CLAIM_REWARD.as_bytes().to_vec().into()),
                    Value::Address(incentive.bonus_reward_token),
                ]),
            ])],
            SendOptions::default(),
        )
        .await?;
    reports.emit(Report::new(
        at,
        phase,
        ReportKind::GasCost,
        format!("submitted unstake multicall for {token_id}"),
    ));

    let receipt = chain.wait(tx_hash).await?;
    if receipt.status != crate::chain::TxStatus::Success {
        return Err(CoreError::TransactionReverted {
            tx_hash: receipt.tx_hash.to_string(),
            reason: "unstake multicall reverted".into(),
        });
    }

    let record = TxRecord::from_receipt(&receipt, "unstake", at);
    counters.add_gas(record.gas_cost);

    // Decode claimed reward amounts from the multicall's return data. A
    // decode failure is a transient condition (most often a node lagging
    // behind the block the receipt came from), never a silent zero — the
    // counters are left untouched and the failure is reported distinctly
    // from a successful unstake with zero rewards.
    let decoded = chain.parse_logs(&receipt, "Reward(address,address,uint256)")?;
    let rewards = match decode_rewards(&decoded) {
        Some(rewards) => {
            if let Some(price) = reward_price {
                let reward_wei = price.convert(rewards.reward).unwrap_or(rewards.reward);
                let bonus_wei = price.convert(rewards.bonus_reward).unwrap_or(rewards.bonus_reward);
                counters.add_rewards(reward_wei + bonus_wei);
            } else {
                counters.add_rewards(rewards.reward + rewards.bonus_reward);
            }
            rewards
        }
        None => {
            reports.emit(
                Report::new(
                    at,
                    phase,
                    ReportKind::Error,
                    "reward amounts could not be decoded from unstake receipt",
                )
                .with_token_id(token_id),
            );
            return Err(CoreError::Transient(
                "failed to decode reward amounts from unstake receipt".into(),
            ));
        }
    };

    reports.emit(
        Report::new(at, phase, ReportKind::Profit, "rewards claimed")
            .with_token_id(token_id)
            .with_profit(rewards.reward + rewards.bonus_reward),
    );

    Ok(PrimitiveOutcome::new(vec![record], rewards))
}

fn decode_rewards(decoded: &[crate::chain::DecodedLog]) -> Option<RewardAmounts> {
    if decoded.is_empty() {
        return None;
    }
    let mut reward = U256::ZERO;
    let mut bonus_reward = U256::ZERO;
    for (i, log) in decoded.iter().enumerate() {
        if let Some(amount) = log.values.last().and_then(|v| v.as_uint().ok()) {
            if i == 0 {
                reward = amount;
            } else {
                bonus_reward += amount;
            }
        }
    }
    Some(RewardAmounts {
        reward,
        bonus_reward,
    })
}
