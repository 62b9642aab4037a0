//! Idempotent building blocks, each wrapping one chain round-trip with
//! gas extraction and reporting. One file per primitive, following a
//! one-responsibility-per-file service layout.

pub mod approve;
pub mod mint;
pub mod stake;
pub mod swap;
pub mod unstake;
pub mod withdraw;

use crate::chain::Receipt;
use crate::error::CoreResult;
use alloy_primitives::U256;

/// A single confirmed transaction, folded into `FinancialCounters` on
/// return.
#[derive(Debug, Clone)]
pub struct TxRecord {
    pub hash: String,
    pub gas_used: u64,
    pub effective_gas_price: U256,
    pub gas_cost: U256,
    pub operation: &'static str,
    pub at: u64,
}

impl TxRecord {
    pub fn from_receipt(receipt: &Receipt, operation: &'static str, at: u64) -> Self {
        Self {
            hash: receipt.tx_hash.to_string(),
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            gas_cost: receipt.gas_cost(),
            operation,
            at,
        }
    }
}

/// The shared return shape every primitive produces: either
/// every submitted transaction confirmed and `domain_outputs` is set, or
/// the primitive failed with whichever transactions it did manage to
/// confirm before the failure point.
#[derive(Debug, Clone)]
pub struct PrimitiveOutcome<T> {
    pub tx_records: Vec<TxRecord>,
    pub total_gas_cost: U256,
    pub domain_outputs: T,
}

impl<T> PrimitiveOutcome<T> {
    pub fn new(tx_records: Vec<TxRecord>, domain_outputs: T) -> Self {
        let total_gas_cost = tx_records
            .iter()
            .fold(U256::ZERO, |acc, r| acc + r.gas_cost);
        Self {
            tx_records,
            total_gas_cost,
            domain_outputs,
        }
    }
}

pub type PrimitiveResult<T> = CoreResult<PrimitiveOutcome<T>>;
