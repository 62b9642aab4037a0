use alloy_primitives::{Address, U256};

/// Typed, classifiable errors for the repositioning control plane.
///
/// Every variant carries enough context to be logged directly and to be
/// folded into a [`crate::report::Report`]. Classification into fatal vs
/// transient lives on the type itself via [`CoreError::is_fatal`]
/// so the circuit breaker never has to re-derive it from a string.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("nft {token_id} not owned by expected address {expected}")]
    OwnershipMismatch { token_id: U256, expected: Address },

    #[error("nft {token_id} is not staked")]
    NotStaked { token_id: U256 },

    #[error("incentive key for {token_id} does not match on-chain deposit")]
    IncentiveMismatch { token_id: U256 },

    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: U256, available: U256 },

    #[error("transaction {tx_hash} reverted: {reason}")]
    TransactionReverted { tx_hash: String, reason: String },

    #[error("slippage bound breached on {operation}")]
    SlippageBreach { operation: &'static str },

    #[error("transient chain error: {0}")]
    Transient(String),

    #[error("cancelled at safe checkpoint")]
    Cancelled,
}

impl CoreError {
    /// Whether this error should latch the circuit breaker immediately.
    /// Everything that is not explicitly fatal is treated as transient
    /// and only counted against the breaker's window.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::OwnershipMismatch { .. }
                | CoreError::NotStaked { .. }
                | CoreError::IncentiveMismatch { .. }
                | CoreError::InsufficientBalance { .. }
                | CoreError::TransactionReverted { .. }
        )
    }

    /// Short machine-readable label, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::OwnershipMismatch { .. } => "ownership_mismatch",
            CoreError::NotStaked { .. } => "not_staked",
            CoreError::IncentiveMismatch { .. } => "incentive_mismatch",
            CoreError::InsufficientBalance { .. } => "insufficient_balance",
            CoreError::TransactionReverted { .. } => "transaction_reverted",
            CoreError::SlippageBreach { .. } => "slippage_breach",
            CoreError::Transient(_) => "transient",
            CoreError::Cancelled => "cancelled",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
