//! Lossy push stream of structured events.
//!
//! A single producer (the phase supervisor) emits [`Report`]s into a
//! bounded channel; an external consumer drains it at its own pace. If the
//! consumer falls behind, `emit` drops the report and logs the drop rather
//! than blocking the supervisor — emitting a report must never fail a
//! workflow step.

use crate::error::CoreError;
use crate::ledger::PositionSnapshot;
use crate::supervisor::Phase;
use alloy_primitives::U256;
use serde::Serialize;
use tokio::sync::mpsc;

/// Channel capacity. At least 100 entries is required; 256 gives
/// headroom for a burst of per-transaction reports during a rebalance
/// without forcing an unbounded queue.
pub const REPORT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    StrategyStart,
    Monitoring,
    OutOfRange,
    RebalanceStart,
    GasCost,
    SwapComplete,
    PositionCreated,
    Profit,
    StabilityCheck,
    Error,
    Halt,
    Shutdown,
}

impl ReportKind {
    /// Stable, lowercase label for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            ReportKind::StrategyStart => "strategy_start",
            ReportKind::Monitoring => "monitoring",
            ReportKind::OutOfRange => "out_of_range",
            ReportKind::RebalanceStart => "rebalance_start",
            ReportKind::GasCost => "gas_cost",
            ReportKind::SwapComplete => "swap_complete",
            ReportKind::PositionCreated => "position_created",
            ReportKind::Profit => "profit",
            ReportKind::StabilityCheck => "stability_check",
            ReportKind::Error => "error",
            ReportKind::Halt => "halt",
            ReportKind::Shutdown => "shutdown",
        }
    }
}

/// A single, immutable reported event.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Milliseconds since the Unix epoch, supplied by the caller so the
    /// core never calls a non-deterministic clock internally.
    pub at: u64,
    pub phase: Phase,
    pub kind: ReportKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_cost: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_gas: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_pnl: Option<i128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionSnapshot>,
}

impl Report {
    pub fn new(at: u64, phase: Phase, kind: ReportKind, message: impl Into<String>) -> Self {
        Self {
            at,
            phase,
            kind,
            message: message.into(),
            gas_cost: None,
            cumulative_gas: None,
            profit: None,
            net_pnl: None,
            error: None,
            token_id: None,
            position: None,
        }
    }

    pub fn with_error(mut self, err: &CoreError) -> Self {
        self.error = Some(err.to_string());
        self
    }

    pub fn with_gas(mut self, gas_cost: U256, cumulative_gas: U256) -> Self {
        self.gas_cost = Some(gas_cost);
        self.cumulative_gas = Some(cumulative_gas);
        self
    }

    pub fn with_profit(mut self, profit: U256) -> Self {
        self.profit = Some(profit);
        self
    }

    pub fn with_net_pnl(mut self, net_pnl: i128) -> Self {
        self.net_pnl = Some(net_pnl);
        self
    }

    pub fn with_token_id(mut self, token_id: U256) -> Self {
        self.token_id = Some(token_id);
        self
    }

    pub fn with_position(mut self, position: PositionSnapshot) -> Self {
        self.position = Some(position);
        self
    }
}

/// The producer side of the report stream. Cloneable so multiple workflow
/// primitives can each hold a handle without the supervisor having to pass
/// `&mut` through every call.
#[derive(Clone)]
pub struct ReportSink {
    tx: mpsc::Sender<Report>,
}

/// The consumer side; owned by whatever external component persists or
/// displays reports. Not synchronized with the supervisor — draining it
/// slowly only risks drops, never blocking.
pub struct ReportStream {
    rx: mpsc::Receiver<Report>,
}

pub fn channel() -> (ReportSink, ReportStream) {
    let (tx, rx) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
    (ReportSink { tx }, ReportStream { rx })
}

impl ReportSink {
    /// Never blocks, never fails a caller. Drops the report on a full
    /// queue, logging the drop locally.
    pub fn emit(&self, report: Report) {
        if let Err(err) = self.tx.try_send(report) {
            match err {
                mpsc::error::TrySendError::Full(dropped) => {
                    tracing::warn!(
                        kind = ?dropped.kind,
                        phase = ?dropped.phase,
                        "report stream full, dropping report"
                    );
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::warn!("report stream closed, dropping report");
                }
            }
        }
    }
}

impl ReportStream {
    /// Await the next report in temporal order. Returns `None` once the
    /// sink side is dropped (supervisor exited).
    pub async fn recv(&mut self) -> Option<Report> {
        self.rx.recv().await
    }
}
