//! Process-wide counters and gauges for the supervisor loop, recorded
//! through the `metrics` facade so whatever exporter the binary installs
//! (Prometheus, statsd, ...) picks them up without this crate depending
//! on one.

use crate::report::{Report, ReportKind};
use crate::supervisor::Phase;

const SCOPE: &str = "rangekeeper";

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Initializing => "initializing",
        Phase::ActiveMonitoring => "active_monitoring",
        Phase::RebalancingRequired => "rebalancing_required",
        Phase::WaitingForStability => "waiting_for_stability",
        Phase::ExecutingRebalancing => "executing_rebalancing",
        Phase::Halted => "halted",
    }
}

/// Records the phase the supervisor just entered, as a gauge snapshot of
/// "current phase" (1 on the active phase's series, left stale on the
/// rest).
pub fn record_phase_transition(phase: Phase) {
    metrics::gauge!(format!("{SCOPE}_phase"), "phase" => phase_label(phase)).set(1.0);
}

/// Folds one emitted [`Report`] into the relevant counters/gauges. Called
/// once per report by whatever consumes the [`crate::report::ReportStream`]
/// (the report stream itself stays a pure producer; metrics observe it).
pub fn observe_report(report: &Report) {
    metrics::counter!(format!("{SCOPE}_reports_total"), "kind" => report.kind.label()).increment(1);

    match report.kind {
        ReportKind::GasCost => {
            if let Some(gas_cost) = report.gas_cost {
                metrics::counter!(format!("{SCOPE}_gas_cost_wei_total"))
                    .increment(gas_cost.try_into().unwrap_or(u64::MAX));
            }
        }
        ReportKind::Profit => {
            if let Some(profit) = report.profit {
                metrics::counter!(format!("{SCOPE}_rewards_wei_total"))
                    .increment(profit.try_into().unwrap_or(u64::MAX));
            }
        }
        ReportKind::Error => {
            metrics::counter!(format!("{SCOPE}_errors_total")).increment(1);
        }
        ReportKind::Halt => {
            metrics::counter!(format!("{SCOPE}_halts_total")).increment(1);
        }
        _ => {}
    }

    if let Some(net_pnl) = report.net_pnl {
        metrics::gauge!(format!("{SCOPE}_net_pnl_wei")).set(net_pnl as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_labels_are_snake_case() {
        for phase in [
            Phase::Initializing,
            Phase::ActiveMonitoring,
            Phase::RebalancingRequired,
            Phase::WaitingForStability,
            Phase::ExecutingRebalancing,
            Phase::Halted,
        ] {
            assert!(phase_label(phase).chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
