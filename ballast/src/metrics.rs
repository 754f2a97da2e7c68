//! Decision metrics
//!
//! Prometheus-compatible counters and histograms for placement and balance
//! calls. Recording is a no-op until the host process installs a recorder.

use crate::error::PlacementError;
use crate::plan::{Plan, PlanKind};
use std::time::Duration;

/// Record the outcome and duration of one decision call
pub fn record_decision(
    kind: PlanKind,
    policy: &str,
    duration: Duration,
    result: &Result<Plan, PlacementError>,
) {
    metrics::histogram!(
        "ballast_decision_duration_seconds",
        "kind" => kind.as_str(),
        "policy" => policy.to_string(),
    )
    .record(duration.as_secs_f64());

    match result {
        Ok(plan) => {
            metrics::counter!(
                "ballast_plans_total",
                "kind" => kind.as_str(),
                "policy" => policy.to_string(),
                "status" => "ok",
            )
            .increment(1);

            metrics::counter!(
                "ballast_plan_operations_total",
                "kind" => kind.as_str(),
            )
            .increment(plan.len() as u64);
        }
        Err(err) => {
            metrics::counter!(
                "ballast_plans_total",
                "kind" => kind.as_str(),
                "policy" => policy.to_string(),
                "status" => "error",
            )
            .increment(1);

            metrics::counter!(
                "ballast_plan_errors_total",
                "kind" => kind.as_str(),
                "error_type" => err.error_type(),
            )
            .increment(1);
        }
    }
}

/// Record node weight skew before and after a balance run
pub fn record_skew(before: u64, after: u64) {
    metrics::gauge!("ballast_balance_skew", "stage" => "before").set(before as f64);
    metrics::gauge!("ballast_balance_skew", "stage" => "after").set(after as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        record_decision(
            PlanKind::Placement,
            "same_collection",
            Duration::from_millis(3),
            &Ok(Plan::new(PlanKind::Placement)),
        );
        record_decision(
            PlanKind::Balance,
            "same_collection",
            Duration::from_millis(1),
            &Err(PlacementError::EmptyNodeSet),
        );
        record_skew(10, 2);
    }
}
