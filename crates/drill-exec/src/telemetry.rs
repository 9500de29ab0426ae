//! Engine-level metrics emitted through the `metrics` facade.

use drill_core::ExecutionStatus;

pub(crate) fn record_admitted() {
    metrics::counter!("drill.engine.admissions_total").increment(1);
    metrics::gauge!("drill.engine.active_executions").increment(1.0);
}

pub(crate) fn record_finished(status: ExecutionStatus) {
    metrics::gauge!("drill.engine.active_executions").decrement(1.0);
    metrics::counter!(
        "drill.engine.executions_finished_total",
        "status" => status_label(status)
    )
    .increment(1);
}

pub(crate) fn record_step_failed(scenario: &str) {
    metrics::counter!(
        "drill.engine.step_failures_total",
        "scenario" => scenario.to_string()
    )
    .increment(1);
}

pub(crate) fn record_cancellation(reason: &'static str) {
    metrics::counter!(
        "drill.engine.cancellations_total",
        "reason" => reason
    )
    .increment(1);
}

fn status_label(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Pending => "pending",
        ExecutionStatus::Running => "running",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Cancelled => "cancelled",
        ExecutionStatus::Paused => "paused",
    }
}
