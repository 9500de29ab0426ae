//! Execution driver: one task per execution that acquires an admission
//! slot, schedules dependency waves, honors the pause/cancel checkpoints,
//! and classifies the terminal outcome.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, instrument};

use drill_core::http::Requester;
use drill_core::{
    EventKind, ExecutionId, ExecutionMode, ExecutionStatus, PausedState, Scenario, Step, StepId,
};

use crate::admission::AdmissionController;
use crate::control::ControlBlock;
use crate::events::EventBus;
use crate::store::ExecutionStore;
use crate::template::BuiltinSource;
use crate::{report, runner, telemetry};

/// Engine-wide collaborators shared by every driver.
pub(crate) struct Shared {
    pub store: Arc<ExecutionStore>,
    pub events: Arc<EventBus>,
    pub requester: Arc<dyn Requester>,
    pub builtins: Arc<dyn BuiltinSource>,
    pub admission: AdmissionController,
}

/// Drive one execution from pending to a terminal status.
///
/// The admission permit is held for the whole body, so the slot is
/// released on every exit path when the permit drops.
#[instrument(skip_all, fields(execution = %execution_id, scenario = %scenario.id))]
pub(crate) async fn drive(
    shared: Arc<Shared>,
    execution_id: ExecutionId,
    scenario: Arc<Scenario>,
    control: Arc<ControlBlock>,
) {
    let cancel = control.cancel_token();

    let Some(_permit) = shared.admission.acquire(&cancel).await else {
        finish(&shared, &execution_id, ExecutionStatus::Cancelled, None);
        return;
    };
    if control.is_cancelled() {
        finish(&shared, &execution_id, ExecutionStatus::Cancelled, None);
        return;
    }

    telemetry::record_admitted();
    if let Some((_, snapshot)) = shared.store.update(&execution_id, |execution| {
        execution.status = ExecutionStatus::Running;
        execution.started_at = Some(Utc::now());
    }) {
        shared.events.emit(EventKind::Started, snapshot);
    }

    let mut pending: Vec<StepId> = scenario.steps.iter().map(|step| step.id.clone()).collect();
    let mut completed: HashSet<StepId> = HashSet::new();

    loop {
        // Cancel checkpoint.
        if control.is_cancelled() {
            finish(&shared, &execution_id, ExecutionStatus::Cancelled, None);
            return;
        }

        // Pause checkpoint: pause is observed between waves, never
        // mid-wave.
        if control.is_paused() {
            pause_gate(&shared, &execution_id, &control, &pending, &completed).await;
            if control.is_cancelled() {
                finish(&shared, &execution_id, ExecutionStatus::Cancelled, None);
                return;
            }
        }

        if pending.is_empty() {
            break;
        }

        // Frontier: pending steps whose dependencies have all reached a
        // terminal step status. Guard-based skips are decided inside the
        // step runner, not here.
        let frontier: Vec<&Step> = scenario
            .steps
            .iter()
            .filter(|step| pending.contains(&step.id))
            .filter(|step| step.depends_on.iter().all(|dep| completed.contains(dep)))
            .collect();

        if frontier.is_empty() {
            let blocked: Vec<&str> = pending.iter().map(StepId::as_str).collect();
            finish(
                &shared,
                &execution_id,
                ExecutionStatus::Failed,
                Some(format!(
                    "Deadlock detected: steps [{}] can never become executable",
                    blocked.join(", ")
                )),
            );
            return;
        }

        pending.retain(|id| !frontier.iter().any(|step| &step.id == id));

        // Wave: every frontier step runs concurrently; the barrier keeps
        // completion bookkeeping out of the hot path.
        join_all(
            frontier
                .iter()
                .map(|step| runner::run_step(&shared, &execution_id, &scenario.id, step, &cancel)),
        )
        .await;
        completed.extend(frontier.into_iter().map(|step| step.id.clone()));
        debug!(
            completed = completed.len(),
            pending = pending.len(),
            "wave finished"
        );
    }

    if control.is_cancelled() {
        finish(&shared, &execution_id, ExecutionStatus::Cancelled, None);
        return;
    }
    finish(&shared, &execution_id, ExecutionStatus::Completed, None);
}

/// Freeze a paused-state snapshot, park until resume or cancel, then
/// restore the running status. The caller re-checks cancellation.
async fn pause_gate(
    shared: &Shared,
    execution_id: &ExecutionId,
    control: &ControlBlock,
    pending: &[StepId],
    completed: &HashSet<StepId>,
) {
    let mut completed_ids: Vec<StepId> = completed.iter().cloned().collect();
    completed_ids.sort();

    if let Some((_, snapshot)) = shared.store.update(execution_id, |execution| {
        execution.status = ExecutionStatus::Paused;
        execution.paused_state = Some(PausedState {
            pending_steps: pending.to_vec(),
            completed_steps: completed_ids.clone(),
            context: execution.context.clone(),
            passed_steps: execution.passed_steps,
            step_results: execution.steps.clone(),
        });
    }) {
        shared.events.emit(EventKind::Paused, snapshot);
    }

    let cancel = control.cancel_token();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        _ = control.wait_resume() => {}
    }
    if control.is_cancelled() {
        return;
    }

    if let Some((_, snapshot)) = shared.store.update(execution_id, |execution| {
        execution.status = ExecutionStatus::Running;
        execution.paused_state = None;
    }) {
        shared.events.emit(EventKind::Resumed, snapshot);
    }
}

/// Terminal transition: attach the assessment report when due, mutate the
/// store exactly once, and emit the matching terminal event.
fn finish(
    shared: &Shared,
    execution_id: &ExecutionId,
    status: ExecutionStatus,
    error: Option<String>,
) {
    let report = if status == ExecutionStatus::Completed {
        shared.store.snapshot(execution_id).and_then(|execution| {
            (execution.mode == ExecutionMode::Assessment).then(|| {
                let total = shared
                    .store
                    .scenario(execution_id)
                    .map_or(0, |scenario| scenario.steps.len());
                report::build(&execution, total)
            })
        })
    } else {
        None
    };

    let kind = match status {
        ExecutionStatus::Completed => EventKind::Completed,
        ExecutionStatus::Cancelled => EventKind::Cancelled,
        _ => EventKind::Failed,
    };

    if let Some(snapshot) = shared.store.finish(execution_id, status, error, report) {
        if snapshot.started_at.is_some() {
            telemetry::record_finished(status);
        } else {
            telemetry::record_cancellation("queued");
        }
        shared.events.emit(kind, snapshot);
    }
}
