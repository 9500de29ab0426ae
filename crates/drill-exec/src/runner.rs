//! Step runner: drives exactly one step through guard evaluation, delay,
//! template resolution, the iteration and retry loops, extraction, and
//! assertion-based outcome classification.

use std::time::Duration;

use rand::Rng;
use serde_json::Value as JsonValue;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use drill_core::http::HttpRequest;
use drill_core::{
    Context, EventKind, ExecutionId, RequestSpec, Step, StepResult, StepStatus, WhenClause,
};

use crate::driver::Shared;
use crate::{assertion, extract, telemetry, template};

/// Run one step to a terminal step status.
pub(crate) async fn run_step(
    shared: &Shared,
    execution_id: &ExecutionId,
    scenario_id: &str,
    step: &Step,
    cancel: &CancellationToken,
) {
    if let Some(when) = &step.when
        && !guard_satisfied(shared, execution_id, when)
    {
        debug!(step = %step.id, "guard not satisfied; skipping");
        if let Some((_, snapshot)) = shared.store.update(execution_id, |execution| {
            execution.steps.push(StepResult::skipped(step.id.clone()));
        }) {
            shared.events.emit(EventKind::Updated, snapshot);
        }
        return;
    }

    if let Some((_, snapshot)) = shared.store.update(execution_id, |execution| {
        execution.steps.push(StepResult::running(step.id.clone()));
    }) {
        shared.events.emit(EventKind::Updated, snapshot);
    }

    let total_attempts = step.retries + 1;

    for attempt in 1..=total_attempts {
        shared.store.update(execution_id, |execution| {
            if let Some(result) = execution.step_result_mut(&step.id) {
                result.attempts = attempt;
            }
        });

        // Delay gate: cancellation during the sleep aborts the step.
        let delay = attempt_delay(step);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                finish_cancelled(shared, execution_id, step);
                return;
            }
            _ = sleep(delay) => {}
        }

        let context = shared
            .store
            .snapshot(execution_id)
            .map(|execution| execution.context)
            .unwrap_or_default();
        let request = build_request(&step.request, &context, shared.builtins.as_ref());

        // Iteration loop: the last successful response of the final
        // iteration is the attempt's response.
        let mut response = None;
        let mut request_error = None;
        for iteration in 1..=step.iterations {
            match shared.requester.perform(request.clone(), cancel).await {
                Ok(ok) => response = Some(ok),
                Err(err) if err.is_cancelled() => {
                    finish_cancelled(shared, execution_id, step);
                    return;
                }
                Err(err) => {
                    warn!(step = %step.id, iteration, "request error: {err}");
                    if iteration == step.iterations && response.is_none() {
                        request_error = Some(err);
                    }
                }
            }
        }

        let Some(response) = response else {
            let error = request_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "request produced no response".to_string());
            if attempt == total_attempts {
                telemetry::record_step_failed(scenario_id);
                if let Some((_, snapshot)) = shared.store.update(execution_id, |execution| {
                    if let Some(result) = execution.step_result_mut(&step.id) {
                        result.error = Some(error.clone());
                        result.finish(StepStatus::Failed);
                    }
                }) {
                    shared.events.emit(EventKind::Updated, snapshot);
                }
                return;
            }
            continue;
        };

        shared.store.update(execution_id, |execution| {
            extract::apply(&step.extract, &response, &mut execution.context);
        });

        let results = step
            .expect
            .as_ref()
            .map(|expect| assertion::evaluate(expect, &response))
            .unwrap_or_default();
        let passed = assertion::passes(&results);

        if passed {
            if let Some((_, snapshot)) = shared.store.update(execution_id, |execution| {
                if let Some(result) = execution.step_result_mut(&step.id) {
                    result.assertions = results;
                    result.finish(StepStatus::Completed);
                }
                execution.passed_steps += 1;
            }) {
                shared.events.emit(EventKind::Updated, snapshot);
            }
            return;
        }

        if attempt < total_attempts {
            // Keep the result running; the latest attempt's assertions
            // overwrite the previous ones.
            shared.store.update(execution_id, |execution| {
                if let Some(result) = execution.step_result_mut(&step.id) {
                    result.assertions = results;
                }
            });
            continue;
        }

        let summary = assertion::failure_summary(&results);
        telemetry::record_step_failed(scenario_id);
        if let Some((_, snapshot)) = shared.store.update(execution_id, |execution| {
            if let Some(result) = execution.step_result_mut(&step.id) {
                result.assertions = results;
                result.error = Some(summary.clone());
                result.finish(StepStatus::Failed);
            }
        }) {
            shared.events.emit(EventKind::Updated, snapshot);
        }
        return;
    }
}

/// A guard holds iff the referenced step has a result, its completion
/// state matches `succeeded` when specified, and the `actual` of its
/// `status` assertion matches `status` when specified. A referenced step
/// with no `status` assertion cannot satisfy a `status` predicate.
fn guard_satisfied(shared: &Shared, execution_id: &ExecutionId, when: &WhenClause) -> bool {
    let Some(execution) = shared.store.snapshot(execution_id) else {
        return false;
    };
    let Some(result) = execution.step_result(&when.step) else {
        return false;
    };

    if let Some(required) = when.succeeded
        && (result.status == StepStatus::Completed) != required
    {
        return false;
    }

    if let Some(required) = when.status {
        let observed = result
            .assertions
            .iter()
            .find(|assertion| assertion.field == "status")
            .map(|assertion| &assertion.actual);
        match observed {
            Some(JsonValue::Number(actual)) if actual.as_u64() == Some(u64::from(required)) => {}
            _ => return false,
        }
    }

    true
}

fn attempt_delay(step: &Step) -> Duration {
    let jitter = if step.jitter > 0 {
        rand::thread_rng().gen_range(0..step.jitter)
    } else {
        0
    };
    Duration::from_millis(step.delay_ms + jitter)
}

/// Resolve every template of the request spec against the context and
/// assemble the outgoing request. Query parameters are appended to the
/// resolved URL.
fn build_request(
    spec: &RequestSpec,
    context: &Context,
    builtins: &dyn template::BuiltinSource,
) -> HttpRequest {
    let mut url = template::resolve(&spec.url, context, builtins);
    if !spec.query.is_empty() {
        let pairs: Vec<String> = spec
            .query
            .iter()
            .map(|(name, value)| {
                format!("{name}={}", template::resolve(value, context, builtins))
            })
            .collect();
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&pairs.join("&"));
    }

    let mut request = HttpRequest::new(spec.method, url);
    for (name, value) in &spec.headers {
        request
            .headers
            .insert(name.clone(), template::resolve(value, context, builtins));
    }
    if let Some(body) = &spec.body {
        request.body = Some(template::resolve_body(body, context, builtins));
    }
    request
}

fn finish_cancelled(shared: &Shared, execution_id: &ExecutionId, step: &Step) {
    telemetry::record_cancellation("step");
    shared.store.update(execution_id, |execution| {
        if let Some(result) = execution.step_result_mut(&step.id) {
            result.finish(StepStatus::Cancelled);
        }
    });
}
