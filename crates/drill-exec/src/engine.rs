//! Engine façade: the system boundary for starting, querying, and
//! controlling scenario executions.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use drill_core::http::Requester;
use drill_core::{
    Catalog, EngineConfig, EngineError, Execution, ExecutionEvent, ExecutionId, ExecutionMode,
    ExecutionStatus, Scenario,
};

use crate::admission::AdmissionController;
use crate::control::ControlBlock;
use crate::driver::{self, Shared};
use crate::events::EventBus;
use crate::store::ExecutionStore;
use crate::template::{BuiltinSource, RandomBuiltins};

/// Scenario execution engine.
///
/// One driver task is spawned per execution; the engine itself only holds
/// the shared registries and the store sweeper. Constructing an engine
/// requires a running tokio runtime.
pub struct Engine {
    shared: Arc<Shared>,
    catalog: Arc<dyn Catalog>,
    config: EngineConfig,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Build an engine with default configuration.
    pub fn new(catalog: Arc<dyn Catalog>, requester: Arc<dyn Requester>) -> Self {
        Self::with_config(catalog, requester, EngineConfig::default())
    }

    /// Build an engine with explicit configuration and start its sweeper.
    pub fn with_config(
        catalog: Arc<dyn Catalog>,
        requester: Arc<dyn Requester>,
        config: EngineConfig,
    ) -> Self {
        let store = Arc::new(ExecutionStore::new());
        let shared = Arc::new(Shared {
            store: Arc::clone(&store),
            events: Arc::new(EventBus::new()),
            requester,
            builtins: Arc::new(RandomBuiltins),
            admission: AdmissionController::new(config.max_concurrency),
        });
        let shutdown = CancellationToken::new();
        let sweeper = spawn_sweeper(store, &config, shutdown.clone());

        Self {
            shared,
            catalog,
            config,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Override the template built-in source (tests pin `random` and
    /// `timestamp` through this).
    pub fn with_builtins(mut self, builtins: Arc<dyn BuiltinSource>) -> Self {
        self.shared = Arc::new(Shared {
            store: Arc::clone(&self.shared.store),
            events: Arc::clone(&self.shared.events),
            requester: Arc::clone(&self.shared.requester),
            builtins,
            admission: self.shared.admission.clone(),
        });
        self
    }

    /// Create and launch an execution of the named scenario. The record
    /// is registered as *pending* before the driver races for admission.
    pub fn start_scenario(
        &self,
        scenario_id: &str,
        mode: ExecutionMode,
        trigger_data: Option<JsonValue>,
    ) -> Result<ExecutionId, EngineError> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::ShutDown);
        }
        let scenario = self
            .catalog
            .scenario(scenario_id)
            .ok_or_else(|| EngineError::ScenarioNotFound {
                id: scenario_id.to_string(),
            })?;
        validate_scenario(&scenario)?;
        self.spawn_execution(Arc::new(scenario), mode, trigger_data, None)
    }

    fn spawn_execution(
        &self,
        scenario: Arc<Scenario>,
        mode: ExecutionMode,
        trigger_data: Option<JsonValue>,
        parent: Option<ExecutionId>,
    ) -> Result<ExecutionId, EngineError> {
        let mut execution = Execution::pending(scenario.id.clone(), mode, trigger_data);
        execution.parent_execution_id = parent;
        let execution_id = execution.id.clone();

        let control = Arc::new(ControlBlock::new());
        self.shared
            .store
            .insert(execution, Arc::clone(&control), Arc::clone(&scenario));
        tokio::spawn(driver::drive(
            Arc::clone(&self.shared),
            execution_id.clone(),
            scenario,
            control,
        ));
        debug!(execution = %execution_id, "execution launched");
        Ok(execution_id)
    }

    /// Snapshot one execution.
    pub fn get_execution(&self, id: &ExecutionId) -> Option<Execution> {
        self.shared.store.snapshot(id)
    }

    /// Snapshot every known execution.
    pub fn executions(&self) -> Vec<Execution> {
        self.shared.store.snapshots()
    }

    /// Register an event subscriber; filter on [`ExecutionEvent::topic`]
    /// for per-topic delivery.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.shared.events.subscribe()
    }

    /// Ask a running execution to pause at its next wave boundary.
    /// Returns true iff the request initiated a transition.
    pub fn pause_execution(&self, id: &ExecutionId) -> bool {
        match self.shared.store.state(id) {
            Some((ExecutionStatus::Running, control)) if !control.is_paused() => {
                control.request_pause();
                true
            }
            _ => false,
        }
    }

    /// Wake a paused execution. Returns true iff it was paused.
    pub fn resume_execution(&self, id: &ExecutionId) -> bool {
        match self.shared.store.state(id) {
            Some((ExecutionStatus::Paused, control)) => {
                control.clear_pause();
                control.signal_resume();
                true
            }
            _ => false,
        }
    }

    /// Cancel an active execution. A paused execution is woken first so
    /// its driver can observe the cancellation.
    pub fn cancel_execution(&self, id: &ExecutionId) -> bool {
        match self.shared.store.state(id) {
            Some((status, control)) if status.is_active() => {
                if status == ExecutionStatus::Paused || control.is_paused() {
                    control.clear_pause();
                    control.signal_resume();
                }
                control.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel `id` if still active, then launch a fresh execution of the
    /// same scenario linked through `parent_execution_id`.
    pub fn restart_execution(&self, id: &ExecutionId) -> Result<ExecutionId, EngineError> {
        let not_found = || EngineError::ExecutionNotFound { id: id.to_string() };
        let snapshot = self.shared.store.snapshot(id).ok_or_else(not_found)?;
        let scenario = self.shared.store.scenario(id).ok_or_else(not_found)?;

        if snapshot.status.is_active() {
            self.cancel_execution(id);
        }
        self.spawn_execution(
            scenario,
            snapshot.mode,
            snapshot.trigger_data.clone(),
            Some(id.clone()),
        )
    }

    /// Pause every running execution; returns the number of transitions.
    pub fn pause_all(&self) -> usize {
        self.for_each_active(|engine, id| engine.pause_execution(id))
    }

    /// Resume every paused execution; returns the number of transitions.
    pub fn resume_all(&self) -> usize {
        self.for_each_active(|engine, id| engine.resume_execution(id))
    }

    /// Cancel every active execution; returns the number of transitions.
    pub fn cancel_all(&self) -> usize {
        self.for_each_active(|engine, id| engine.cancel_execution(id))
    }

    fn for_each_active(&self, operation: impl Fn(&Self, &ExecutionId) -> bool) -> usize {
        self.shared
            .store
            .active_ids()
            .iter()
            .filter(|id| operation(self, id))
            .count()
    }

    /// Current engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop the sweeper and refuse new work. In-flight executions are not
    /// cancelled; call [`Engine::cancel_all`] first if that is wanted.
    pub fn destroy(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self
            .sweeper
            .lock()
            .expect("sweeper handle mutex poisoned")
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Start-time sanity checks: duplicate step ids, zero iteration counts,
/// and references to unknown sibling steps fail fast before an execution
/// record is created. Cycles are left to the scheduler's runtime deadlock
/// detection.
fn validate_scenario(scenario: &Scenario) -> Result<(), EngineError> {
    let invalid = |reason: String| EngineError::InvalidScenario {
        id: scenario.id.clone(),
        reason,
    };

    let mut seen = HashSet::new();
    for step in &scenario.steps {
        if !seen.insert(&step.id) {
            return Err(invalid(format!("duplicate step id `{}`", step.id)));
        }
        if step.iterations == 0 {
            return Err(invalid(format!("step `{}` declares zero iterations", step.id)));
        }
    }
    for step in &scenario.steps {
        for dependency in &step.depends_on {
            if scenario.step(dependency).is_none() {
                return Err(invalid(format!(
                    "step `{}` depends on unknown step `{dependency}`",
                    step.id
                )));
            }
        }
        if let Some(when) = &step.when
            && scenario.step(&when.step).is_none()
        {
            return Err(invalid(format!(
                "step `{}` guards on unknown step `{}`",
                step.id, when.step
            )));
        }
    }
    Ok(())
}

fn spawn_sweeper(
    store: Arc<ExecutionStore>,
    config: &EngineConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let period = config.cleanup_interval.max(Duration::from_millis(10));
    let ttl = config.cleanup_ttl;
    let max_executions = config.cleanup_max_executions;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh engine
        // does not sweep before anything ran.
        ticker.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    store.sweep(ttl, max_executions);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::{HttpMethod, RequestSpec, Step, StepId};

    fn scenario(steps: Vec<Step>) -> Scenario {
        Scenario {
            id: "scn".into(),
            name: "Scenario".into(),
            steps,
        }
    }

    fn step(id: &str) -> Step {
        Step::new(id, id, RequestSpec::new(HttpMethod::Get, "https://target/"))
    }

    #[test]
    fn duplicate_step_ids_are_rejected() {
        let result = validate_scenario(&scenario(vec![step("a"), step("a")]));
        assert!(matches!(result, Err(EngineError::InvalidScenario { .. })));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let mut dependent = step("b");
        dependent.depends_on = vec![StepId::from("missing")];
        let result = validate_scenario(&scenario(vec![step("a"), dependent]));
        assert!(matches!(result, Err(EngineError::InvalidScenario { .. })));
    }

    #[test]
    fn unknown_guard_reference_is_rejected() {
        let mut guarded = step("b");
        guarded.when = Some(drill_core::WhenClause {
            step: StepId::from("missing"),
            succeeded: Some(true),
            status: None,
        });
        let result = validate_scenario(&scenario(vec![step("a"), guarded]));
        assert!(matches!(result, Err(EngineError::InvalidScenario { .. })));
    }

    #[test]
    fn cycles_pass_validation_for_runtime_detection() {
        let mut a = step("a");
        a.depends_on = vec![StepId::from("b")];
        let mut b = step("b");
        b.depends_on = vec![StepId::from("a")];
        assert!(validate_scenario(&scenario(vec![a, b])).is_ok());
    }

    #[test]
    fn zero_iterations_are_rejected() {
        let mut bad = step("a");
        bad.iterations = 0;
        let result = validate_scenario(&scenario(vec![bad]));
        assert!(matches!(result, Err(EngineError::InvalidScenario { .. })));
    }
}
