//! In-memory registry of executions.
//!
//! Each entry owns the execution record, its control block, and the
//! scenario it runs. Drivers mutate through the store so external readers
//! always observe a coherent snapshot; mutations are serialized by the
//! store mutex, reads clone snapshots out. Terminal records are immutable
//! until the sweeper evicts them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error};

use drill_core::{
    AssessmentReport, Execution, ExecutionId, ExecutionStatus, Scenario,
};

use crate::control::ControlBlock;

struct Entry {
    execution: Execution,
    control: Arc<ControlBlock>,
    scenario: Arc<Scenario>,
}

/// Registry of all known executions, shared by the façade and drivers.
#[derive(Default)]
pub struct ExecutionStore {
    entries: Mutex<HashMap<ExecutionId, Entry>>,
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ExecutionId, Entry>> {
        self.entries.lock().expect("execution store mutex poisoned")
    }

    /// Register a fresh execution with its control block and scenario.
    pub fn insert(
        &self,
        execution: Execution,
        control: Arc<ControlBlock>,
        scenario: Arc<Scenario>,
    ) {
        let id = execution.id.clone();
        self.lock().insert(
            id,
            Entry {
                execution,
                control,
                scenario,
            },
        );
    }

    /// Clone the current snapshot of one execution.
    pub fn snapshot(&self, id: &ExecutionId) -> Option<Execution> {
        self.lock().get(id).map(|entry| entry.execution.clone())
    }

    /// Clone snapshots of every known execution.
    pub fn snapshots(&self) -> Vec<Execution> {
        self.lock()
            .values()
            .map(|entry| entry.execution.clone())
            .collect()
    }

    pub fn status(&self, id: &ExecutionId) -> Option<ExecutionStatus> {
        self.lock().get(id).map(|entry| entry.execution.status)
    }

    /// Atomically read the status together with the control block, for
    /// the façade's transition checks.
    pub fn state(&self, id: &ExecutionId) -> Option<(ExecutionStatus, Arc<ControlBlock>)> {
        self.lock()
            .get(id)
            .map(|entry| (entry.execution.status, entry.control.clone()))
    }

    pub fn control(&self, id: &ExecutionId) -> Option<Arc<ControlBlock>> {
        self.lock().get(id).map(|entry| entry.control.clone())
    }

    pub fn scenario(&self, id: &ExecutionId) -> Option<Arc<Scenario>> {
        self.lock().get(id).map(|entry| entry.scenario.clone())
    }

    /// Ids of executions that have not reached a terminal status.
    pub fn active_ids(&self) -> Vec<ExecutionId> {
        self.lock()
            .iter()
            .filter(|(_, entry)| entry.execution.status.is_active())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Mutate a non-terminal execution and return the post-mutation
    /// snapshot. Terminal records are never mutated; a late update is
    /// dropped with a log line instead.
    pub fn update<R>(
        &self,
        id: &ExecutionId,
        mutate: impl FnOnce(&mut Execution) -> R,
    ) -> Option<(R, Execution)> {
        let mut entries = self.lock();
        let entry = entries.get_mut(id)?;
        if entry.execution.status.is_terminal() {
            debug!(execution = %id, "dropping update to terminal execution");
            return None;
        }
        let outcome = mutate(&mut entry.execution);
        Some((outcome, entry.execution.clone()))
    }

    /// Transition an execution to a terminal status exactly once,
    /// attaching the optional error and report. Returns the terminal
    /// snapshot, or `None` when the record is already terminal (a driver
    /// invariant violation, logged and suppressed).
    pub fn finish(
        &self,
        id: &ExecutionId,
        status: ExecutionStatus,
        error: Option<String>,
        report: Option<AssessmentReport>,
    ) -> Option<Execution> {
        let mut entries = self.lock();
        let entry = entries.get_mut(id)?;
        if entry.execution.status.is_terminal() {
            error!(
                execution = %id,
                current = ?entry.execution.status,
                requested = ?status,
                "refusing double terminal transition"
            );
            return None;
        }
        entry.execution.finish(status);
        entry.execution.error = error;
        entry.execution.report = report;
        Some(entry.execution.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// One sweeper pass: drop terminal executions past `ttl`, then evict
    /// the oldest-finished terminal executions until the store holds at
    /// most `max_executions`. Non-terminal executions are never evicted.
    /// Returns the number of removed records.
    pub fn sweep(&self, ttl: Duration, max_executions: usize) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        let cutoff = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl));

        entries.retain(|_, entry| {
            let execution = &entry.execution;
            if !execution.status.is_terminal() {
                return true;
            }
            match (execution.completed_at, cutoff) {
                (Some(completed), Some(cutoff)) => completed >= cutoff,
                _ => true,
            }
        });

        if entries.len() > max_executions {
            let mut terminal: Vec<(ExecutionId, chrono::DateTime<Utc>)> = entries
                .iter()
                .filter(|(_, entry)| entry.execution.status.is_terminal())
                .map(|(id, entry)| {
                    (
                        id.clone(),
                        entry.execution.completed_at.unwrap_or_else(Utc::now),
                    )
                })
                .collect();
            terminal.sort_by_key(|(_, completed)| *completed);

            let excess = entries.len() - max_executions;
            for (id, _) in terminal.into_iter().take(excess) {
                entries.remove(&id);
            }
        }

        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "swept execution store");
        }
        removed
    }
}
