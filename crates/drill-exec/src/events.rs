//! Lifecycle event publication.
//!
//! Purely observational: emission is synchronous-in-order from the
//! driver's point of view, and a missing, slow, or dropped subscriber
//! never surfaces back into execution.

use tokio::sync::broadcast;
use tracing::trace;

use drill_core::{EventKind, Execution, ExecutionEvent};

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast fan-out of execution lifecycle transitions. Subscribers
/// filter on [`EventKind::topic`] for per-topic registration.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a subscriber for all subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    /// Publish one transition with the execution snapshot taken at the
    /// moment of emission. Send failures (no subscribers) are ignored.
    pub fn emit(&self, kind: EventKind, execution: Execution) {
        trace!(topic = kind.topic(), execution = %execution.id, "emit");
        let _ = self.sender.send(ExecutionEvent::new(kind, execution));
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::{ExecutionMode, ExecutionStatus};

    fn snapshot() -> Execution {
        Execution::pending("scn", ExecutionMode::Simulation, None)
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_emission_order() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(EventKind::Started, snapshot());
        bus.emit(EventKind::Updated, snapshot());
        bus.emit(EventKind::Completed, snapshot());

        assert_eq!(receiver.recv().await.expect("event").kind, EventKind::Started);
        assert_eq!(receiver.recv().await.expect("event").kind, EventKind::Updated);
        assert_eq!(
            receiver.recv().await.expect("event").kind,
            EventKind::Completed
        );
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(EventKind::Failed, snapshot());
    }

    #[tokio::test]
    async fn snapshot_carries_state_at_emission() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        let mut execution = snapshot();
        execution.status = ExecutionStatus::Running;
        bus.emit(EventKind::Started, execution.clone());

        execution.status = ExecutionStatus::Completed;

        let event = receiver.recv().await.expect("event");
        assert_eq!(event.execution.status, ExecutionStatus::Running);
    }
}
