use serde::Serialize;

use crate::execution::Execution;

/// Lifecycle transition kinds published on the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Updated,
    Paused,
    Resumed,
    Cancelled,
    Completed,
    Failed,
}

impl EventKind {
    /// Wire topic for subscriber registration.
    pub fn topic(self) -> &'static str {
        match self {
            EventKind::Started => "execution:started",
            EventKind::Updated => "execution:updated",
            EventKind::Paused => "execution:paused",
            EventKind::Resumed => "execution:resumed",
            EventKind::Cancelled => "execution:cancelled",
            EventKind::Completed => "execution:completed",
            EventKind::Failed => "execution:failed",
        }
    }

    /// True for the three terminal transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventKind::Cancelled | EventKind::Completed | EventKind::Failed
        )
    }
}

/// One published lifecycle transition carrying the execution snapshot taken
/// at the moment of emission.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionEvent {
    pub kind: EventKind,
    pub execution: Execution,
}

impl ExecutionEvent {
    pub fn new(kind: EventKind, execution: Execution) -> Self {
        Self { kind, execution }
    }

    /// Wire topic of this event.
    pub fn topic(&self) -> &'static str {
        self.kind.topic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_match_wire_names() {
        assert_eq!(EventKind::Started.topic(), "execution:started");
        assert_eq!(EventKind::Updated.topic(), "execution:updated");
        assert_eq!(EventKind::Cancelled.topic(), "execution:cancelled");
    }

    #[test]
    fn terminal_kinds() {
        assert!(EventKind::Completed.is_terminal());
        assert!(EventKind::Failed.is_terminal());
        assert!(EventKind::Cancelled.is_terminal());
        assert!(!EventKind::Updated.is_terminal());
        assert!(!EventKind::Paused.is_terminal());
    }
}
