//! Core types and collaborator contracts for the drill scenario engine.
//!
//! This crate defines the declarative scenario model, the mutable execution
//! model, the lifecycle event taxonomy, engine configuration, and the
//! capability traits (`Catalog`, `Requester`) implemented by hosts. It
//! carries no execution logic; the engine lives in `drill-exec`.

mod config;
mod error;
mod event;
mod execution;
pub mod http;
mod scenario;

pub use config::EngineConfig;
pub use error::EngineError;
pub use event::{EventKind, ExecutionEvent};
pub use execution::{
    AssessmentReport, AssertionResult, Context, ContextValue, Execution, ExecutionId,
    ExecutionMode, ExecutionStatus, PausedState, StepResult, StepStatus,
};
pub use scenario::{
    BodySpec, Catalog, ExpectSpec, ExtractRule, ExtractSource, HttpMethod, RequestSpec, Scenario,
    Step, StepId, WhenClause,
};

/// Convenient prelude re-exporting the most commonly used items.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::error::EngineError;
    pub use crate::event::{EventKind, ExecutionEvent};
    pub use crate::execution::{
        Execution, ExecutionId, ExecutionMode, ExecutionStatus, StepResult, StepStatus,
    };
    pub use crate::http::{HttpResponse, RequestError, Requester, ResponseBody};
    pub use crate::scenario::{Catalog, Scenario, Step, StepId};
}
