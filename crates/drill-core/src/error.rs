use thiserror::Error;

/// Errors surfaced at the engine boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The catalog has no scenario under this id.
    #[error("scenario `{id}` not found")]
    ScenarioNotFound { id: String },
    /// No execution is registered under this id.
    #[error("execution `{id}` not found")]
    ExecutionNotFound { id: String },
    /// The scenario failed start-time sanity checks.
    #[error("invalid scenario `{id}`: {reason}")]
    InvalidScenario { id: String, reason: String },
    /// The engine has been destroyed and accepts no new work.
    #[error("engine is shut down")]
    ShutDown,
}
