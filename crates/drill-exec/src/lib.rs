//! Scenario execution engine.
//!
//! Executes declarative HTTP scenarios against a live target: a wave
//! scheduler discovers executable steps as their dependencies settle, a
//! step runner drives each request through template resolution, retries,
//! iterations, extraction, and assertions, and a per-execution control
//! plane supports cooperative pause/resume and hard cancellation. A
//! process-wide admission controller bounds concurrent executions and an
//! event stream publishes every lifecycle transition.
//!
//! [`Engine`] is the entry point; collaborators (`Catalog`, `Requester`)
//! are injected via `drill-core` traits.

mod admission;
pub mod assertion;
mod control;
mod driver;
mod engine;
mod events;
pub mod extract;
pub mod path;
mod report;
mod runner;
mod store;
mod telemetry;
pub mod template;

pub use engine::Engine;
pub use template::{BuiltinSource, RandomBuiltins};
