//! Code execution and grading engine
//!
//! Runs untrusted submissions in resource-bounded Docker sandboxes and grades
//! their output. Layers, leaves first:
//! - [`language`]: per-language images and run commands
//! - [`workspace`]: disposable per-run host directories
//! - [`runtime`]: container launch seam (Docker in production)
//! - [`sandbox`] and [`sql`]: turn a request into exactly one [`ExecutionResult`]
//! - [`evaluator`]: pure output comparison
//! - [`grader`]: grading modes, verdicts and submission state
//!
//! [`ExecutionResult`]: codegrade_common::types::ExecutionResult

pub mod evaluator;
pub mod grader;
pub mod language;
pub mod runtime;
pub mod sandbox;
pub mod sql;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use grader::{Grader, GradingError, GradingMode};
pub use language::{LanguageProfile, LanguageRegistry, StdinStrategy};
pub use runtime::{ContainerRuntime, ContainerSpec, DockerRuntime, ResourceLimits, RunOutcome};
pub use sandbox::{Sandbox, SandboxLauncher};
pub use workspace::Workspace;
