//! Scenario execution engine module
//!
//! This module contains:
//! - `graph` - Dependency graph builder and leveler
//! - `registry` - Explicit tool registry
//! - `shell` - The shell step runner
//! - `post_exec` - Post-execution output extraction
//! - `orchestrator` - Level-by-level scenario execution
//! - `error` - Executor error types
//! - `result` - Step and scenario result types

pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod post_exec;
pub mod registry;
pub mod result;
pub mod shell;

pub use error::{ExecutionFailure, OrchestratorError, StepError};
pub use graph::{DependencyGraph, DependencyNode, GraphError};
pub use orchestrator::{Orchestrator, StepOverrides};
pub use post_exec::{PostExecError, PostExecRule};
pub use registry::{RegistryError, ToolAvailability, ToolRegistry};
pub use result::{CheckResult, InvalidTransition, RunState, ScenarioRunOutcome, StepResult};
pub use shell::{ShellRunner, StepInvocation, StepRunner};
