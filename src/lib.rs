//! # Scenario Runner
//!
//! A declarative test-scenario executor. A scenario is a list of named steps,
//! each invoking a tool (a templated shell command). Steps pass data to each
//! other through template references such as
//! `{{ steps.compile.outputs.binary }}`; those references, together with
//! explicit `depends_on` lists, decide the execution order.
//!
//! ## Features
//!
//! - **Dependency leveling** - Steps are grouped into levels; a level only
//!   starts once every earlier level has committed its outputs
//! - **Output passing** - Post-exec rules turn files produced by a tool into
//!   output variables for later steps
//! - **Failure policy** - A failing step aborts the run unless it sets
//!   `continue_on_failure`
//! - **Bounded parallelism** - Steps of one level may run concurrently
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scenario_runner::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tools = ScenarioLoader::load_tools_dir("tools".as_ref())?;
//!     let scenario = ScenarioLoader::load_scenario_file("smoke.scenario.yml".as_ref())?;
//!
//!     let orchestrator = Orchestrator::new(ToolRegistry::from_tools(tools)?, Arc::new(ShellRunner::new()))
//!         .work_dir("scenario_outputs/smoke")
//!         .parallel(2);
//!
//!     let outcome = orchestrator.run(&scenario).await?;
//!     println!("Scenario passed: {}", outcome.overall_success);
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod scenario;

// Re-export main types
pub use engine::{
    CheckResult, DependencyGraph, DependencyNode, ExecutionFailure, GraphError, Orchestrator,
    OrchestratorError, PostExecError, PostExecRule, RegistryError, RunState, ScenarioRunOutcome,
    ShellRunner, StepError, StepInvocation, StepOverrides, StepResult, StepRunner,
    ToolAvailability, ToolRegistry,
};
pub use scenario::{
    referenced_steps, Case, CaseFile, ExecutionContext, LoadError, Outputs, ParamValue,
    RunnerConfig, Scenario, ScenarioLoader, Step, TemplateEngine, TemplateError, Tool,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::engine::{
        DependencyGraph, GraphError, Orchestrator, OrchestratorError, RunState,
        ScenarioRunOutcome, ShellRunner, StepResult, StepRunner, ToolAvailability, ToolRegistry,
    };
    pub use crate::scenario::{
        Case, CaseFile, ExecutionContext, LoadError, ParamValue, RunnerConfig, Scenario,
        ScenarioLoader, Step, Tool,
    };
}
