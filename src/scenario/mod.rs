//! Scenario types and definitions
//!
//! This module contains all types for defining and parsing scenarios:
//! - `value` - ParamValue, the renderable parameter tree
//! - `tool` - Tool definitions and their checks
//! - `step` - Scenario and Step
//! - `case` - Cases and case files
//! - `context` - ExecutionContext for runtime state
//! - `template` - `{{ }}` rendering and step reference scanning
//! - `loader` - Load tools, scenarios and case files
//! - `runner_config` - runner.yaml

pub mod case;
pub mod context;
pub mod loader;
pub mod runner_config;
pub mod step;
pub mod template;
pub mod tool;
pub mod value;

pub use case::{Case, CaseFile};
pub use context::{AlreadyCommitted, ExecutionContext, Outputs};
pub use loader::{LoadError, ScenarioLoader};
pub use runner_config::RunnerConfig;
pub use step::{Scenario, Step};
pub use template::{referenced_steps, TemplateEngine, TemplateError};
pub use tool::{PostExec, Tool, ToolKind, ToolParameter, ToolValidation};
pub use value::ParamValue;
