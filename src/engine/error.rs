//! Executor error types

use std::time::Duration;

use super::graph::GraphError;
use super::post_exec::PostExecError;
use super::result::InvalidTransition;
use crate::scenario::TemplateError;

/// Why a step's command did not succeed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionFailure {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Failed to spawn command: {0}")]
    Spawn(String),

    #[error("Exit code {actual:?}, expected {expected}")]
    ExitStatus { expected: i32, actual: Option<i32> },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Checks failed: {}", .0.join(", "))]
    ChecksFailed(Vec<String>),

    #[error("Post-exec failed: {0}")]
    PostExec(#[from] PostExecError),
}

/// Errors recorded on a single step
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepError {
    #[error("Template render error: {0}")]
    TemplateRender(#[from] TemplateError),

    #[error("Step execution failed: {0}")]
    Execution(#[from] ExecutionFailure),
}

impl StepError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StepError::Execution(ExecutionFailure::Timeout(_)))
    }
}

/// Errors that stop a scenario before any step runs
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Invalid dependency graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Step '{step}' uses unknown tool '{tool}'")]
    UnknownTool { step: String, tool: String },

    #[error("Step '{0}' is scheduled but has no definition")]
    MissingStep(String),

    #[error(transparent)]
    State(#[from] InvalidTransition),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
