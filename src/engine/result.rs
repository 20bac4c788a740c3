//! Execution result types

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::error::StepError;
use crate::scenario::Outputs;

/// Outcome of one tool-level check
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub rule: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    pub fn new(rule: impl Into<String>, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            passed,
            detail: detail.into(),
        }
    }
}

/// Result of a step execution
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: String,
    /// `None` when the process never exited on its own
    pub exit_status: Option<i32>,
    pub outputs: Outputs,
    pub stdout: String,
    pub stderr: String,
    pub failed: bool,
    pub checks: Vec<CheckResult>,
    pub error: Option<StepError>,
    pub command: Option<String>,
    pub attempts: u32,
    pub duration: Duration,
}

impl StepResult {
    /// A successful result with the given outputs
    pub fn passed(step_name: impl Into<String>, outputs: Outputs) -> Self {
        Self {
            step_name: step_name.into(),
            exit_status: Some(0),
            outputs,
            stdout: String::new(),
            stderr: String::new(),
            failed: false,
            checks: Vec::new(),
            error: None,
            command: None,
            attempts: 1,
            duration: Duration::ZERO,
        }
    }

    /// A failed result that never produced a process exit
    pub fn failure(step_name: impl Into<String>, error: impl Into<StepError>) -> Self {
        Self {
            exit_status: None,
            failed: true,
            error: Some(error.into()),
            attempts: 0,
            ..Self::passed(step_name, Outputs::new())
        }
    }

    pub fn success(&self) -> bool {
        !self.failed
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid run state transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: RunState,
    pub to: RunState,
}

/// Lifecycle of a scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Aborted,
}

impl RunState {
    pub fn transition(self, to: RunState) -> Result<RunState, InvalidTransition> {
        match (self, to) {
            (RunState::Pending, RunState::Running)
            | (RunState::Running, RunState::Completed)
            | (RunState::Running, RunState::Aborted) => Ok(to),
            _ => Err(InvalidTransition { from: self, to }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted)
    }
}

/// Result of a scenario run
#[derive(Debug, Clone)]
pub struct ScenarioRunOutcome {
    pub run_id: String,
    pub scenario: String,
    pub state: RunState,
    pub execution_order: Vec<Vec<String>>,
    /// In completion order
    pub results: Vec<StepResult>,
    /// The failing step that stopped the run
    pub aborted_at: Option<String>,
    /// Steps never started because the run aborted, in schedule order
    pub skipped: Vec<String>,
    pub overall_success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScenarioRunOutcome {
    pub fn result(&self, step: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step_name == step)
    }

    pub fn failed_steps(&self) -> Vec<&StepResult> {
        self.results.iter().filter(|r| r.failed).collect()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
