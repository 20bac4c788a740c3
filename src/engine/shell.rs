//! Shell step execution
//!
//! Runs a tool's rendered command through `sh -c` inside the step's working
//! directory, then resolves post-exec outputs and applies the tool's checks.
//!
//! Example tool:
//! ```yaml
//! name: compiler
//! command_template: "compile {{ model }} -o out/{{ name }}.bin"
//! timeout: 60
//! retry_count: 1
//! success_pattern: "compiled \\d+ layers"
//! post_exec:
//!   outputs:
//!     binary: "find_file(dir='out', pattern='*.bin')"
//! validation:
//!   output_files_exist: ["out/*.bin"]
//! ```

use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::error::{ExecutionFailure, StepError};
use super::post_exec::{self, PostExecError};
use super::result::{CheckResult, StepResult};
use crate::scenario::{Outputs, ParamValue, TemplateEngine, Tool};

/// Everything a runner needs to execute one step
#[derive(Debug, Clone)]
pub struct StepInvocation {
    pub step_name: String,
    pub tool: Tool,
    /// Step parameters, already rendered against the execution context
    pub params: BTreeMap<String, ParamValue>,
    pub work_dir: PathBuf,
    /// Step-level timeout; the tool's timeout applies when unset
    pub timeout: Option<Duration>,
    pub env: HashMap<String, String>,
}

impl StepInvocation {
    pub fn effective_timeout(&self) -> Option<Duration> {
        self.timeout.or_else(|| self.tool.timeout())
    }
}

/// Executes a single step and reports a normalized result
///
/// Failures are reported inside the returned [`StepResult`], never as a
/// separate error channel.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn execute(&self, invocation: StepInvocation) -> StepResult;
}

/// Captured output of one process run
struct ProcessOutput {
    exit_status: Option<i32>,
    stdout: String,
    stderr: String,
}

/// Runs tools as shell commands
#[derive(Default)]
pub struct ShellRunner {
    engine: TemplateEngine,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(&self, invocation: &StepInvocation) -> StepResult {
        let name = invocation.step_name.as_str();
        let tool = &invocation.tool;

        let params = match tool.apply_defaults(&invocation.params) {
            Ok(params) => params,
            Err(missing) => {
                return StepResult::failure(name, ExecutionFailure::MissingParameter(missing))
            }
        };
        let data = ParamValue::Map(params).to_json();

        let command = match self.engine.render_str(&tool.command_template, &data) {
            Ok(command) => command,
            Err(e) => return StepResult::failure(name, e),
        };

        if let Err(e) = tokio::fs::create_dir_all(&invocation.work_dir).await {
            return StepResult::failure(
                name,
                ExecutionFailure::Spawn(format!(
                    "cannot create work dir {}: {}",
                    invocation.work_dir.display(),
                    e
                )),
            );
        }

        let max_attempts = tool.retry_count + 1;
        let mut attempt = 1;
        loop {
            let mut result = self.run_once(invocation, &command, &data).await;
            result.attempts = attempt;

            let timed_out = result.error.as_ref().is_some_and(StepError::is_timeout);
            if !result.failed || timed_out || attempt >= max_attempts {
                return result;
            }

            warn!(
                "Step '{}' failed (attempt {}/{}), retrying: {}",
                name,
                attempt,
                max_attempts,
                result
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_default()
            );
            attempt += 1;
        }
    }

    async fn run_once(
        &self,
        invocation: &StepInvocation,
        command: &str,
        data: &serde_json::Value,
    ) -> StepResult {
        let name = invocation.step_name.as_str();
        let tool = &invocation.tool;
        let work_dir = invocation.work_dir.as_path();

        info!("Executing command for step '{}' in {}", name, work_dir.display());
        debug!("Command: {}", command);

        let timeout = invocation.effective_timeout();
        let output = match spawn(command, work_dir, &invocation.env, timeout).await {
            Ok(output) => output,
            Err(failure) => {
                let mut result = StepResult::failure(name, failure);
                result.command = Some(command.to_string());
                return result;
            }
        };

        write_logs(work_dir, &output).await;

        let checks = self.run_checks(tool, data, work_dir, &output);

        let mut outputs = Outputs::new();
        let mut post_exec_error = None;
        if let Some(post) = &tool.post_exec {
            match post_exec::resolve_outputs(&post.outputs, &self.engine, data, work_dir) {
                Ok(resolved) => outputs.extend(resolved),
                Err(e) => post_exec_error = Some(e),
            }
        }
        add_builtin_outputs(tool, &mut outputs, &output);

        let expected_exit = tool.validation.as_ref().map_or(Some(0), |v| v.exit_code);
        let error = classify_failure(&checks, expected_exit, output.exit_status, post_exec_error);
        StepResult {
            step_name: name.to_string(),
            exit_status: output.exit_status,
            outputs,
            stdout: output.stdout,
            stderr: output.stderr,
            failed: error.is_some(),
            checks,
            error: error.map(StepError::from),
            command: Some(command.to_string()),
            attempts: 1,
            duration: Duration::ZERO,
        }
    }

    fn run_checks(
        &self,
        tool: &Tool,
        data: &serde_json::Value,
        work_dir: &Path,
        output: &ProcessOutput,
    ) -> Vec<CheckResult> {
        let mut checks = Vec::new();
        let validation = tool.validation.clone().unwrap_or_default();

        if let Some(expected) = validation.exit_code {
            checks.push(CheckResult::new(
                "exit_code",
                output.exit_status == Some(expected),
                format!("expected {}, got {:?}", expected, output.exit_status),
            ));
        }

        for needle in &validation.stdout_contains {
            checks.push(CheckResult::new(
                "stdout_contains",
                output.stdout.contains(needle.as_str()),
                format!("'{}'", needle),
            ));
        }

        for needle in &validation.stderr_not_contains {
            checks.push(CheckResult::new(
                "stderr_not_contains",
                !output.stderr.contains(needle.as_str()),
                format!("'{}'", needle),
            ));
        }

        for pattern in &validation.output_files_exist {
            let check = match self.engine.render_str(pattern, data) {
                Ok(rendered) => match post_exec::glob(work_dir, &rendered) {
                    Ok(found) => CheckResult::new(
                        "output_files_exist",
                        !found.is_empty(),
                        format!("'{}' matched {} path(s)", rendered, found.len()),
                    ),
                    Err(e) => CheckResult::new("output_files_exist", false, e.to_string()),
                },
                Err(e) => CheckResult::new("output_files_exist", false, e.to_string()),
            };
            checks.push(check);
        }

        if let (Some(pattern), Some(0)) = (&tool.success_pattern, output.exit_status) {
            checks.push(pattern_check("success_pattern", pattern, &output.stdout, true));
        }

        if let Some(pattern) = &tool.failure_pattern {
            if output.exit_status != Some(0) {
                checks.push(pattern_check("failure_pattern", pattern, &output.stderr, false));
            }
        }

        checks
    }
}

#[async_trait]
impl StepRunner for ShellRunner {
    async fn execute(&self, invocation: StepInvocation) -> StepResult {
        let start = Instant::now();
        let mut result = self.run(&invocation).await;
        result.duration = start.elapsed();
        result
    }
}

async fn spawn(
    command: &str,
    work_dir: &Path,
    env: &HashMap<String, String>,
    timeout: Option<Duration>,
) -> Result<ProcessOutput, ExecutionFailure> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(work_dir)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| ExecutionFailure::Spawn(e.to_string()))?;

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| ExecutionFailure::Timeout(limit))?,
        None => child.wait_with_output().await,
    }
    .map_err(|e| ExecutionFailure::Spawn(e.to_string()))?;

    Ok(ProcessOutput {
        exit_status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

async fn write_logs(work_dir: &Path, output: &ProcessOutput) {
    for (file, content) in [("stdout.log", &output.stdout), ("stderr.log", &output.stderr)] {
        if let Err(e) = tokio::fs::write(work_dir.join(file), content).await {
            warn!("Failed to write {}: {}", file, e);
        }
    }
}

fn add_builtin_outputs(tool: &Tool, outputs: &mut Outputs, output: &ProcessOutput) {
    let declared = |name: &str| {
        tool.post_exec
            .as_ref()
            .is_some_and(|p| p.outputs.contains_key(name))
    };

    let builtins = [
        ("stdout", ParamValue::from(output.stdout.trim())),
        ("stderr", ParamValue::from(output.stderr.trim())),
        (
            "exit_code",
            output
                .exit_status
                .map(|c| ParamValue::Integer(c.into()))
                .unwrap_or(ParamValue::Null),
        ),
    ];
    for (name, value) in builtins {
        if !declared(name) {
            outputs.insert(name.to_string(), value);
        }
    }
}

fn pattern_check(rule: &str, pattern: &str, haystack: &str, must_match: bool) -> CheckResult {
    match Regex::new(pattern) {
        Ok(re) => {
            let matched = re.is_match(haystack);
            CheckResult::new(rule, matched == must_match, format!("/{}/", pattern))
        }
        Err(e) => CheckResult::new(rule, false, format!("invalid regex /{}/: {}", pattern, e)),
    }
}

fn classify_failure(
    checks: &[CheckResult],
    expected_exit: Option<i32>,
    exit_status: Option<i32>,
    post_exec_error: Option<PostExecError>,
) -> Option<ExecutionFailure> {
    let failed: Vec<&CheckResult> = checks.iter().filter(|c| !c.passed).collect();

    if let Some(expected) = expected_exit {
        if failed.iter().any(|c| c.rule == "exit_code") {
            return Some(ExecutionFailure::ExitStatus {
                expected,
                actual: exit_status,
            });
        }
    }
    if !failed.is_empty() {
        return Some(ExecutionFailure::ChecksFailed(
            failed.iter().map(|c| format!("{} {}", c.rule, c.detail)).collect(),
        ));
    }
    post_exec_error.map(ExecutionFailure::PostExec)
}
