#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scenario_runner::{Outputs, ParamValue, Step, StepInvocation, StepResult, StepRunner};
use tempfile::TempDir;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_tool(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(format!("{}.tool.yml", name)), content).expect("Failed to write tool file");
}

pub fn write_scenario(dir: &Path, filename: &str, content: &str) {
    fs::write(dir.join(filename), content).expect("Failed to write scenario file");
}

pub fn write_runner_config(dir: &Path, content: &str) {
    fs::write(dir.join("runner.yaml"), content).expect("Failed to write runner.yaml");
}

/// Tool running `command_template` as-is
pub fn shell_tool(name: &str, command_template: &str) -> String {
    format!(
        r#"
name: {}
command_template: '{}'
"#,
        name, command_template
    )
}

/// Step that references `steps.<dep>.outputs.v` for every dep
pub fn step_referencing(name: &str, deps: &[&str]) -> Step {
    let mut step = Step::new(name, "fake");
    for dep in deps {
        step = step.with_param(
            &format!("from_{}", dep),
            format!("{{{{ steps.{}.outputs.v }}}}", dep),
        );
    }
    step
}

/// In-memory runner for orchestrator tests
///
/// Every step outputs `v = "<step>-out"` plus its rendered params. Steps
/// listed in `failing` report failure; `delay` simulates slow commands.
#[derive(Default)]
pub struct FakeRunner {
    pub failing: HashSet<String>,
    pub delay: Duration,
    pub calls: Mutex<Vec<String>>,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, steps: &[&str]) -> Self {
        self.failing = steps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepRunner for FakeRunner {
    async fn execute(&self, invocation: StepInvocation) -> StepResult {
        let name = invocation.step_name.clone();
        self.calls.lock().unwrap().push(name.clone());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        let mut outputs: Outputs = invocation.params.clone();
        outputs.insert("v".to_string(), ParamValue::from(format!("{}-out", name)));

        let mut result = StepResult::passed(name.clone(), outputs);
        if self.failing.contains(&name) {
            result.failed = true;
            result.exit_status = Some(1);
        }
        result
    }
}
