//! Scenario orchestrator
//!
//! Runs a scenario level by level. Before each level the parameters of its
//! steps are rendered against the outputs committed so far; the steps are
//! then dispatched (up to `parallel` at once) and their outputs committed as
//! results arrive. A failing step without `continue_on_failure` stops the run:
//! steps already in flight finish, nothing else starts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use super::error::{ExecutionFailure, OrchestratorError};
use super::graph::DependencyGraph;
use super::registry::ToolRegistry;
use super::result::{RunState, ScenarioRunOutcome, StepResult};
use super::shell::{StepInvocation, StepRunner};
use crate::scenario::{Case, ExecutionContext, ParamValue, Scenario, Step, TemplateEngine};

/// Step name -> parameters merged over that step's own
pub type StepOverrides = BTreeMap<String, BTreeMap<String, ParamValue>>;

pub struct Orchestrator {
    registry: ToolRegistry,
    runner: Arc<dyn StepRunner>,
    engine: TemplateEngine,
    max_concurrent: usize,
    work_dir: PathBuf,
    globals: BTreeMap<String, ParamValue>,
    step_overrides: StepOverrides,
    environment: HashMap<String, String>,
}

impl Orchestrator {
    pub fn new(registry: ToolRegistry, runner: Arc<dyn StepRunner>) -> Self {
        Self {
            registry,
            runner,
            engine: TemplateEngine::new(),
            max_concurrent: 1,
            work_dir: PathBuf::from("scenario_outputs"),
            globals: BTreeMap::new(),
            step_overrides: BTreeMap::new(),
            environment: HashMap::new(),
        }
    }

    /// Maximum steps of one level running at the same time
    pub fn parallel(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Root of the per-step working directories
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Global template parameters, layered over the scenario's defaults
    pub fn globals(mut self, globals: BTreeMap<String, ParamValue>) -> Self {
        self.globals = globals;
        self
    }

    /// Per-step parameters merged over each step's own parameters
    pub fn step_overrides(mut self, overrides: StepOverrides) -> Self {
        self.step_overrides = overrides;
        self
    }

    /// Environment variables for every step process
    pub fn environment(mut self, env: HashMap<String, String>) -> Self {
        self.environment = env;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Validate and run a scenario
    ///
    /// Graph and tool errors are returned before any step runs.
    #[instrument(skip_all, fields(scenario = %scenario.name))]
    pub async fn run(&self, scenario: &Scenario) -> Result<ScenarioRunOutcome, OrchestratorError> {
        self.run_as(scenario, &scenario.name, self.globals.clone(), &self.step_overrides)
            .await
    }

    /// Run `scenario` for one case
    ///
    /// The case's params are layered over the orchestrator globals, maps
    /// keyed by a step name become that step's overrides and `case.name` is
    /// the case's name.
    #[instrument(skip_all, fields(case = %case.name, scenario = %scenario.name))]
    pub async fn run_case(
        &self,
        case: &Case,
        scenario: &Scenario,
    ) -> Result<ScenarioRunOutcome, OrchestratorError> {
        let mut globals = self.globals.clone();
        globals.extend(case.globals(scenario));

        let mut overrides = self.step_overrides.clone();
        for (step, params) in case.step_overrides(scenario) {
            overrides.entry(step).or_default().extend(params);
        }

        self.run_as(scenario, &case.name, globals, &overrides).await
    }

    async fn run_as(
        &self,
        scenario: &Scenario,
        case_name: &str,
        globals: BTreeMap<String, ParamValue>,
        overrides: &StepOverrides,
    ) -> Result<ScenarioRunOutcome, OrchestratorError> {
        let graph = DependencyGraph::build(&scenario.steps)?;
        self.check_tools(&scenario.steps)?;

        let mut merged = scenario.default_params.clone();
        merged.extend(globals);
        merged.entry("case".to_string()).or_insert_with(|| {
            ParamValue::Map(BTreeMap::from([(
                "name".to_string(),
                ParamValue::from(case_name),
            )]))
        });
        let mut context = ExecutionContext::with_globals(merged);

        let mut environment = scenario.environment.clone();
        environment.extend(self.environment.clone());

        info!(
            "Running scenario '{}' as '{}' ({} steps, {} levels)",
            scenario.name,
            case_name,
            graph.len(),
            graph.execution_order().len()
        );

        let mut outcome = self
            .execute_levels(&graph, &scenario.steps, &mut context, &environment, overrides)
            .await?;
        outcome.scenario = scenario.name.clone();
        Ok(outcome)
    }

    /// Run an already built graph against an existing context
    #[instrument(skip_all)]
    pub async fn run_graph(
        &self,
        graph: &DependencyGraph,
        steps: &[Step],
        context: &mut ExecutionContext,
    ) -> Result<ScenarioRunOutcome, OrchestratorError> {
        self.check_tools(steps)?;
        self.execute_levels(graph, steps, context, &self.environment, &self.step_overrides)
            .await
    }

    fn check_tools(&self, steps: &[Step]) -> Result<(), OrchestratorError> {
        for step in steps {
            if !self.registry.contains(&step.tool) {
                return Err(OrchestratorError::UnknownTool {
                    step: step.name.clone(),
                    tool: step.tool.clone(),
                });
            }
        }
        Ok(())
    }

    async fn execute_levels(
        &self,
        graph: &DependencyGraph,
        steps: &[Step],
        context: &mut ExecutionContext,
        environment: &HashMap<String, String>,
        overrides: &StepOverrides,
    ) -> Result<ScenarioRunOutcome, OrchestratorError> {
        let by_name: HashMap<&str, &Step> = steps.iter().map(|s| (s.name.as_str(), s)).collect();
        for level in graph.execution_order() {
            for name in level {
                if !by_name.contains_key(name.as_str()) {
                    return Err(OrchestratorError::MissingStep(name.clone()));
                }
            }
        }

        let started_at = Utc::now();
        let mut state = RunState::Pending.transition(RunState::Running)?;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let abort = Arc::new(AtomicBool::new(false));

        let mut results: Vec<StepResult> = Vec::new();
        let mut tolerated: HashSet<String> = HashSet::new();
        let mut skipped: Vec<String> = Vec::new();
        let mut aborted_at: Option<String> = None;
        let total_levels = graph.execution_order().len();

        for (index, level) in graph.execution_order().iter().enumerate() {
            if abort.load(Ordering::SeqCst) {
                skipped.extend(level.iter().cloned());
                continue;
            }

            info!("Level {}/{}: {}", index + 1, total_levels, level.join(", "));
            let data = context.template_data();

            let mut in_flight = FuturesUnordered::new();
            for name in level {
                let step = by_name[name.as_str()];
                let prepared = self.prepare(step, &data, context, environment, overrides);
                let runner = self.runner.clone();
                let semaphore = semaphore.clone();
                let abort = abort.clone();
                let name = name.clone();

                in_flight.push(async move {
                    // The semaphore is never closed
                    let _permit = semaphore.acquire_owned().await.ok();
                    if abort.load(Ordering::SeqCst) {
                        return (name, None);
                    }
                    let result = match prepared {
                        Ok(invocation) => runner.execute(invocation).await,
                        Err(failed) => failed,
                    };
                    (name, Some(result))
                });
            }

            let mut not_started = Vec::new();
            while let Some((name, result)) = in_flight.next().await {
                let Some(mut result) = result else {
                    not_started.push(name);
                    continue;
                };
                let step = by_name[name.as_str()];
                if result.step_name != name {
                    warn!(
                        "Runner reported step '{}' as '{}'",
                        name, result.step_name
                    );
                    result.step_name = name.clone();
                }

                if let Err(e) = context.commit(&name, result.outputs.clone()) {
                    warn!("{}", e);
                }

                if !result.failed {
                    info!("Step '{}' passed in {:?}", name, result.duration);
                } else if step.continue_on_failure {
                    tolerated.insert(name.clone());
                    warn!(
                        "Step '{}' failed, continuing: {}",
                        name,
                        describe_failure(&result)
                    );
                } else {
                    error!(
                        "Step '{}' failed, aborting scenario: {}",
                        name,
                        describe_failure(&result)
                    );
                    abort.store(true, Ordering::SeqCst);
                    aborted_at.get_or_insert_with(|| name.clone());
                }

                results.push(result);
            }

            not_started.sort_by_key(|name| level.iter().position(|n| n == name));
            skipped.extend(not_started);
        }

        let overall_success = !results
            .iter()
            .any(|r| r.failed && !tolerated.contains(&r.step_name));

        state = state.transition(if aborted_at.is_some() {
            RunState::Aborted
        } else {
            RunState::Completed
        })?;

        info!(
            "Run finished: {:?}, {} passed, {} failed, {} skipped",
            state,
            results.iter().filter(|r| r.success()).count(),
            results.iter().filter(|r| r.failed).count(),
            skipped.len()
        );

        Ok(ScenarioRunOutcome {
            run_id: uuid::Uuid::new_v4().to_string(),
            scenario: String::new(),
            state,
            execution_order: graph.execution_order().to_vec(),
            results,
            aborted_at,
            skipped,
            overall_success,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Render a step's parameters and build its invocation
    ///
    /// Globals the step does not set are filled in before rendering, so
    /// templated defaults resolve like the step's own params. A render
    /// failure becomes the step's failed result.
    fn prepare(
        &self,
        step: &Step,
        data: &serde_json::Value,
        context: &ExecutionContext,
        environment: &HashMap<String, String>,
        overrides: &StepOverrides,
    ) -> Result<StepInvocation, StepResult> {
        let tool = self.registry.get(&step.tool).ok_or_else(|| {
            StepResult::failure(&step.name, ExecutionFailure::UnknownTool(step.tool.clone()))
        })?;

        let mut params = step.params.clone();
        if let Some(step_overrides) = overrides.get(&step.name) {
            params.extend(step_overrides.clone());
        }
        for (key, value) in &context.globals {
            params.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let params = self
            .engine
            .render_params(&params, data)
            .map_err(|e| StepResult::failure(&step.name, e))?;

        Ok(StepInvocation {
            step_name: step.name.clone(),
            tool: tool.clone(),
            params,
            work_dir: self.work_dir.join(&step.name),
            timeout: step.timeout(),
            env: environment.clone(),
        })
    }
}

fn describe_failure(result: &StepResult) -> String {
    result
        .error
        .as_ref()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "failed".to_string())
}
