use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use scenario_runner::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scenario-runner")]
#[command(about = "Run declarative test scenarios", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file
    Run {
        /// Path to the scenario YAML file
        #[arg(value_name = "SCENARIO_FILE")]
        file: PathBuf,

        /// Directory of *.tool.yml files (overrides config)
        #[arg(short, long)]
        tools: Option<PathBuf>,

        /// Root of the step working directories (default: <output_dir>/<scenario>)
        #[arg(short, long)]
        work_dir: Option<PathBuf>,

        /// Path to runner.yaml config file (default: ./runner.yaml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum steps of one level running at once (overrides config)
        #[arg(short, long)]
        parallel: Option<usize>,

        /// Global template parameter, repeatable
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
    },

    /// Run the cases of a case file, or of every *.case.yml in a directory
    Cases {
        /// Path to a case file or directory
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Directory of *.tool.yml files (overrides config)
        #[arg(short, long)]
        tools: Option<PathBuf>,

        /// Directory of *.scenario.yml files (overrides config)
        #[arg(short, long)]
        scenarios: Option<PathBuf>,

        /// Root of the case working directories (default: <output_dir>)
        #[arg(short, long)]
        work_dir: Option<PathBuf>,

        /// Path to runner.yaml config file (default: ./runner.yaml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum steps of one level running at once (overrides config)
        #[arg(short, long)]
        parallel: Option<usize>,
    },

    /// Show the dependency graph of a scenario
    Graph {
        /// Path to the scenario YAML file
        #[arg(value_name = "SCENARIO_FILE")]
        file: PathBuf,

        /// Print a Mermaid diagram instead of the text summary
        #[arg(long)]
        mermaid: bool,
    },

    /// List tools and whether their executables are available
    Tools {
        /// Directory of *.tool.yml files
        #[arg(short, long, default_value = "tools")]
        tools: PathBuf,
    },

    /// Validate scenario files without running them
    Validate {
        /// Path to a scenario file or directory
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "scenario_runner=debug"
    } else {
        "scenario_runner=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "scenario-runner failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run {
            file,
            tools,
            work_dir,
            config,
            parallel,
            params,
        } => run_scenario(file, tools, work_dir, config, parallel, params).await,
        Commands::Cases {
            path,
            tools,
            scenarios,
            work_dir,
            config,
            parallel,
        } => run_cases(path, tools, scenarios, work_dir, config, parallel).await,
        Commands::Graph { file, mermaid } => show_graph(file, mermaid),
        Commands::Tools { tools } => list_tools(tools),
        Commands::Validate { path } => validate(path),
    }
}

/// Parse `KEY=VALUE`; the value is read as a YAML scalar
fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = serde_yaml::from_str::<ParamValue>(value)
        .ok()
        .filter(|v| !matches!(v, ParamValue::List(_) | ParamValue::Map(_) | ParamValue::Null))
        .unwrap_or_else(|| ParamValue::from(value));
    Ok((key.to_string(), value))
}

fn load_config(config: Option<PathBuf>) -> anyhow::Result<RunnerConfig> {
    Ok(match config {
        Some(path) => RunnerConfig::load(&path)?,
        None => RunnerConfig::load_or_default("runner.yaml")?,
    })
}

fn load_registry(dir: &Path) -> anyhow::Result<ToolRegistry> {
    if !dir.is_dir() {
        anyhow::bail!("Tools directory not found: {}", dir.display());
    }
    Ok(ToolRegistry::from_tools(ScenarioLoader::load_tools_dir(dir)?)?)
}

async fn run_scenario(
    file: PathBuf,
    tools: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    parallel: Option<usize>,
    params: Vec<(String, ParamValue)>,
) -> anyhow::Result<bool> {
    let config = load_config(config)?;
    let scenario = ScenarioLoader::load_scenario_file(&file)?;
    let registry = load_registry(&tools.unwrap_or_else(|| config.tools_dir.clone()))?;

    let work_dir = work_dir.unwrap_or_else(|| config.output_dir.join(&scenario.name));
    let mut globals: BTreeMap<String, ParamValue> = config.params.clone();
    globals.extend(params);

    let orchestrator = Orchestrator::new(registry, Arc::new(ShellRunner::new()))
        .parallel(parallel.unwrap_or(config.parallel))
        .work_dir(&work_dir)
        .globals(globals);

    println!("Running scenario: {}", scenario.name);
    println!("Work dir: {}\n", work_dir.display());

    let outcome = orchestrator.run(&scenario).await?;
    print_outcome(&scenario, &outcome);

    Ok(outcome.overall_success)
}

async fn run_cases(
    path: PathBuf,
    tools: Option<PathBuf>,
    scenarios: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    parallel: Option<usize>,
) -> anyhow::Result<bool> {
    let config = load_config(config)?;

    let case_files = if path.is_dir() {
        ScenarioLoader::case_files(&path)?
    } else if path.exists() {
        vec![path.clone()]
    } else {
        anyhow::bail!("Path not found: {}", path.display());
    };

    let mut cases = Vec::new();
    for file in &case_files {
        cases.extend(ScenarioLoader::load_case_file(file)?.resolved_cases());
    }
    if cases.is_empty() {
        println!("No cases found in: {}", path.display());
        return Ok(true);
    }

    let scenarios_dir = scenarios.unwrap_or_else(|| config.scenarios_dir.clone());
    if !scenarios_dir.is_dir() {
        anyhow::bail!("Scenarios directory not found: {}", scenarios_dir.display());
    }
    let scenarios: BTreeMap<String, Scenario> = ScenarioLoader::load_scenarios_dir(&scenarios_dir)?
        .into_iter()
        .map(|s| (s.name.clone(), s))
        .collect();

    let registry = load_registry(&tools.unwrap_or_else(|| config.tools_dir.clone()))?;
    let output_dir = work_dir.unwrap_or_else(|| config.output_dir.clone());
    let parallel = parallel.unwrap_or(config.parallel);

    let mut passed = 0;
    for case in &cases {
        let Some(scenario) = scenarios.get(&case.scenario) else {
            println!("✗ {}: unknown scenario '{}'", case.name, case.scenario);
            continue;
        };

        let case_dir = output_dir.join(&case.name);
        println!("Running case: {} ({})", case.name, scenario.name);
        println!("Work dir: {}", case_dir.display());

        let orchestrator = Orchestrator::new(registry.clone(), Arc::new(ShellRunner::new()))
            .parallel(parallel)
            .work_dir(&case_dir)
            .globals(config.params.clone());

        let outcome = match orchestrator.run_case(case, scenario).await {
            Ok(outcome) => outcome,
            Err(e) => {
                println!("✗ {}: {}\n", case.name, e);
                continue;
            }
        };
        print_outcome(scenario, &outcome);
        if outcome.overall_success {
            passed += 1;
        }
        println!();
    }

    println!("{}/{} cases passed", passed, cases.len());
    Ok(passed == cases.len())
}

fn show_graph(file: PathBuf, mermaid: bool) -> anyhow::Result<bool> {
    let scenario = ScenarioLoader::load_scenario_file(&file)?;
    let graph = DependencyGraph::build(&scenario.steps)?;

    if mermaid {
        println!("{}", graph.to_mermaid());
    } else {
        println!("{}", graph.text_summary(&scenario.name));
    }

    Ok(true)
}

fn list_tools(dir: PathBuf) -> anyhow::Result<bool> {
    if !dir.exists() {
        anyhow::bail!("Directory not found: {}", dir.display());
    }

    let registry = ToolRegistry::from_tools(ScenarioLoader::load_tools_dir(&dir)?)?;

    if registry.is_empty() {
        println!("No tools found in: {}", dir.display());
        return Ok(true);
    }

    println!("Tools in {}:\n", dir.display());

    for name in registry.names() {
        let status = match registry.availability(name) {
            ToolAvailability::Available { path } => format!("available ({})", path.display()),
            ToolAvailability::Missing { executable } => format!("missing '{}'", executable),
            ToolAvailability::Templated => "resolved at run time".to_string(),
            ToolAvailability::Unregistered => "unregistered".to_string(),
        };
        println!("  {} - {}", name, status);
    }

    Ok(true)
}

fn validate(path: PathBuf) -> anyhow::Result<bool> {
    if !path.exists() {
        anyhow::bail!("Path not found: {}", path.display());
    }

    if path.is_dir() {
        let scenarios = ScenarioLoader::load_scenarios_dir(&path)?;
        if scenarios.is_empty() {
            println!("No scenarios found in: {}", path.display());
            return Ok(true);
        }

        for scenario in &scenarios {
            validate_scenario(scenario, &path)?;
        }
        println!("✓ {} scenarios validated", scenarios.len());
    } else {
        let scenario = ScenarioLoader::load_scenario_file(&path)?;
        validate_scenario(&scenario, &path)?;
    }

    Ok(true)
}

fn validate_scenario(scenario: &Scenario, source: &Path) -> anyhow::Result<()> {
    let graph = DependencyGraph::build(&scenario.steps)
        .map_err(|e| anyhow::anyhow!("{} ({}): {}", scenario.name, source.display(), e))?;
    println!(
        "✓ {} is valid: {} steps, {} execution levels",
        scenario.name,
        graph.len(),
        graph.execution_order().len()
    );
    Ok(())
}

fn print_outcome(scenario: &Scenario, outcome: &ScenarioRunOutcome) {
    println!("\n=== Scenario Result ===\n");
    println!("Run ID: {}", outcome.run_id);
    println!("State: {:?}\n", outcome.state);

    for result in &outcome.results {
        let status = if result.success() {
            "✓"
        } else if scenario
            .step(&result.step_name)
            .is_some_and(|s| s.continue_on_failure)
        {
            "!"
        } else {
            "✗"
        };
        println!(
            "{} {} ({:.2}s)",
            status,
            result.step_name,
            result.duration.as_secs_f64()
        );
        if let Some(err) = &result.error {
            println!("    Error: {}", err);
        }
    }

    for name in &outcome.skipped {
        println!("- {} (skipped)", name);
    }

    println!(
        "\n{}",
        if outcome.overall_success {
            "PASS"
        } else {
            "FAIL"
        }
    );
}
