mod common;

use common::*;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn cli_command() -> Command {
    Command::new(env!("CARGO_BIN_EXE_scenario-runner"))
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Project layout with a `tools/` directory holding `echo` and `fail` tools
fn setup_project(dir: &Path) {
    let tools = dir.join("tools");
    fs::create_dir(&tools).unwrap();
    write_tool(&tools, "echo", &shell_tool("echo", "echo {{ message }}"));
    write_tool(&tools, "fail", &shell_tool("fail", "echo broken >&2; exit 1"));
}

const PASSING_SCENARIO: &str = r#"
name: passing
steps:
  - name: first
    tool: echo
    params:
      message: hello
  - name: second
    tool: echo
    params:
      message: "{{ steps.first.outputs.stdout }} again"
"#;

const FAILING_SCENARIO: &str = r#"
name: failing
steps:
  - name: first
    tool: fail
  - name: second
    tool: echo
    depends_on: [first]
    params:
      message: unreachable
"#;

#[test]
fn test_cli_help() {
    let output = cli_command().arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Run declarative test scenarios"));
    assert!(stdout.contains("run"));
    assert!(stdout.contains("graph"));
    assert!(stdout.contains("tools"));
    assert!(stdout.contains("validate"));
    assert!(stdout.contains("cases"));
}

#[test]
fn test_cli_version() {
    let output = cli_command().arg("--version").output().unwrap();

    assert!(output.status.success());
    assert!(stdout(&output).contains("scenario-runner"));
}

#[test]
fn test_cli_run_help() {
    let output = cli_command().args(["run", "--help"]).output().unwrap();

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Run a scenario file"));
    assert!(stdout.contains("--tools"));
    assert!(stdout.contains("--parallel"));
    assert!(stdout.contains("--param"));
    assert!(stdout.contains("--config"));
}

#[test]
fn test_cli_run_passing_scenario() {
    let dir = create_test_dir();
    setup_project(dir.path());
    write_scenario(dir.path(), "passing.scenario.yml", PASSING_SCENARIO);

    let output = cli_command()
        .current_dir(dir.path())
        .args(["run", "passing.scenario.yml"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("Running scenario: passing"));
    assert!(stdout.contains("✓ first"));
    assert!(stdout.contains("✓ second"));
    assert!(stdout.contains("PASS"));

    let log = dir.path().join("scenario_outputs/passing/second/stdout.log");
    assert_eq!(fs::read_to_string(log).unwrap(), "hello again\n");
}

#[test]
fn test_cli_run_failing_scenario() {
    let dir = create_test_dir();
    setup_project(dir.path());
    write_scenario(dir.path(), "failing.scenario.yml", FAILING_SCENARIO);

    let output = cli_command()
        .current_dir(dir.path())
        .args(["run", "failing.scenario.yml"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = stdout(&output);
    assert!(stdout.contains("✗ first"));
    assert!(stdout.contains("- second (skipped)"));
    assert!(stdout.contains("FAIL"));
}

#[test]
fn test_cli_run_with_params_and_config() {
    let dir = create_test_dir();
    setup_project(dir.path());
    write_runner_config(
        dir.path(),
        r#"
output_dir: out
params:
  message: from-config
"#,
    );
    write_scenario(
        dir.path(),
        "param.scenario.yml",
        r#"
name: param
steps:
  - name: only
    tool: echo
"#,
    );

    let output = cli_command()
        .current_dir(dir.path())
        .args(["run", "param.scenario.yml", "--param", "message=from-cli"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let log = dir.path().join("out/param/only/stdout.log");
    assert_eq!(fs::read_to_string(log).unwrap(), "from-cli\n");
}

#[test]
fn test_cli_run_explicit_work_dir_and_tools() {
    let dir = create_test_dir();
    let tools = dir.path().join("custom_tools");
    fs::create_dir(&tools).unwrap();
    write_tool(&tools, "echo", &shell_tool("echo", "echo {{ message }}"));
    write_scenario(dir.path(), "passing.scenario.yml", PASSING_SCENARIO);
    let work_dir = dir.path().join("work");

    let output = cli_command()
        .args([
            "run",
            dir.path().join("passing.scenario.yml").to_str().unwrap(),
            "--tools",
            tools.to_str().unwrap(),
            "--work-dir",
            work_dir.to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(work_dir.join("first/stdout.log").exists());
}

#[test]
fn test_cli_run_missing_tools_dir() {
    let dir = create_test_dir();
    write_scenario(dir.path(), "passing.scenario.yml", PASSING_SCENARIO);

    let output = cli_command()
        .current_dir(dir.path())
        .args(["run", "passing.scenario.yml"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Tools directory not found"));
}

#[test]
fn test_cli_run_cycle_is_error() {
    let dir = create_test_dir();
    setup_project(dir.path());
    write_scenario(
        dir.path(),
        "cycle.scenario.yml",
        r#"
name: cycle
steps:
  - name: A
    tool: echo
    params:
      message: "{{ steps.B.outputs.stdout }}"
  - name: B
    tool: echo
    params:
      message: "{{ steps.A.outputs.stdout }}"
"#,
    );

    let output = cli_command()
        .current_dir(dir.path())
        .args(["run", "cycle.scenario.yml"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Circular dependency"));
    assert!(!dir.path().join("scenario_outputs/cycle").exists());
}

#[test]
fn test_cli_graph_text_and_mermaid() {
    let dir = create_test_dir();
    write_scenario(dir.path(), "passing.scenario.yml", PASSING_SCENARIO);
    let file = dir.path().join("passing.scenario.yml");

    let output = cli_command()
        .args(["graph", file.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("passing"));
    assert!(text.contains("first"));
    assert!(text.contains("second"));

    let output = cli_command()
        .args(["graph", file.to_str().unwrap(), "--mermaid"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let mermaid = stdout(&output);
    assert!(mermaid.starts_with("graph TD"));
    assert!(mermaid.contains("first --> second"));
}

#[test]
fn test_cli_validate_file_and_dir() {
    let dir = create_test_dir();
    write_scenario(dir.path(), "passing.scenario.yml", PASSING_SCENARIO);
    write_scenario(dir.path(), "failing.scenario.yml", FAILING_SCENARIO);

    let output = cli_command()
        .args([
            "validate",
            dir.path().join("passing.scenario.yml").to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("✓ passing is valid: 2 steps, 2 execution levels"));

    let output = cli_command()
        .args(["validate", dir.path().to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("✓ 2 scenarios validated"));
}

#[test]
fn test_cli_validate_missing_reference() {
    let dir = create_test_dir();
    write_scenario(
        dir.path(),
        "ghost.scenario.yml",
        r#"
name: ghost
steps:
  - name: x
    tool: echo
    params:
      message: "{{ steps.ghost.outputs.stdout }}"
"#,
    );

    let output = cli_command()
        .args([
            "validate",
            dir.path().join("ghost.scenario.yml").to_str().unwrap(),
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ghost"));
}

#[test]
fn test_cli_tools_listing() {
    let dir = create_test_dir();
    setup_project(dir.path());
    write_tool(
        &dir.path().join("tools"),
        "missing",
        &shell_tool("missing", "definitely-not-installed-xyz --run"),
    );

    let output = cli_command()
        .args(["tools", "--tools", dir.path().join("tools").to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("echo - available"));
    assert!(stdout.contains("missing - missing 'definitely-not-installed-xyz'"));
}

#[test]
fn test_cli_tools_missing_dir() {
    let dir = create_test_dir();
    let output = cli_command()
        .args(["tools", "--tools", dir.path().join("nope").to_str().unwrap()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Directory not found"));
}

const GREET_SCENARIO: &str = r#"
name: greet
default_params:
  suffix: default
steps:
  - name: say
    tool: echo
    params:
      message: "{{ case.name }}-{{ suffix }}"
"#;

/// Project with `scenarios/greet.scenario.yml`
fn setup_case_project(dir: &Path) {
    setup_project(dir);
    let scenarios = dir.join("scenarios");
    fs::create_dir(&scenarios).unwrap();
    write_scenario(&scenarios, "greet.scenario.yml", GREET_SCENARIO);
}

#[test]
fn test_cli_cases_run_with_params_and_overrides() {
    let dir = create_test_dir();
    setup_case_project(dir.path());
    write_scenario(
        dir.path(),
        "smoke.case.yml",
        r#"
common_params:
  suffix: common
cases:
  - name: alpha
    scenario: greet
  - name: beta
    scenario: greet
    params:
      say:
        message: overridden
"#,
    );

    let output = cli_command()
        .current_dir(dir.path())
        .args(["cases", "smoke.case.yml"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("Running case: alpha (greet)"));
    assert!(stdout.contains("2/2 cases passed"));

    let alpha = dir.path().join("scenario_outputs/alpha/say/stdout.log");
    assert_eq!(fs::read_to_string(alpha).unwrap(), "alpha-common\n");
    let beta = dir.path().join("scenario_outputs/beta/say/stdout.log");
    assert_eq!(fs::read_to_string(beta).unwrap(), "overridden\n");
}

#[test]
fn test_cli_cases_directory_with_unknown_scenario() {
    let dir = create_test_dir();
    setup_case_project(dir.path());
    let cases = dir.path().join("cases");
    fs::create_dir(&cases).unwrap();
    write_scenario(
        &cases,
        "a.case.yml",
        "cases:\n  - {name: known, scenario: greet}\n",
    );
    write_scenario(
        &cases,
        "b.case.yaml",
        "cases:\n  - {name: lost, scenario: ghost}\n",
    );
    write_scenario(&cases, "notes.yml", "not: a case file\n");

    let output = cli_command()
        .current_dir(dir.path())
        .args(["cases", "cases"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("✗ lost: unknown scenario 'ghost'"));
    assert!(stdout.contains("1/2 cases passed"));
}

#[test]
fn test_cli_cases_duplicate_name_is_error() {
    let dir = create_test_dir();
    setup_case_project(dir.path());
    write_scenario(
        dir.path(),
        "dup.case.yml",
        "cases:\n  - {name: same, scenario: greet}\n  - {name: same, scenario: greet}\n",
    );

    let output = cli_command()
        .current_dir(dir.path())
        .args(["cases", "dup.case.yml"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Duplicate case name: same"));
}
