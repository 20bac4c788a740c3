//! Tool and scenario loader
//!
//! Load `*.tool.yml`, `*.scenario.yml` and `*.case.yml` files from files and
//! directories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use super::case::CaseFile;
use super::step::Scenario;
use super::tool::Tool;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("Duplicate scenario name: {0}")]
    DuplicateScenario(String),

    #[error("Duplicate case name: {0}")]
    DuplicateCase(String),
}

const TOOL_SUFFIXES: &[&str] = &[".tool.yml", ".tool.yaml"];
const SCENARIO_SUFFIXES: &[&str] = &[".scenario.yml", ".scenario.yaml"];
const CASE_SUFFIXES: &[&str] = &[".case.yml", ".case.yaml"];

pub struct ScenarioLoader;

impl ScenarioLoader {
    pub fn load_tool_file(path: &Path) -> Result<Tool, LoadError> {
        load_yaml(path)
    }

    /// Load every `*.tool.yml` / `*.tool.yaml` file, sorted by file name
    pub fn load_tools_dir(dir: &Path) -> Result<Vec<Tool>, LoadError> {
        let mut tools = Vec::new();
        let mut seen = HashSet::new();

        for path in matching_files(dir, TOOL_SUFFIXES)? {
            let tool = Self::load_tool_file(&path)?;
            if !seen.insert(tool.name.clone()) {
                return Err(LoadError::DuplicateTool(tool.name));
            }
            tools.push(tool);
        }

        Ok(tools)
    }

    pub fn load_scenario_file(path: &Path) -> Result<Scenario, LoadError> {
        load_yaml(path)
    }

    /// Load every `*.scenario.yml` / `*.scenario.yaml` file, sorted by file name
    pub fn load_scenarios_dir(dir: &Path) -> Result<Vec<Scenario>, LoadError> {
        let mut scenarios = Vec::new();
        let mut seen = HashSet::new();

        for path in matching_files(dir, SCENARIO_SUFFIXES)? {
            let scenario = Self::load_scenario_file(&path)?;
            if !seen.insert(scenario.name.clone()) {
                return Err(LoadError::DuplicateScenario(scenario.name));
            }
            scenarios.push(scenario);
        }

        Ok(scenarios)
    }

    /// Load a case file; case names must be unique within it
    pub fn load_case_file(path: &Path) -> Result<CaseFile, LoadError> {
        let file: CaseFile = load_yaml(path)?;
        let mut seen = HashSet::new();
        for case in &file.cases {
            if !seen.insert(case.name.clone()) {
                return Err(LoadError::DuplicateCase(case.name.clone()));
            }
        }
        Ok(file)
    }

    /// Paths of every `*.case.yml` / `*.case.yaml` file, sorted by file name
    pub fn case_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
        matching_files(dir, CASE_SUFFIXES)
    }
}

fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
        file: path.display().to_string(),
        error: e,
    })
}

fn matching_files(dir: &Path, suffixes: &[&str]) -> Result<Vec<PathBuf>, LoadError> {
    let mut paths = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if suffixes.iter().any(|s| filename.ends_with(s)) {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}
