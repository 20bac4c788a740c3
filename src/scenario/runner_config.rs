//! Runner configuration
//!
//! Loaded from `runner.yaml`. Every field is optional:
//!
//! ```yaml
//! parallel: 4
//! tools_dir: tools
//! scenarios_dir: scenarios
//! output_dir: scenario_outputs
//! params:
//!   device: cpu
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::loader::LoadError;
use super::value::ParamValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Maximum steps of one level running at the same time
    #[serde(default = "default_parallel")]
    pub parallel: usize,

    #[serde(default = "default_tools_dir")]
    pub tools_dir: PathBuf,

    #[serde(default = "default_scenarios_dir")]
    pub scenarios_dir: PathBuf,

    /// Root of the per-step working directories
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Global template parameters
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

fn default_parallel() -> usize {
    1
}

fn default_tools_dir() -> PathBuf {
    PathBuf::from("tools")
}

fn default_scenarios_dir() -> PathBuf {
    PathBuf::from("scenarios")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("scenario_outputs")
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            tools_dir: default_tools_dir(),
            scenarios_dir: default_scenarios_dir(),
            output_dir: default_output_dir(),
            params: BTreeMap::new(),
        }
    }
}

impl RunnerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: RunnerConfig = serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
            file: path.display().to_string(),
            error: e,
        })?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.parallel, 1);
        assert_eq!(config.tools_dir, PathBuf::from("tools"));
        assert_eq!(config.output_dir, PathBuf::from("scenario_outputs"));
        assert!(config.params.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
parallel: 8
tools_dir: my_tools
params:
  device: gpu
  batch: 16
"#;
        let config: RunnerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.parallel, 8);
        assert_eq!(config.tools_dir, PathBuf::from("my_tools"));
        assert_eq!(config.scenarios_dir, PathBuf::from("scenarios"));
        assert_eq!(config.params.get("device"), Some(&ParamValue::from("gpu")));
        assert_eq!(config.params.get("batch"), Some(&ParamValue::Integer(16)));
    }

    #[test]
    fn test_parse_empty_config() {
        let config: RunnerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.parallel, 1);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig::load_or_default(dir.path().join("runner.yaml")).unwrap();
        assert_eq!(config.parallel, 1);
    }
}
