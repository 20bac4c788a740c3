//! Scenario and Step definitions

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::value::ParamValue;

// ============================================================================
// Scenario
// ============================================================================

/// A named graph of steps, usually loaded from a `*.scenario.yml` file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_version")]
    pub version: String,

    /// Parameters visible to every step's templates
    #[serde(default)]
    pub default_params: BTreeMap<String, ParamValue>,

    /// Environment variables passed to every step's process
    #[serde(default)]
    pub environment: HashMap<String, String>,

    pub steps: Vec<Step>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: None,
            version: default_version(),
            default_params: BTreeMap::new(),
            environment: HashMap::new(),
            steps,
        }
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }
}

// ============================================================================
// Step
// ============================================================================

/// One unit of work in a scenario, bound to a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the scenario
    pub name: String,

    /// Name of the tool to invoke
    pub tool: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Parameter tree; strings may reference `{{ steps.<name>.outputs.<var> }}`
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,

    /// Steps that must finish first, in addition to template references
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Record a failure of this step without aborting the scenario
    #[serde(default)]
    pub continue_on_failure: bool,

    /// Timeout in seconds, overrides the tool's timeout
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl Step {
    pub fn new(name: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool: tool.into(),
            description: None,
            params: BTreeMap::new(),
            depends_on: Vec::new(),
            continue_on_failure: false,
            timeout: None,
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn depends_on(mut self, step: &str) -> Self {
        self.depends_on.push(step.to_string());
        self
    }

    pub fn continue_on_failure(mut self, enabled: bool) -> Self {
        self.continue_on_failure = enabled;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// The parameter tree as a single map value
    pub fn params_value(&self) -> ParamValue {
        ParamValue::Map(self.params.clone())
    }
}
