//! Test cases
//!
//! A case runs one scenario with its own parameters. Case files group cases
//! and share `common_params` between them:
//!
//! ```yaml
//! common_params:
//!   device: cpu
//! cases:
//!   - name: resnet_int8
//!     scenario: quantize_and_bench
//!     params:
//!       model: resnet50
//!       quantize:          # overrides for the `quantize` step only
//!         bits: 8
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::step::Scenario;
use super::value::ParamValue;

/// One case: a scenario plus parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Name of the scenario to run
    pub scenario: String,

    /// Global template parameters; a map keyed by a step name overrides
    /// that step's parameters instead
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl Case {
    pub fn new(name: impl Into<String>, scenario: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            tags: Vec::new(),
            scenario: scenario.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Parameters that are not step overrides for `scenario`
    pub fn globals(&self, scenario: &Scenario) -> BTreeMap<String, ParamValue> {
        self.params
            .iter()
            .filter(|(key, value)| !is_step_override(scenario, key, value))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Per-step parameter overrides (step name -> params)
    pub fn step_overrides(
        &self,
        scenario: &Scenario,
    ) -> BTreeMap<String, BTreeMap<String, ParamValue>> {
        self.params
            .iter()
            .filter_map(|(key, value)| match value {
                ParamValue::Map(map) if scenario.step(key).is_some() => {
                    Some((key.clone(), map.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

fn is_step_override(scenario: &Scenario, key: &str, value: &ParamValue) -> bool {
    matches!(value, ParamValue::Map(_)) && scenario.step(key).is_some()
}

/// A `*.case.yml` file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseFile {
    /// Parameters shared by every case; a case's own params win
    #[serde(default)]
    pub common_params: BTreeMap<String, ParamValue>,

    pub cases: Vec<Case>,
}

impl CaseFile {
    /// Cases with `common_params` merged under their own params
    pub fn resolved_cases(&self) -> Vec<Case> {
        self.cases
            .iter()
            .map(|case| {
                let mut params = self.common_params.clone();
                params.extend(case.params.clone());
                Case {
                    params,
                    ..case.clone()
                }
            })
            .collect()
    }
}
