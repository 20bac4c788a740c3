//! Execution context for a scenario run
//!
//! Holds the global template parameters and the outputs committed by each
//! finished step. A step's outputs are written exactly once.

use std::collections::BTreeMap;

use super::value::ParamValue;

/// Output variables of one step
pub type Outputs = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Outputs for step '{0}' were already committed")]
pub struct AlreadyCommitted(pub String);

/// Runtime context shared by every step of one run
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Global template parameters (defaults, caller params, `case`)
    pub globals: BTreeMap<String, ParamValue>,

    /// Step outputs (step name -> output name -> value)
    steps: BTreeMap<String, Outputs>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_globals(globals: BTreeMap<String, ParamValue>) -> Self {
        Self {
            globals,
            steps: BTreeMap::new(),
        }
    }

    /// Set a global parameter
    pub fn set_global(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.globals.insert(key.to_string(), value.into());
    }

    /// Record the outputs of a finished step
    pub fn commit(&mut self, step: &str, outputs: Outputs) -> Result<(), AlreadyCommitted> {
        if self.steps.contains_key(step) {
            return Err(AlreadyCommitted(step.to_string()));
        }
        self.steps.insert(step.to_string(), outputs);
        Ok(())
    }

    pub fn is_committed(&self, step: &str) -> bool {
        self.steps.contains_key(step)
    }

    /// Get a step output
    pub fn get_output(&self, step: &str, key: &str) -> Option<&ParamValue> {
        self.steps.get(step)?.get(key)
    }

    /// Get all outputs for a step
    pub fn step_outputs(&self, step: &str) -> Option<&Outputs> {
        self.steps.get(step)
    }

    /// Names of the steps with committed outputs
    pub fn committed_steps(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// JSON data handed to the templating service
    ///
    /// Shape: `{ ...globals, steps: { <name>: { outputs: { ... } } } }`.
    /// A global named `steps` is shadowed by the step outputs.
    pub fn template_data(&self) -> serde_json::Value {
        let mut data: serde_json::Map<String, serde_json::Value> = self
            .globals
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();

        let steps: serde_json::Map<String, serde_json::Value> = self
            .steps
            .iter()
            .map(|(name, outputs)| {
                let outputs: serde_json::Map<String, serde_json::Value> = outputs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                (name.clone(), serde_json::json!({ "outputs": outputs }))
            })
            .collect();

        data.insert("steps".to_string(), serde_json::Value::Object(steps));
        serde_json::Value::Object(data)
    }
}
