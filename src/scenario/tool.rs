//! Tool definitions
//!
//! A tool is a named, parameterized command template. Steps reference tools by
//! name; the tool decides how its command is built, how long it may run, how
//! success is judged and which output variables it exposes afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::value::ParamValue;

/// How a tool is executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Rendered command run through `sh -c`
    #[default]
    Shell,
}

/// A declared tool parameter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Informational type name ("str", "int", ...)
    #[serde(default = "default_param_type", rename = "type")]
    pub param_type: String,

    /// Fail the step if the parameter is not supplied and has no default
    #[serde(default)]
    pub required: bool,

    /// Value used when the step does not supply one
    #[serde(default)]
    pub default: Option<ParamValue>,

    /// Help text
    #[serde(default)]
    pub help: Option<String>,
}

fn default_param_type() -> String {
    "str".to_string()
}

/// Output variables resolved after the command finishes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostExec {
    /// output name -> rule, e.g. `find_file(dir='out', pattern='*.bin')`
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// Tool-level checks applied to every execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolValidation {
    /// Expected exit code; `None` disables the check
    #[serde(default = "default_exit_code")]
    pub exit_code: Option<i32>,

    #[serde(default)]
    pub stdout_contains: Vec<String>,

    #[serde(default)]
    pub stderr_not_contains: Vec<String>,

    /// Paths (relative to the step work dir, wildcards allowed) that must exist
    #[serde(default)]
    pub output_files_exist: Vec<String>,
}

fn default_exit_code() -> Option<i32> {
    Some(0)
}

impl Default for ToolValidation {
    fn default() -> Self {
        Self {
            exit_code: default_exit_code(),
            stdout_contains: Vec::new(),
            stderr_not_contains: Vec::new(),
            output_files_exist: Vec::new(),
        }
    }
}

/// A tool definition, usually loaded from a `*.tool.yml` file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,

    #[serde(default, rename = "type")]
    pub kind: ToolKind,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub parameters: BTreeMap<String, ToolParameter>,

    /// Command with `{{ param }}` placeholders
    pub command_template: String,

    /// Regex that stdout must match when the command exits with 0
    #[serde(default)]
    pub success_pattern: Option<String>,

    /// Regex that must not match stderr when the command exits non-zero
    #[serde(default)]
    pub failure_pattern: Option<String>,

    /// Timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Extra attempts while the result is failed
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub post_exec: Option<PostExec>,

    #[serde(default)]
    pub validation: Option<ToolValidation>,
}

impl Tool {
    /// Create a shell tool with only a name and a command template
    pub fn new(name: impl Into<String>, command_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ToolKind::Shell,
            description: None,
            parameters: BTreeMap::new(),
            command_template: command_template.into(),
            success_pattern: None,
            failure_pattern: None,
            timeout: None,
            retry_count: 0,
            post_exec: None,
            validation: None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// The executable the command starts with, unless it is templated
    pub fn executable(&self) -> Option<&str> {
        let first = self.command_template.split_whitespace().next()?;
        if first.contains("{{") {
            None
        } else {
            Some(first)
        }
    }

    /// Merge declared defaults underneath the supplied parameters
    ///
    /// Returns the name of the first required parameter that is still
    /// missing afterwards.
    pub fn apply_defaults(
        &self,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<BTreeMap<String, ParamValue>, String> {
        let mut merged = params.clone();
        for (name, param) in &self.parameters {
            if merged.contains_key(name) {
                continue;
            }
            match &param.default {
                Some(default) => {
                    merged.insert(name.clone(), default.clone());
                }
                None if param.required => return Err(name.clone()),
                None => {}
            }
        }
        Ok(merged)
    }
}
