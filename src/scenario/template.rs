//! Template rendering for `{{ }}` placeholders
//!
//! Supports:
//! - {{ steps.step_name.outputs.output_name }}
//! - {{ case.name }}
//! - {{ any_default_or_global_param }}
//!
//! Rendering runs in strict mode: a placeholder that names a missing variable
//! is an error rather than an empty string.

use handlebars::{Handlebars, RenderError, RenderErrorReason};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use super::value::ParamValue;

static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").unwrap());

// `steps` must start a path: `foo.steps.x` and `mysteps.x` are not references
static STEP_REFERENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^.\w])steps\.([A-Za-z0-9_]+)\.").unwrap());

/// Errors that can occur during template rendering
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("Undefined reference: {reference}")]
    UndefinedReference { reference: String },

    #[error("Invalid template syntax: {0}")]
    Syntax(String),

    #[error("Render failed: {0}")]
    Render(String),
}

impl From<RenderError> for TemplateError {
    fn from(err: RenderError) -> Self {
        match err.reason() {
            RenderErrorReason::MissingVariable(path) => TemplateError::UndefinedReference {
                reference: path.clone().unwrap_or_else(|| "<unknown>".to_string()),
            },
            RenderErrorReason::TemplateError(e) => TemplateError::Syntax(e.to_string()),
            _ => TemplateError::Render(err.to_string()),
        }
    }
}

/// Step names referenced through `steps.<name>.` inside placeholders
///
/// Walks every string leaf of the tree. Text outside `{{ }}` never counts as
/// a reference.
pub fn referenced_steps(value: &ParamValue) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    for text in value.strings() {
        for placeholder in PLACEHOLDER_REGEX.captures_iter(text) {
            let body = &placeholder[1];
            for reference in STEP_REFERENCE_REGEX.captures_iter(body) {
                found.insert(reference[1].to_string());
            }
        }
    }
    found
}

/// String-interpolation service backed by Handlebars
pub struct TemplateEngine {
    registry: Handlebars<'static>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        Self { registry }
    }

    /// Render a single template string
    pub fn render_str(
        &self,
        template: &str,
        data: &serde_json::Value,
    ) -> Result<String, TemplateError> {
        if !template.contains("{{") {
            return Ok(template.to_string());
        }
        Ok(self.registry.render_template(template, data)?)
    }

    /// Render every string leaf of a parameter tree
    pub fn render_value(
        &self,
        value: &ParamValue,
        data: &serde_json::Value,
    ) -> Result<ParamValue, TemplateError> {
        value.try_map_strings(&mut |s| self.render_str(s, data))
    }

    /// Render a parameter map
    pub fn render_params(
        &self,
        params: &BTreeMap<String, ParamValue>,
        data: &serde_json::Value,
    ) -> Result<BTreeMap<String, ParamValue>, TemplateError> {
        let mut rendered = BTreeMap::new();
        for (key, value) in params {
            rendered.insert(key.clone(), self.render_value(value, data)?);
        }
        Ok(rendered)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
