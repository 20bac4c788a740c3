//! Post-execution output extraction
//!
//! Tools declare output variables as function-call rules:
//!
//! ```yaml
//! post_exec:
//!   outputs:
//!     binary: "find_file(dir='out', pattern='*.bin')"
//!     report: "find_latest_file(dir='.', pattern='**/report_*.json')"
//!     model_dir: "find_dir(dir='.', pattern='**/*.onnx')"
//!     has_log: "file_exists(path='run.log')"
//! ```
//!
//! Argument values may contain `{{ }}` placeholders, rendered against the
//! step's parameters. Paths resolve relative to the step working directory.

use glob::{MatchOptions, Pattern};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

use crate::scenario::{ParamValue, TemplateEngine, TemplateError};

static CALL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\w+)\((.*)\)\s*$").unwrap());

static ARG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\s*=\s*'([^']*)'").unwrap());

const ONNX_PATTERN: &str = "**/*.onnx";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PostExecError {
    #[error("Invalid post-exec rule: {0}")]
    InvalidRule(String),

    #[error("Unknown post-exec function: {0}")]
    UnknownFunction(String),

    #[error("{function}() requires argument '{argument}'")]
    MissingArgument { function: String, argument: String },

    #[error("Template error in post-exec argument: {0}")]
    Template(#[from] TemplateError),

    #[error("No file found for pattern '{pattern}' in directory '{dir}'")]
    NotFound { dir: String, pattern: String },

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PostExecError {
    fn from(err: std::io::Error) -> Self {
        PostExecError::Io(err.to_string())
    }
}

/// A parsed post-exec rule
#[derive(Debug, Clone, PartialEq)]
pub enum PostExecRule {
    /// First match by name
    FindFile { dir: String, pattern: String },
    /// Most recently modified match
    FindLatestFile { dir: String, pattern: String },
    /// Directory holding the most recently modified match
    FindDir { dir: String, pattern: String },
    /// Whether a path exists
    FileExists { path: String },
}

impl PostExecRule {
    pub fn parse(rule: &str) -> Result<Self, PostExecError> {
        let call = CALL_REGEX
            .captures(rule)
            .ok_or_else(|| PostExecError::InvalidRule(rule.to_string()))?;
        let function = call[1].to_string();
        let args: HashMap<String, String> = ARG_REGEX
            .captures_iter(&call[2])
            .map(|c| (c[1].to_string(), c[2].to_string()))
            .collect();

        let arg = |name: &str, default: Option<&str>| -> Result<String, PostExecError> {
            args.get(name)
                .cloned()
                .or_else(|| default.map(String::from))
                .ok_or_else(|| PostExecError::MissingArgument {
                    function: function.clone(),
                    argument: name.to_string(),
                })
        };

        match function.as_str() {
            "find_file" => Ok(PostExecRule::FindFile {
                dir: arg("dir", Some("."))?,
                pattern: arg("pattern", None)?,
            }),
            "find_latest_file" => Ok(PostExecRule::FindLatestFile {
                dir: arg("dir", Some("."))?,
                pattern: arg("pattern", None)?,
            }),
            "find_onnx_file" => Ok(PostExecRule::FindLatestFile {
                dir: arg("dir", Some("."))?,
                pattern: arg("pattern", Some(ONNX_PATTERN))?,
            }),
            "find_dir" => Ok(PostExecRule::FindDir {
                dir: arg("dir", Some("."))?,
                pattern: arg("pattern", None)?,
            }),
            "find_onnx_dir" => Ok(PostExecRule::FindDir {
                dir: arg("dir", Some("."))?,
                pattern: arg("pattern", Some(ONNX_PATTERN))?,
            }),
            "file_exists" | "check_file_exists" => Ok(PostExecRule::FileExists {
                path: arg("path", None)?,
            }),
            _ => Err(PostExecError::UnknownFunction(call[1].to_string())),
        }
    }

    /// Render placeholders in every argument
    pub fn render(
        &self,
        engine: &TemplateEngine,
        data: &serde_json::Value,
    ) -> Result<Self, PostExecError> {
        let r = |s: &str| engine.render_str(s, data);
        Ok(match self {
            PostExecRule::FindFile { dir, pattern } => PostExecRule::FindFile {
                dir: r(dir)?,
                pattern: r(pattern)?,
            },
            PostExecRule::FindLatestFile { dir, pattern } => PostExecRule::FindLatestFile {
                dir: r(dir)?,
                pattern: r(pattern)?,
            },
            PostExecRule::FindDir { dir, pattern } => PostExecRule::FindDir {
                dir: r(dir)?,
                pattern: r(pattern)?,
            },
            PostExecRule::FileExists { path } => PostExecRule::FileExists { path: r(path)? },
        })
    }

    /// Evaluate the rule inside `work_dir`
    pub fn resolve(&self, work_dir: &Path) -> Result<ParamValue, PostExecError> {
        match self {
            PostExecRule::FindFile { dir, pattern } => {
                let base = base_dir(work_dir, dir);
                let found = files_only(glob(&base, pattern)?)
                    .into_iter()
                    .next()
                    .ok_or_else(|| not_found(&base, pattern))?;
                Ok(path_value(&found))
            }
            PostExecRule::FindLatestFile { dir, pattern } => {
                let base = base_dir(work_dir, dir);
                let found = newest(files_only(glob(&base, pattern)?))
                    .ok_or_else(|| not_found(&base, pattern))?;
                Ok(path_value(&found))
            }
            PostExecRule::FindDir { dir, pattern } => {
                let base = base_dir(work_dir, dir);
                let found = newest(glob(&base, pattern)?).ok_or_else(|| not_found(&base, pattern))?;
                let parent = found.parent().unwrap_or(&base);
                Ok(path_value(parent))
            }
            PostExecRule::FileExists { path } => Ok(ParamValue::Bool(work_dir.join(path).exists())),
        }
    }
}

/// Parse, render and evaluate every rule of a tool
pub fn resolve_outputs<'a>(
    rules: impl IntoIterator<Item = (&'a String, &'a String)>,
    engine: &TemplateEngine,
    data: &serde_json::Value,
    work_dir: &Path,
) -> Result<Vec<(String, ParamValue)>, PostExecError> {
    let mut outputs = Vec::new();
    for (name, rule) in rules {
        let value = PostExecRule::parse(rule)?
            .render(engine, data)?
            .resolve(work_dir)?;
        outputs.push((name.clone(), value));
    }
    Ok(outputs)
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Paths under `base` matching a glob pattern, sorted
///
/// `*`, `?` and `[...]` stay within one path segment, `**` spans any number
/// of segments. A pattern without wildcards matches the literal path.
/// Symlinked directories are not descended into.
pub fn glob(base: &Path, pattern: &str) -> std::io::Result<Vec<PathBuf>> {
    let pattern = pattern.trim_start_matches("./");
    if !pattern.contains(['*', '?', '[']) {
        let path = base.join(pattern);
        return Ok(if path.exists() { vec![path] } else { Vec::new() });
    }

    let matcher = Pattern::new(pattern).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid pattern '{}': {}", pattern, e),
        )
    })?;

    let mut walker = WalkDir::new(base).min_depth(1);
    if !pattern.contains("**") {
        walker = walker.max_depth(pattern.split('/').filter(|s| !s.is_empty()).count());
    }

    let mut found: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", base.display(), e);
                None
            }
        })
        .filter(|entry| {
            entry
                .path()
                .strip_prefix(base)
                .is_ok_and(|relative| matcher.matches_path_with(relative, MATCH_OPTIONS))
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
    found.sort();
    Ok(found)
}

fn base_dir(work_dir: &Path, dir: &str) -> PathBuf {
    if dir.is_empty() || dir == "." {
        work_dir.to_path_buf()
    } else {
        work_dir.join(dir)
    }
}

fn files_only(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.into_iter().filter(|p| p.is_file()).collect()
}

fn newest(paths: Vec<PathBuf>) -> Option<PathBuf> {
    paths.into_iter().max_by_key(|p| {
        let modified = std::fs::metadata(p)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        (modified, p.clone())
    })
}

fn not_found(dir: &Path, pattern: &str) -> PostExecError {
    PostExecError::NotFound {
        dir: dir.display().to_string(),
        pattern: pattern.to_string(),
    }
}

fn path_value(path: &Path) -> ParamValue {
    ParamValue::String(path.display().to_string())
}
