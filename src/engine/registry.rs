//! Tool registry
//!
//! An explicit, caller-owned set of tools. The orchestrator receives one at
//! construction; nothing is registered globally.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::scenario::Tool;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),
}

/// Whether a tool's executable can be found on `PATH`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolAvailability {
    Available { path: PathBuf },
    Missing { executable: String },
    /// The command starts with a placeholder; checked only at run time
    Templated,
    Unregistered,
}

#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from loaded tools, rejecting duplicate names
    pub fn from_tools(tools: impl IntoIterator<Item = Tool>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, tool: Tool) -> Result<(), RegistryError> {
        if self.tools.contains_key(&tool.name) {
            return Err(RegistryError::DuplicateTool(tool.name));
        }
        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn availability(&self, name: &str) -> ToolAvailability {
        let Some(tool) = self.get(name) else {
            return ToolAvailability::Unregistered;
        };
        let Some(executable) = tool.executable() else {
            return ToolAvailability::Templated;
        };
        match which::which(executable) {
            Ok(path) => ToolAvailability::Available { path },
            Err(_) => ToolAvailability::Missing {
                executable: executable.to_string(),
            },
        }
    }
}
