//! Step dependency graph
//!
//! Combines each step's explicit `depends_on` list with the steps its
//! parameter templates reference, then groups the steps into execution
//! levels. Every step of a level depends only on steps of earlier levels.

use std::collections::{HashMap, HashSet};

use crate::scenario::{referenced_steps, Step};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("Step '{step}' depends on non-existent step '{dependency}'")]
    UndeclaredDependency { step: String, dependency: String },

    #[error("Circular dependency detected among steps: {steps:?}")]
    CircularDependency { steps: Vec<String> },

    #[error("Duplicate step name: {0}")]
    DuplicateStep(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DependencyNode {
    pub name: String,
    pub tool: String,
    pub description: Option<String>,
    /// Explicit dependencies first, then template references, without repeats
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    index: HashMap<String, usize>,
    edges: Vec<(String, String)>,
    execution_order: Vec<Vec<String>>,
}

impl DependencyGraph {
    pub fn build(steps: &[Step]) -> Result<Self, GraphError> {
        let mut index = HashMap::new();
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.name.clone(), i).is_some() {
                return Err(GraphError::DuplicateStep(step.name.clone()));
            }
        }

        let mut nodes = Vec::with_capacity(steps.len());
        let mut edges = Vec::new();

        for step in steps {
            let mut dependencies: Vec<String> = Vec::new();
            let implicit = referenced_steps(&step.params_value());
            for dep in step.depends_on.iter().chain(implicit.iter()) {
                if !dependencies.contains(dep) {
                    dependencies.push(dep.clone());
                }
            }

            for dep in &dependencies {
                if !index.contains_key(dep) {
                    return Err(GraphError::UndeclaredDependency {
                        step: step.name.clone(),
                        dependency: dep.clone(),
                    });
                }
                edges.push((dep.clone(), step.name.clone()));
            }

            nodes.push(DependencyNode {
                name: step.name.clone(),
                tool: step.tool.clone(),
                description: step.description.clone(),
                dependencies,
            });
        }

        let execution_order = level(&nodes)?;

        Ok(Self {
            nodes,
            index,
            edges,
            execution_order,
        })
    }

    /// Nodes in step-list order
    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&DependencyNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// (dependency, dependent) pairs
    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    pub fn execution_order(&self) -> &[Vec<String>] {
        &self.execution_order
    }

    /// Index of the level containing `name`
    pub fn level_of(&self, name: &str) -> Option<usize> {
        self.execution_order
            .iter()
            .position(|level| level.iter().any(|s| s == name))
    }

    /// Steps that directly depend on `name`
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(from, _)| from == name)
            .map(|(_, to)| to.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Mermaid flowchart with one color per level
    pub fn to_mermaid(&self) -> String {
        const COLORS: [&str; 6] = [
            "#ff9999", "#99ff99", "#9999ff", "#ffff99", "#ff99ff", "#99ffff",
        ];

        let mut lines = vec!["graph TD".to_string()];

        for node in &self.nodes {
            lines.push(format!("    {0}[{0}<br/>({1})]", node.name, node.tool));
        }

        for (from, to) in &self.edges {
            lines.push(format!("    {} --> {}", from, to));
        }

        for (i, level) in self.execution_order.iter().enumerate() {
            lines.push(format!("    classDef level{} fill:{}", i, COLORS[i % COLORS.len()]));
            lines.push(format!("    class {} level{}", level.join(","), i));
        }

        lines.join("\n")
    }

    /// Human-readable execution order and dependency listing
    pub fn text_summary(&self, scenario_name: &str) -> String {
        let mut lines = vec![
            format!("Dependency Analysis for Scenario: {}", scenario_name),
            "=".repeat(50),
            String::new(),
            "Execution Order:".to_string(),
        ];

        for (i, level) in self.execution_order.iter().enumerate() {
            if level.len() == 1 {
                lines.push(format!("  Level {}: {}", i + 1, level[0]));
            } else {
                lines.push(format!("  Level {}: {} (parallel)", i + 1, level.join(", ")));
            }
        }

        lines.push(String::new());
        lines.push("Step Dependencies:".to_string());
        for node in &self.nodes {
            if node.dependencies.is_empty() {
                lines.push(format!("  {} -> no dependencies", node.name));
            } else {
                lines.push(format!(
                    "  {} -> depends on: {}",
                    node.name,
                    node.dependencies.join(", ")
                ));
            }
        }

        lines.join("\n")
    }
}

/// Group nodes into levels, breadth first
///
/// Each round takes every node whose dependencies are all placed, keeping
/// the order of `nodes`. When a round finds nothing ready, all unplaced
/// nodes are reported, including those only blocked by a cycle.
pub fn level(nodes: &[DependencyNode]) -> Result<Vec<Vec<String>>, GraphError> {
    let mut pending: Vec<(&str, HashSet<&str>)> = nodes
        .iter()
        .map(|n| {
            (
                n.name.as_str(),
                n.dependencies.iter().map(String::as_str).collect(),
            )
        })
        .collect();

    let mut levels = Vec::new();

    while !pending.is_empty() {
        let ready: Vec<&str> = pending
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| *name)
            .collect();

        if ready.is_empty() {
            return Err(GraphError::CircularDependency {
                steps: pending.iter().map(|(name, _)| name.to_string()).collect(),
            });
        }

        pending.retain(|(_, deps)| !deps.is_empty());
        for (_, deps) in &mut pending {
            for name in &ready {
                deps.remove(name);
            }
        }

        levels.push(ready.into_iter().map(String::from).collect());
    }

    Ok(levels)
}
