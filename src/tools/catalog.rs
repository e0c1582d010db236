//! Tool registry built once at start-up
//!
//! Holds every available tool by name. Per-tool policy overrides (approval
//! flag, timeout, disabled tools) can be loaded from a YAML catalog file.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::error::{AgentflowError, Result};
use crate::llm::ToolDefinition;

use super::definition::Tool;

/// YAML override for one tool
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolSettings {
    #[serde(default)]
    pub requires_approval: Option<bool>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub disabled: bool,
}

/// YAML catalog file structure
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tools: BTreeMap<String, ToolSettings>,
}

/// Registry of tools, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; names must be unique
    pub fn register(&mut self, tool: Tool) -> Result<()> {
        if self.tools.contains_key(&tool.name) {
            return Err(AgentflowError::Tool(format!("tool '{}' already registered", tool.name)));
        }
        log::debug!("registered tool {}", tool.name);
        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    /// Builder-style registration
    pub fn with_tool(mut self, tool: Tool) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Get number of tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve an agent's allowlist to tools; unknown names are an error
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Tool>> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .cloned()
                    .ok_or_else(|| AgentflowError::Tool(format!("unknown tool '{}'", name)))
            })
            .collect()
    }

    /// LLM-facing definitions for an allowlist
    pub fn definitions_for(&self, names: &[String]) -> Result<Vec<ToolDefinition>> {
        Ok(self.resolve(names)?.iter().map(Tool::to_llm_definition).collect())
    }

    /// Apply overrides from a YAML catalog string
    pub fn apply_yaml(&mut self, content: &str) -> Result<()> {
        let catalog: CatalogFile = serde_yaml::from_str(content)
            .map_err(|e| AgentflowError::Tool(format!("failed to parse tool catalog: {}", e)))?;

        for (name, settings) in catalog.tools {
            if settings.disabled {
                self.tools.remove(&name);
                log::info!("tool {} disabled by catalog", name);
                continue;
            }
            let tool = self
                .tools
                .get_mut(&name)
                .ok_or_else(|| AgentflowError::Tool(format!("catalog references unknown tool '{}'", name)))?;
            if let Some(flag) = settings.requires_approval {
                tool.requires_approval = flag;
            }
            if let Some(timeout) = settings.timeout_ms {
                tool.timeout_ms = Some(timeout);
            }
        }
        Ok(())
    }

    /// Apply overrides from a YAML catalog file
    pub fn apply_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let content = std::fs::read_to_string(path.as_ref())?;
        self.apply_yaml(&content)
    }
}
