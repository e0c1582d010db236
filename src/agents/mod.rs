//! Agent directory and the per-agent execution claim
//!
//! The directory answers "who is this agent" (model parameters, prompt, tool
//! allowlist, memory). The claim guarantees at most one session per agent.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentflowError, Result};
use crate::safety::SafetyLimits;

/// Configured agent persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_archetype")]
    pub archetype: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    pub system_prompt: String,
    /// Tool allowlist by name
    #[serde(default)]
    pub tools: Vec<String>,
    /// Persisted key/value memory injected into the system prompt
    #[serde(default)]
    pub memory: BTreeMap<String, String>,
    /// Per-agent override of the global safety limits
    #[serde(default)]
    pub limits: Option<SafetyLimits>,
}

fn default_archetype() -> String {
    "assistant".to_string()
}

impl AgentProfile {
    pub fn new(id: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            archetype: default_archetype(),
            model: None,
            max_tokens: None,
            temperature: None,
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            memory: BTreeMap::new(),
            limits: None,
        }
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_limits(mut self, limits: SafetyLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn with_memory(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.memory.insert(key.into(), value.into());
        self
    }
}

/// Agent lookup collaborator
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentProfile>>;
}

#[derive(Debug, Default, Deserialize)]
struct AgentsFile {
    #[serde(default)]
    agents: Vec<AgentProfile>,
}

/// Agents held in memory, typically loaded from a YAML file
#[derive(Debug, Default)]
pub struct InMemoryAgentDirectory {
    agents: HashMap<String, AgentProfile>,
}

impl InMemoryAgentDirectory {
    pub fn new(agents: impl IntoIterator<Item = AgentProfile>) -> Self {
        Self {
            agents: agents.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: AgentsFile = serde_yaml::from_str(content)
            .map_err(|e| AgentflowError::InvalidWorkflow(format!("failed to parse agents file: {}", e)))?;
        Ok(Self::new(file.agents))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[async_trait]
impl AgentDirectory for InMemoryAgentDirectory {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentProfile>> {
        Ok(self.agents.get(agent_id).cloned())
    }
}

/// Atomic idle -> working transition per agent
#[async_trait]
pub trait AgentClaims: Send + Sync {
    /// Returns false if another holder owns the agent. Re-claiming by the
    /// current holder succeeds.
    async fn try_claim(&self, agent_id: &str, holder: &str) -> Result<bool>;

    /// Release the claim if `holder` owns it
    async fn release(&self, agent_id: &str, holder: &str) -> Result<()>;
}

/// Process-local claims
#[derive(Debug, Default)]
pub struct InMemoryAgentClaims {
    holders: Mutex<HashMap<String, String>>,
}

impl InMemoryAgentClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self, agent_id: &str) -> Option<String> {
        self.holders.lock().ok().and_then(|h| h.get(agent_id).cloned())
    }
}

#[async_trait]
impl AgentClaims for InMemoryAgentClaims {
    async fn try_claim(&self, agent_id: &str, holder: &str) -> Result<bool> {
        let mut holders = self
            .holders
            .lock()
            .map_err(|e| AgentflowError::Storage(format!("claims lock poisoned: {}", e)))?;
        match holders.get(agent_id) {
            Some(current) => Ok(current == holder),
            None => {
                holders.insert(agent_id.to_string(), holder.to_string());
                Ok(true)
            }
        }
    }

    async fn release(&self, agent_id: &str, holder: &str) -> Result<()> {
        let mut holders = self
            .holders
            .lock()
            .map_err(|e| AgentflowError::Storage(format!("claims lock poisoned: {}", e)))?;
        if holders.get(agent_id).is_some_and(|h| h == holder) {
            holders.remove(agent_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_lookup() {
        let dir = InMemoryAgentDirectory::new(vec![AgentProfile::new("triage", "You triage tickets")]);
        assert!(dir.get_agent("triage").await.unwrap().is_some());
        assert!(dir.get_agent("ghost").await.unwrap().is_none());
    }

    #[test]
    fn test_agents_yaml() {
        let dir = InMemoryAgentDirectory::from_yaml(
            r#"
agents:
  - id: researcher
    system_prompt: "You research {{topic}}"
    model: claude-3-haiku-20240307
    tools: [http_request, current_time]
    memory:
      region: eu
    limits:
      max-actions-per-session: 5
"#,
        )
        .unwrap();
        assert_eq!(dir.len(), 1);
        let agent = dir.agents.get("researcher").unwrap();
        assert_eq!(agent.archetype, "assistant");
        assert_eq!(agent.tools.len(), 2);
        assert_eq!(agent.memory["region"], "eu");
        assert_eq!(agent.limits.as_ref().unwrap().max_actions_per_session, 5);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let claims = InMemoryAgentClaims::new();
        assert!(claims.try_claim("agent", "run-1").await.unwrap());
        assert!(!claims.try_claim("agent", "run-2").await.unwrap());
        assert!(claims.try_claim("agent", "run-1").await.unwrap());

        claims.release("agent", "run-2").await.unwrap();
        assert_eq!(claims.holder("agent").as_deref(), Some("run-1"));

        claims.release("agent", "run-1").await.unwrap();
        assert!(claims.try_claim("agent", "run-2").await.unwrap());
    }
}
