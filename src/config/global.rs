//! Global configuration.
//!
//! Loaded from ~/.config/agentflow/agentflow.yml or .agentflow.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::llm::AnthropicConfig;
use crate::queue::RetryPolicy;
use crate::runner::AgentLoopConfig;
use crate::safety::SafetyLimits;

/// Global configuration for agentflow.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// LLM provider settings.
    pub llm: LlmConfig,

    /// Default per-session safety limits; agents may override them.
    pub safety: SafetyLimits,

    /// Storage settings.
    pub storage: StorageConfig,

    /// Continuation worker settings.
    pub worker: WorkerConfig,

    /// Output node delivery settings.
    pub output: OutputConfig,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .agentflow.yml in current directory
    /// 3. ~/.config/agentflow/agentflow.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".agentflow.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .agentflow.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .agentflow.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentflow").join("agentflow.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config file")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.llm.max_tokens == 0 {
            eyre::bail!("llm.max-tokens must be > 0");
        }
        if self.llm.timeout_ms == 0 {
            eyre::bail!("llm.timeout-ms must be > 0");
        }
        if self.safety.max_actions_per_session == 0 {
            eyre::bail!("safety.max-actions-per-session must be > 0");
        }
        if self.safety.max_tokens_per_session == 0 {
            eyre::bail!("safety.max-tokens-per-session must be > 0");
        }
        if self.safety.max_duration_ms == 0 {
            eyre::bail!("safety.max-duration-ms must be > 0");
        }
        if self.safety.max_consecutive_errors == 0 {
            eyre::bail!("safety.max-consecutive-errors must be > 0");
        }
        if self.worker.poll_interval_ms == 0 {
            eyre::bail!("worker.poll-interval-ms must be > 0");
        }
        if self.worker.retry.max_attempts == 0 {
            eyre::bail!("worker.max-attempts must be > 0");
        }
        Ok(())
    }

    /// Anthropic client settings derived from the llm section
    pub fn anthropic(&self) -> AnthropicConfig {
        AnthropicConfig {
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            timeout: Duration::from_millis(self.llm.timeout_ms),
            ..AnthropicConfig::default()
        }
    }

    pub fn agent_loop(&self) -> AgentLoopConfig {
        AgentLoopConfig {
            max_tokens: self.llm.max_tokens,
            model_timeout: Duration::from_millis(self.llm.timeout_ms),
        }
    }

    /// Directory holding the run store, relative paths resolved against the project
    pub fn data_dir(&self, project_dir: &Path) -> Option<PathBuf> {
        self.storage.data_dir.as_ref().map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                project_dir.join(dir)
            }
        })
    }
}

/// LLM provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,

    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Timeout per LLM call in milliseconds.
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Environment variable holding the API key.
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: crate::config::DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            timeout_ms: 120_000,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
        }
    }
}

/// Storage settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Store directory; defaults to ~/.agentflow/<project-hash>
    #[serde(rename = "data-dir")]
    pub data_dir: Option<PathBuf>,
}

/// Continuation worker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// Provider retry backoff
    #[serde(flatten)]
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Output node delivery settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    #[serde(rename = "webhook-timeout-ms")]
    pub webhook_timeout_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            webhook_timeout_ms: 10_000,
        }
    }
}
