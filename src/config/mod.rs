//! Configuration for agentflow.
//!
//! A single YAML file with kebab-case keys. Every section has defaults, so an
//! empty or missing file is valid.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::{GlobalConfig, LlmConfig, OutputConfig, StorageConfig, WorkerConfig};

mod global;

/// Default LLM model.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Load configuration from the standard search paths.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. .agentflow.yml in current directory (project config)
/// 3. ~/.config/agentflow/agentflow.yml (user config)
/// 4. Default values
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<GlobalConfig> {
    let config = GlobalConfig::load(explicit_path)?;
    config.validate()?;
    Ok(config)
}
