//! Wires configuration, storage and handlers into a RunManager.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};

use agentflow::agents::{AgentDirectory, InMemoryAgentDirectory};
use agentflow::approval::ApprovalGate;
use agentflow::audit::{AuditFanout, AuditSink, JsonlAuditSink, LogAuditSink};
use agentflow::config::GlobalConfig;
use agentflow::llm::AnthropicClient;
use agentflow::manager::RunManager;
use agentflow::prompt::PromptRenderer;
use agentflow::runner::AgentLoop;
use agentflow::store::FlowStore;
use agentflow::tools::{ToolInvoker, builtin_registry};
use agentflow::workflow::{
    AgentHandler, ApprovalHandler, ConditionHandler, DelayHandler, NodeHandlerRegistry, OutputHandler,
    TriggerHandler, WorkflowExecutor,
};

/// Open the run store for the current project
pub fn open_store(config: &GlobalConfig) -> Result<Arc<FlowStore>> {
    let project_dir = std::env::current_dir().context("Failed to get current directory")?;
    let store = match config.data_dir(&project_dir) {
        Some(dir) => FlowStore::open_at(&dir),
        None => FlowStore::open(&project_dir),
    }
    .context("Failed to open run store")?;
    Ok(Arc::new(store))
}

fn load_agents(path: Option<&Path>) -> Result<InMemoryAgentDirectory> {
    match path {
        Some(path) => InMemoryAgentDirectory::from_file(path)
            .with_context(|| format!("Failed to load agents from {}", path.display())),
        None => Ok(InMemoryAgentDirectory::new(Vec::new())),
    }
}

fn llm_client(config: &GlobalConfig) -> Result<AnthropicClient> {
    let api_key = match std::env::var(&config.llm.api_key_env) {
        Ok(key) => key,
        Err(_) => {
            log::warn!("{} is not set; agent and llm_eval nodes will fail", config.llm.api_key_env);
            String::new()
        }
    };
    AnthropicClient::with_api_key(api_key, config.anthropic()).context("Failed to create LLM client")
}

/// Build the full execution stack
pub fn build_manager(
    config: &GlobalConfig,
    store: Arc<FlowStore>,
    agents_path: Option<&Path>,
    tools_path: Option<&Path>,
) -> Result<RunManager> {
    let agents = load_agents(agents_path)?;
    log::info!("Loaded {} agents", agents.len());
    let directory: Arc<dyn AgentDirectory> = Arc::new(agents);

    let mut tools = builtin_registry(Duration::from_millis(config.output.webhook_timeout_ms))
        .context("Failed to create builtin tools")?;
    if let Some(path) = tools_path {
        tools
            .apply_file(path)
            .with_context(|| format!("Failed to load tool catalog {}", path.display()))?;
    }

    let audit_dir = store.audit_dir();
    let audit: Arc<dyn AuditSink> = Arc::new(
        AuditFanout::new()
            .with_sink(LogAuditSink)
            .with_sink(JsonlAuditSink::new(&audit_dir).context("Failed to open audit log")?),
    );

    let llm = Arc::new(llm_client(config)?);
    let renderer = Arc::new(PromptRenderer::new());
    let gate = Arc::new(ApprovalGate::new(store.clone()));
    let invoker = Arc::new(ToolInvoker::new(gate));
    let agent_loop = Arc::new(AgentLoop::with_config(
        llm.clone(),
        invoker,
        config.safety.clone(),
        config.agent_loop(),
    ));

    let registry = NodeHandlerRegistry::new()
        .with_handler(TriggerHandler)
        .with_handler(
            AgentHandler::new(directory, store.clone(), Arc::new(tools), agent_loop, renderer.clone())
                .with_audit(audit.clone()),
        )
        .with_handler(ConditionHandler::new(llm, renderer.clone()))
        .with_handler(ApprovalHandler)
        .with_handler(DelayHandler)
        .with_handler(
            OutputHandler::new(renderer, Duration::from_millis(config.output.webhook_timeout_ms))
                .context("Failed to create output handler")?,
        );
    let executor = Arc::new(WorkflowExecutor::new(Arc::new(registry)).with_audit(audit.clone()));

    Ok(RunManager::new(
        store.clone(),
        store.clone(),
        store,
        executor,
        audit,
        config.worker.retry.clone(),
    ))
}

pub fn vars_map(vars: &[(String, String)]) -> BTreeMap<String, String> {
    vars.iter().cloned().collect()
}
