//! Node handler registry - capability table from node type to handler

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{NodeExecution, NodeOutput, NodeType, ResumeSignal, Suspension, WorkflowNode, WorkflowRunContext};
use crate::error::{AgentflowError, Result};

/// Everything a handler sees when its node runs
#[derive(Debug, Clone, Copy)]
pub struct NodeInput<'a> {
    pub node: &'a WorkflowNode,
    /// Outputs of the node's direct predecessors
    pub upstream: &'a BTreeMap<String, NodeOutput>,
    pub context: &'a WorkflowRunContext,
    /// Set only when this node is the one a paused run resumes at
    pub resume: Option<&'a ResumeSignal>,
    /// The suspension this node returned before the pause
    pub suspension: Option<&'a Suspension>,
}

impl<'a> NodeInput<'a> {
    pub fn new(node: &'a WorkflowNode, upstream: &'a BTreeMap<String, NodeOutput>, context: &'a WorkflowRunContext) -> Self {
        Self {
            node,
            upstream,
            context,
            resume: None,
            suspension: None,
        }
    }

    pub fn resuming(mut self, signal: &'a ResumeSignal, suspension: Option<&'a Suspension>) -> Self {
        self.resume = Some(signal);
        self.suspension = suspension;
        self
    }

    /// Error for a node routed to a handler of another type
    pub fn config_mismatch(&self, expected: NodeType) -> AgentflowError {
        AgentflowError::InvalidWorkflow(format!(
            "node {} is {} but was dispatched to the {} handler",
            self.node.id,
            self.node.node_type(),
            expected
        ))
    }
}

/// Execution strategy for one node type
#[async_trait]
pub trait NodeHandler: Send + Sync {
    fn node_type(&self) -> NodeType;

    async fn execute(&self, input: NodeInput<'_>) -> Result<NodeExecution>;
}

/// Handlers keyed by node type, built once at start-up
#[derive(Default, Clone)]
pub struct NodeHandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl NodeHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same type
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        let node_type = handler.node_type();
        if self.handlers.insert(node_type, handler).is_some() {
            log::debug!("replaced handler for {} nodes", node_type);
        }
    }

    pub fn with_handler(mut self, handler: impl NodeHandler + 'static) -> Self {
        self.register(Arc::new(handler));
        self
    }

    pub fn get(&self, node_type: NodeType) -> Result<&Arc<dyn NodeHandler>> {
        self.handlers
            .get(&node_type)
            .ok_or_else(|| AgentflowError::NoHandler(node_type.to_string()))
    }

    pub fn contains(&self, node_type: NodeType) -> bool {
        self.handlers.contains_key(&node_type)
    }

    /// Registered types, sorted
    pub fn node_types(&self) -> Vec<NodeType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }

    /// Dispatch to the handler for the node's type
    pub async fn execute(&self, input: NodeInput<'_>) -> Result<NodeExecution> {
        let handler = self.get(input.node.node_type())?;
        handler.execute(input).await
    }
}
