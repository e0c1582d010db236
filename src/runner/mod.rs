//! Agent runner module - the safety-governed tool-calling loop.
//!
//! This module provides:
//! - AgentLoop for driving one agent session
//! - AgentContext with the rendered system prompt and task
//! - LoopCheckpoint, the serializable state of a session parked on approval

mod agent_loop;
mod context;

pub use agent_loop::{AgentLoop, AgentLoopConfig, ApprovalResolution, LoopOutcome};
pub use context::{AgentContext, LoopCheckpoint};
