//! agentflow - safety-governed agent loops and resumable workflows
//!
//! Agents run a bounded tool-calling loop under a safety governor, with every
//! tool call passing an approval gate. Workflows compose agents with
//! condition, approval, delay and output nodes into a DAG that can pause on a
//! human decision or a timer and resume later without recomputing finished
//! nodes.

pub mod agents;
pub mod approval;
pub mod audit;
pub mod config;
pub mod domain;
pub mod error;
pub mod id;
pub mod llm;
pub mod manager;
pub mod prompt;
pub mod queue;
pub mod runner;
pub mod safety;
pub mod store;
pub mod tools;
pub mod workflow;

pub use error::{AgentflowError, Result};
