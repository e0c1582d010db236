//! CLI module for agentflow - command-line interface and subcommands.
//!
//! Provides the entry point for starting runs, running the continuation
//! worker, deciding approvals and inspecting stored runs.

pub mod commands;
pub mod engine;

pub use commands::Cli;
