//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: start a workflow run from a YAML definition
//! - worker: process due continuation jobs
//! - approve/reject: decide on a paused approval
//! - status/list: inspect stored runs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// agentflow - safety-bounded agent workflows with approvals and resumable runs
#[derive(Parser, Debug)]
#[command(name = "agentflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Agents file (YAML list of agent profiles)
    #[arg(short, long, global = true)]
    pub agents: Option<PathBuf>,

    /// Tool catalog overrides (YAML)
    #[arg(short, long, global = true)]
    pub tools: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a workflow run
    Run {
        /// Workflow definition file
        workflow: PathBuf,

        /// Run variable as key=value (repeatable)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },

    /// Process due continuation jobs (delays, approvals, retries)
    Worker {
        /// Process the jobs due now and exit
        #[arg(long)]
        once: bool,
    },

    /// Approve a paused run
    Approve {
        /// Run ID
        id: String,

        /// Who made the decision
        #[arg(long)]
        by: Option<String>,

        /// Optional comment recorded with the decision
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Reject a paused run
    Reject {
        /// Run ID
        id: String,

        /// Who made the decision
        #[arg(long)]
        by: Option<String>,

        /// Reason for rejection
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Show a run and its node outputs
    Status {
        /// Run ID
        id: String,

        /// Print node output data
        #[arg(short, long)]
        detailed: bool,
    },

    /// List runs
    List {
        /// Filter by status (running, paused, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
    },
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
