use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod cli;

use agentflow::config::{self, GlobalConfig};
use agentflow::domain::{NodeStatus, RunStatus, WorkflowDefinition, WorkflowRun};
use agentflow::id::now_ms;
use agentflow::manager::{ApprovalDecisionInput, RunManager};
use cli::Cli;
use cli::commands::Commands;
use cli::engine;

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentflow")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("agentflow.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &GlobalConfig) -> Result<()> {
    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let store = engine::open_store(config)?;
    let manager = || engine::build_manager(config, store.clone(), cli.agents.as_deref(), cli.tools.as_deref());

    match &cli.command {
        Commands::Run { workflow, vars } => handle_run_command(&manager()?, workflow, vars).await,
        Commands::Worker { once } => handle_worker_command(&manager()?, *once, config).await,
        Commands::Approve { id, by, message } => {
            let decision = ApprovalDecisionInput {
                approved: true,
                decided_by: by.clone(),
                comment: message.clone(),
            };
            handle_decision_command(&manager()?, id, decision).await
        }
        Commands::Reject { id, by, reason } => {
            let decision = ApprovalDecisionInput {
                approved: false,
                decided_by: by.clone(),
                comment: reason.clone(),
            };
            handle_decision_command(&manager()?, id, decision).await
        }
        Commands::Status { id, detailed } => {
            let run = store
                .get_run(id)
                .context("Failed to load run")?
                .ok_or_else(|| eyre::eyre!("Run not found: {}", id))?;
            print_run(&run, *detailed);
            Ok(())
        }
        Commands::List { status } => handle_list_command(&store, status.as_deref()),
    }
}

async fn handle_run_command(manager: &RunManager, workflow: &Path, vars: &[(String, String)]) -> Result<()> {
    info!("Starting workflow from {}", workflow.display());
    let definition = WorkflowDefinition::from_file(workflow)
        .with_context(|| format!("Failed to load workflow {}", workflow.display()))?;

    let run = manager
        .start_run(definition, engine::vars_map(vars))
        .await
        .context("Failed to start run")?;
    print_run(&run, false);

    if run.status == RunStatus::Paused {
        println!(
            "{} run `agentflow worker` to continue, or approve/reject {}",
            "Paused:".yellow(),
            run.id
        );
    }
    Ok(())
}

async fn handle_worker_command(manager: &RunManager, once: bool, config: &GlobalConfig) -> Result<()> {
    let poll = Duration::from_millis(config.worker.poll_interval_ms);
    info!("Worker started (once: {}, poll: {:?})", once, poll);

    loop {
        let processed = manager.process_due_jobs(now_ms()).await.context("Failed to process jobs")?;
        for run in &processed {
            println!("{} {} -> {}", "Processed:".green(), run.id, status_label(run.status));
        }
        if once {
            if processed.is_empty() {
                println!("{}", "No jobs due".dimmed());
            }
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Worker interrupted");
                println!("{}", "Worker stopped".yellow());
                return Ok(());
            }
        }
    }
}

async fn handle_decision_command(manager: &RunManager, id: &str, decision: ApprovalDecisionInput) -> Result<()> {
    let approved = decision.approved;
    let job = manager
        .resolve_approval(id, decision)
        .await
        .with_context(|| format!("Failed to record decision for {}", id))?;

    if approved {
        println!("{} {} (job {})", "Approved:".green(), id, job.id);
    } else {
        println!("{} {} (job {})", "Rejected:".red(), id, job.id);
    }
    println!("  The worker will resume the run on its next poll");
    Ok(())
}

fn handle_list_command(store: &agentflow::store::FlowStore, status: Option<&str>) -> Result<()> {
    let runs = match status {
        Some(s) => {
            let status = RunStatus::parse(s).ok_or_else(|| eyre::eyre!("Unknown status: {}", s))?;
            store.list_runs_by_status(status)?
        }
        None => store.list_runs()?,
    };

    if runs.is_empty() {
        println!("{}", "No runs found".dimmed());
        return Ok(());
    }
    for run in runs {
        println!(
            "{:<28} {:<20} {:<10} {}/{} nodes",
            run.id,
            run.workflow_id,
            status_label(run.status),
            run.completed_node_count(),
            run.definition.nodes.len()
        );
    }
    Ok(())
}

fn status_label(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::Running => status.as_str().cyan(),
        RunStatus::Paused => status.as_str().yellow(),
        RunStatus::Completed => status.as_str().green(),
        RunStatus::Failed => status.as_str().red(),
    }
}

fn print_run(run: &WorkflowRun, detailed: bool) {
    println!("{} {} ({})", "Run:".bold(), run.id, run.workflow_id);
    println!("  Status: {}", status_label(run.status));
    if let (Some(node), Some(suspension)) = (&run.paused_at_node_id, &run.suspension) {
        println!("  Paused at: {} ({})", node, suspension.reason());
    }
    if let Some(error) = &run.error {
        println!("  Error: {}", error.to_string().red());
    }
    if run.attempts > 0 {
        println!("  Retries: {}", run.attempts);
    }

    for (id, output) in &run.outputs {
        let status = match output.status {
            NodeStatus::Completed => "completed".green(),
            NodeStatus::Failed => "failed".red(),
            NodeStatus::Skipped => "skipped".dimmed(),
        };
        println!("  - {:<20} {:<10} {}", id, output.node_type.as_str(), status);
        if detailed {
            println!("      {}", output.data);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
