use anyhow::{Context, Result};
use conveyor::cli::commands::{HistoryCommand, JobsCommand, RunCommand, ValidateCommand};
use conveyor::cli::output::*;
use conveyor::cli::{Cli, Command};
use conveyor::core::config::WorkflowConfig;
use conveyor::core::{EventKind, TriggerEvent, Workflow};
use conveyor::execution::{RunCoordinator, RunEngine, RunEvent};
use conveyor::persistence::{
    create_summary, InMemoryPersistence, PersistenceBackend, RunStatus, SqliteRunStore,
};
use conveyor::shell::ShellRunner;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd).await?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::Jobs(cmd) => show_jobs(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

fn load_workflow(file: &str) -> Result<Workflow> {
    let config = WorkflowConfig::from_file(file).context("Failed to load workflow config")?;
    config.to_workflow()
}

fn build_event(kind: &str, ref_name: &str) -> Result<TriggerEvent> {
    let kind: EventKind = kind.parse()?;
    Ok(TriggerEvent::new(kind, ref_name))
}

async fn run_workflow(cmd: &RunCommand) -> Result<()> {
    let mut workflow = load_workflow(&cmd.file)?;

    println!("{} Loaded workflow: {}", INFO, style(&workflow.name).bold());

    // Apply env overrides
    for (key, value) in &cmd.env {
        workflow.env.insert(key.clone(), value.clone());
        println!(
            "{} Env override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let event = build_event(&cmd.event, &cmd.ref_name)?;

    // Set up persistence
    let store: Arc<dyn PersistenceBackend> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        Arc::new(SqliteRunStore::with_default_path().await?)
    };

    // Engine over the real shell, with console rendering on the event stream
    let engine = RunEngine::new(ShellRunner::default());
    let progress = create_progress_bar(workflow.instance_count());
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        bar.println(format_run_event(&event));
        if matches!(
            event,
            RunEvent::JobCompleted { .. }
                | RunEvent::JobFailed { .. }
                | RunEvent::JobTimedOut { .. }
                | RunEvent::JobCancelled { .. }
        ) {
            bar.inc(1);
        }
    });

    let coordinator = RunCoordinator::new(engine);

    println!();
    let Some(handle) = coordinator.submit(&workflow, &event).await? else {
        progress.finish_and_clear();
        println!(
            "{} Event {} on {} does not trigger {}",
            INFO,
            style(&cmd.event).cyan(),
            style(&cmd.ref_name).cyan(),
            style(&workflow.name).bold()
        );
        return Ok(());
    };

    let run = handle.wait().await?;
    progress.finish_and_clear();

    // Save to history
    if !cmd.no_history {
        let summary = create_summary(&run);
        store.save_run(&summary).await?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&summary.run_id.to_string()[..8]).dim()
        );
    }

    // Print final status
    match run.state.status {
        RunStatus::Failed => {
            println!(
                "\n{} {} {} ({}/{} jobs failed)",
                CROSS,
                style(&run.workflow_name).bold(),
                style("failed").red(),
                run.state.failed_jobs,
                run.state.total_jobs
            );
            std::process::exit(1);
        }
        RunStatus::Cancelled => {
            println!(
                "\n{} {} {}",
                WARN,
                style(&run.workflow_name).bold(),
                style("cancelled").yellow()
            );
            std::process::exit(1);
        }
        _ => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&run.workflow_name).bold(),
                style("successfully").green()
            );
        }
    }

    Ok(())
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating workflow...", INFO);

    let result = WorkflowConfig::from_file(&cmd.file);

    match result {
        Ok(config) => {
            let workflow = config.to_workflow()?;
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&workflow.name).bold());
            let events: Vec<String> = workflow
                .triggers
                .configured_events()
                .iter()
                .map(|e| e.to_string())
                .collect();
            println!("  Triggers: {}", style(events.join(", ")).cyan());
            println!("  Jobs: {}", style(workflow.jobs.len()).cyan());
            println!(
                "  Job instances per run: {}",
                style(workflow.instance_count()).cyan()
            );
            if let Some(concurrency) = &workflow.concurrency {
                println!(
                    "  Concurrency group: {} (cancel_in_progress: {})",
                    style(&concurrency.group).cyan(),
                    concurrency.cancel_in_progress
                );
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

fn show_jobs(cmd: &JobsCommand) -> Result<()> {
    let workflow = load_workflow(&cmd.file)?;
    let event = build_event(&cmd.event, &cmd.ref_name)?;

    let Some(run) = workflow.plan(&event) else {
        println!(
            "{} Event {} on {} does not trigger {}",
            INFO,
            style(&cmd.event).cyan(),
            style(&cmd.ref_name).cyan(),
            style(&workflow.name).bold()
        );
        return Ok(());
    };

    if cmd.json {
        let jobs: Vec<serde_json::Value> = run
            .jobs
            .iter()
            .map(|job| {
                serde_json::json!({
                    "job_id": job.job_id,
                    "name": job.name,
                    "matrix": job.combination,
                    "env": job.env,
                    "timeout_secs": job.timeout.as_secs(),
                    "steps": job.steps.iter().map(|s| &s.name).collect::<Vec<_>>(),
                })
            })
            .collect();
        let data = serde_json::json!({
            "workflow": run.workflow_name,
            "group": run.group,
            "jobs": jobs,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!(
        "{} {} expands to {} job instance(s) for {} on {}:",
        INFO,
        style(&run.workflow_name).bold(),
        style(run.jobs.len()).cyan(),
        cmd.event,
        style(&cmd.ref_name).cyan()
    );
    if let Some(group) = &run.group {
        println!("  Concurrency group: {}", style(group).cyan());
    }

    for job in &run.jobs {
        println!("\n  {}", style(&job.name).bold());
        println!(
            "    timeout: {}",
            style(format_duration(job.timeout)).dim()
        );
        for (key, value) in &job.env {
            println!("    env: {}={}", style(key).cyan(), value);
        }
        for step in &job.steps {
            let mut notes = Vec::new();
            if step.max_attempts > 1 {
                notes.push(format!("max_attempts: {}", step.max_attempts));
            }
            if step.continue_on_error {
                notes.push("continue_on_error".to_string());
            }
            if notes.is_empty() {
                println!("    step: {}", step.name);
            } else {
                println!("    step: {} ({})", step.name, style(notes.join(", ")).dim());
            }
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = SqliteRunStore::with_default_path().await?;

    // Details for one run
    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.json)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let runs = store.list_runs(cmd.workflow.as_deref(), cmd.limit).await?;

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

fn print_run_details(summary: &conveyor::persistence::RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    println!(
        "  Event: {} on {}",
        summary.event,
        style(&summary.ref_name).cyan()
    );
    if let Some(group) = &summary.group {
        println!("  Group: {}", style(group).cyan());
    }
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Jobs: {}/{} completed, {} failed",
        summary.completed_jobs, summary.total_jobs, summary.failed_jobs
    );

    Ok(())
}
