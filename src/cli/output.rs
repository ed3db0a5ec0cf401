//! CLI output formatting

use crate::core::RunStatus;
use crate::execution::RunEvent;
use crate::persistence::RunSummary;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar over the run's job instances
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
        RunStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

/// Format a run summary as a single history line
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Completed => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
        RunStatus::Cancelled => WARN,
        RunStatus::Pending => INFO,
    };

    format!(
        "{} {} - {} - {} on {} - {} ({}/{})",
        status_icon,
        style(&summary.run_id.to_string()[..8]).dim(),
        style(&summary.workflow_name).bold(),
        summary.event,
        style(&summary.ref_name).cyan(),
        format_status(summary.status),
        summary.completed_jobs,
        summary.total_jobs,
    )
}

/// Format a run event for display
pub fn format_run_event(event: &RunEvent) -> String {
    match event {
        RunEvent::RunStarted {
            run_id,
            workflow_name,
            total_jobs,
        } => format!(
            "{} Starting {} ({}) - {} job(s)",
            ROCKET,
            style(workflow_name).bold(),
            style(&run_id.to_string()[..8]).dim(),
            style(total_jobs).cyan(),
        ),
        RunEvent::JobStarted { job } => {
            format!("{} {}", SPINNER, style(job).cyan())
        }
        RunEvent::StepStarted { job, step, attempt } => {
            if *attempt > 1 {
                format!(
                    "{} [{}] {} (attempt {})",
                    SPINNER,
                    style(job).dim(),
                    step,
                    style(attempt).yellow()
                )
            } else {
                format!("{} [{}] {}", SPINNER, style(job).dim(), step)
            }
        }
        RunEvent::StepRetrying {
            job,
            step,
            attempt,
            max_attempts,
        } => format!(
            "{} [{}] {} failed, retrying ({}/{})",
            WARN,
            style(job).dim(),
            style(step).yellow(),
            attempt,
            max_attempts
        ),
        RunEvent::StepCompleted { job, step, attempts } => {
            if *attempts > 1 {
                format!(
                    "{} [{}] {} (after {} attempts)",
                    CHECK,
                    style(job).dim(),
                    style(step).green(),
                    attempts
                )
            } else {
                format!("{} [{}] {}", CHECK, style(job).dim(), style(step).green())
            }
        }
        RunEvent::StepSoftFailed { job, step, error } => format!(
            "{} [{}] {} failed (continue_on_error): {}",
            WARN,
            style(job).dim(),
            style(step).yellow(),
            style(error).dim()
        ),
        RunEvent::StepFailed { job, step, error } => format!(
            "{} [{}] {}: {}",
            CROSS,
            style(job).dim(),
            style(step).red(),
            style(error).dim()
        ),
        RunEvent::JobCompleted { job } => {
            format!("{} {}", CHECK, style(job).green())
        }
        RunEvent::JobFailed { job, error } => {
            format!("{} {}: {}", CROSS, style(job).red(), style(error).dim())
        }
        RunEvent::JobTimedOut { job, limit_secs } => format!(
            "{} {} timed out after {}",
            CROSS,
            style(job).red(),
            style(format_duration(Duration::from_secs(*limit_secs))).dim()
        ),
        RunEvent::JobCancelled { job } => {
            format!("{} {} cancelled", WARN, style(job).yellow())
        }
        RunEvent::RunCompleted { run_id } => format!(
            "{} Run ({}) {}",
            INFO,
            style(&run_id.to_string()[..8]).dim(),
            style("completed").green()
        ),
        RunEvent::RunFailed {
            run_id,
            failed_jobs,
        } => format!(
            "{} Run ({}) {} - {} job(s) failed",
            INFO,
            style(&run_id.to_string()[..8]).dim(),
            style("failed").red(),
            failed_jobs
        ),
        RunEvent::RunCancelled { run_id } => format!(
            "{} Run ({}) {}",
            INFO,
            style(&run_id.to_string()[..8]).dim(),
            style("cancelled").yellow()
        ),
    }
}

/// Format a duration like `1m 30s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
