//! CLI command definitions

use clap::Args;

/// Run a workflow for an incoming event
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: String,

    /// Event kind (push or pull_request)
    #[arg(long, default_value = "push")]
    pub event: String,

    /// Git ref the event points at (refs/heads/master or plain master)
    #[arg(long = "ref")]
    pub ref_name: String,

    /// Workflow env overrides (KEY=VALUE)
    #[arg(short = 'e', long = "env", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a workflow configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output the parsed configuration as JSON
    #[arg(long)]
    pub json: bool,
}

/// Show the job instances an event would produce
#[derive(Debug, Args, Clone)]
pub struct JobsCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: String,

    /// Event kind (push or pull_request)
    #[arg(long, default_value = "push")]
    pub event: String,

    /// Git ref the event points at
    #[arg(long = "ref")]
    pub ref_name: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show details for a specific run ID
    #[arg(long)]
    pub run_id: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}
