//! Job and step domain models

use crate::core::config::{scalar_to_string, JobConfig, StepConfig, DEFAULT_TIMEOUT_MINUTES};
use crate::core::context::RunContext;
use crate::core::matrix::{Matrix, MatrixCombination};
use crate::core::state::{JobState, StepState};
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// A job definition before matrix expansion
#[derive(Debug, Clone)]
pub struct JobTemplate {
    /// Job id (the key under `jobs:`)
    pub id: String,

    /// Display name template (rendered per instance)
    pub display_name: Option<String>,

    /// Build matrix
    pub matrix: Matrix,

    /// Cap on concurrently running instances of this job
    pub max_parallel: Option<usize>,

    /// Env value templates for this job
    pub env: BTreeMap<String, String>,

    /// Wall-clock limit for each instance
    pub timeout: Duration,

    /// Step templates, in execution order
    pub steps: Vec<StepTemplate>,
}

/// A step definition before rendering
#[derive(Debug, Clone)]
pub struct StepTemplate {
    pub name: String,
    pub script: String,
    pub env: BTreeMap<String, String>,
    pub max_attempts: usize,
    pub continue_on_error: bool,
    pub working_dir: Option<PathBuf>,
}

impl StepTemplate {
    fn from_config(index: usize, config: &StepConfig) -> Result<Self> {
        let env = convert_env(&config.env)?;
        Ok(Self {
            name: config
                .name
                .clone()
                .unwrap_or_else(|| format!("step {}", index + 1)),
            script: config.run.clone(),
            env,
            max_attempts: config.max_attempts,
            continue_on_error: config.continue_on_error,
            working_dir: config.working_dir.clone(),
        })
    }
}

impl JobTemplate {
    /// Create a job template from configuration
    pub fn from_config(id: &str, config: &JobConfig) -> Result<Self> {
        let matrix = match &config.strategy {
            Some(strategy) => {
                let mut axes = Vec::with_capacity(strategy.matrix.len());
                for (axis, values) in &strategy.matrix {
                    let values = values
                        .iter()
                        .map(scalar_to_string)
                        .collect::<Result<Vec<_>>>()?;
                    axes.push((axis.clone(), values));
                }
                Matrix::new(axes)
            }
            None => Matrix::default(),
        };

        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| StepTemplate::from_config(index, step))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: id.to_string(),
            display_name: config.name.clone(),
            matrix,
            max_parallel: config.strategy.as_ref().and_then(|s| s.max_parallel),
            env: convert_env(&config.env)?,
            timeout: Duration::from_secs(
                config.timeout_minutes.unwrap_or(DEFAULT_TIMEOUT_MINUTES) * 60,
            ),
            steps,
        })
    }

    /// Expand the template across its matrix into concrete instances.
    ///
    /// `workflow_env` sits below the job env; step env is overlaid later
    /// at execution time.
    pub fn expand(
        &self,
        base: &RunContext,
        workflow_env: &BTreeMap<String, String>,
    ) -> Vec<JobInstance> {
        self.matrix
            .expand()
            .into_iter()
            .map(|combination| {
                let ctx = base.clone().with_combination(&combination);

                let name = match &self.display_name {
                    Some(template) => ctx.render(template),
                    None if combination.is_empty() => self.id.clone(),
                    None => format!("{} ({})", self.id, combination.label()),
                };

                let mut env = render_env(workflow_env, &ctx);
                env.extend(render_env(&self.env, &ctx));

                let steps = self
                    .steps
                    .iter()
                    .map(|step| Step {
                        name: step.name.clone(),
                        script: ctx.render(&step.script),
                        env: render_env(&step.env, &ctx),
                        max_attempts: step.max_attempts,
                        continue_on_error: step.continue_on_error,
                        working_dir: step.working_dir.clone(),
                        state: StepState::Pending,
                    })
                    .collect();

                JobInstance {
                    job_id: self.id.clone(),
                    name,
                    combination,
                    env,
                    timeout: self.timeout,
                    max_parallel: self.max_parallel,
                    steps,
                    state: JobState::Pending,
                }
            })
            .collect()
    }
}

/// A concrete job produced by matrix expansion
#[derive(Debug, Clone)]
pub struct JobInstance {
    /// Id of the template this instance came from
    pub job_id: String,

    /// Rendered display name, e.g. `linux (python=3.9)`
    pub name: String,

    /// The matrix combination this instance runs
    pub combination: MatrixCombination,

    /// Rendered workflow + job env (steps overlay their own on top)
    pub env: BTreeMap<String, String>,

    /// Wall-clock limit
    pub timeout: Duration,

    /// Shared with sibling instances of the same job
    pub max_parallel: Option<usize>,

    /// Steps, executed sequentially
    pub steps: Vec<Step>,

    /// Runtime state
    pub state: JobState,
}

impl JobInstance {
    /// Effective env for one step: job env overlaid with the step's own
    pub fn step_env(&self, step: &Step) -> Vec<(String, String)> {
        let mut env = self.env.clone();
        env.extend(step.env.clone());
        env.into_iter().collect()
    }
}

/// A rendered step ready to execute
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub script: String,
    pub env: BTreeMap<String, String>,
    pub max_attempts: usize,
    pub continue_on_error: bool,
    pub working_dir: Option<PathBuf>,
    pub state: StepState,
}

fn convert_env(env: &BTreeMap<String, serde_yaml::Value>) -> Result<BTreeMap<String, String>> {
    env.iter()
        .map(|(key, value)| Ok((key.clone(), scalar_to_string(value)?)))
        .collect()
}

fn render_env(env: &BTreeMap<String, String>, ctx: &RunContext) -> BTreeMap<String, String> {
    env.iter()
        .map(|(key, value)| (key.clone(), ctx.render(value)))
        .collect()
}
