use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub mod defaults;
pub mod duration_serde;

use crate::errors::{AppError, AppResult};
use crate::models::{WorkloadParameters, WorkloadType};
use crate::pipeline::ContinueOnErrorPolicy;
use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Recurring jobs registered when the service starts
    #[serde(default)]
    pub recurring: Vec<RecurringJobConfig>,
}

/// Process executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Directory holding the workload executables. Relative paths are resolved
    /// against the directory of the running binary.
    #[serde(default = "default_executables_dir")]
    pub executables_dir: PathBuf,
    /// Hard limit on a single workload run
    #[serde(default = "default_execution_timeout", with = "duration_serde::duration")]
    pub timeout: Duration,
}

impl ExecutorConfig {
    /// Absolute executables directory
    pub fn resolved_executables_dir(&self) -> PathBuf {
        if self.executables_dir.is_absolute() {
            return self.executables_dir.clone();
        }

        let base_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        base_dir.join(&self.executables_dir)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            executables_dir: default_executables_dir(),
            timeout: default_execution_timeout(),
        }
    }
}

/// Pipeline compilation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Whether a step's `continue_on_error` flag lets the chain run past its failure
    #[serde(default)]
    pub continue_on_error: ContinueOnErrorPolicy,
}

/// Job runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// How often the runner looks for ready jobs
    #[serde(default = "default_poll_interval", with = "duration_serde::duration")]
    pub poll_interval: Duration,
    /// Upper bound on workloads running at once
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// How long shutdown waits for running jobs
    #[serde(default = "default_shutdown_grace", with = "duration_serde::duration")]
    pub shutdown_grace: Duration,
    /// Finished jobs older than this are dropped from the substrate
    #[serde(default = "default_job_retention", with = "duration_serde::duration")]
    pub job_retention: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            shutdown_grace: default_shutdown_grace(),
            job_retention: default_job_retention(),
        }
    }
}

/// A recurring job definition from the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringJobConfig {
    pub id: String,
    pub workload_type: WorkloadType,
    pub cron_expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<WorkloadParameters>,
}

fn default_executables_dir() -> PathBuf {
    PathBuf::from(DEFAULT_EXECUTABLES_DIR)
}

fn default_execution_timeout() -> Duration {
    parse_default(DEFAULT_EXECUTION_TIMEOUT)
}

fn default_poll_interval() -> Duration {
    parse_default(DEFAULT_POLL_INTERVAL)
}

fn default_max_concurrent_jobs() -> usize {
    DEFAULT_MAX_CONCURRENT_JOBS
}

fn default_shutdown_grace() -> Duration {
    parse_default(DEFAULT_SHUTDOWN_GRACE)
}

fn default_job_retention() -> Duration {
    parse_default(DEFAULT_JOB_RETENTION)
}

fn parse_default(value: &str) -> Duration {
    humantime::parse_duration(value).unwrap_or_default()
}

impl Config {
    /// Load from `$CONFIG_FILE`, or `orchestrator.toml` when unset
    pub fn load() -> AppResult<Self> {
        let config_file =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from_file(&config_file)
    }

    /// Defaults, then the TOML file if it exists, then `ORCHESTRATOR_*` variables
    /// (`ORCHESTRATOR_EXECUTOR__TIMEOUT=5m`).
    pub fn load_from_file(config_file: impl AsRef<Path>) -> AppResult<Self> {
        let config_file = config_file.as_ref();
        if config_file.exists() {
            info!("Loading configuration from {}", config_file.display());
        } else {
            debug!(
                "Config file {} not found, using defaults and environment",
                config_file.display()
            );
        }

        Self::from_figment(Self::figment(config_file))
    }

    /// The layered provider chain used by [`Config::load_from_file`]
    pub fn figment(config_file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> AppResult<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.executor.timeout.is_zero() {
            return Err(AppError::configuration(
                "executor.timeout must be greater than zero",
            ));
        }
        if self.runner.max_concurrent_jobs == 0 {
            return Err(AppError::configuration(
                "runner.max_concurrent_jobs must be at least 1",
            ));
        }
        if self.runner.poll_interval.is_zero() {
            return Err(AppError::configuration(
                "runner.poll_interval must be greater than zero",
            ));
        }
        if self.runner.job_retention.is_zero() {
            return Err(AppError::configuration(
                "runner.job_retention must be greater than zero",
            ));
        }
        for recurring in &self.recurring {
            crate::utils::cron_helper::validate_cron_expression(&recurring.cron_expression)
                .map_err(|e| {
                    AppError::configuration(format!("recurring job '{}': {e}", recurring.id))
                })?;
        }
        Ok(())
    }
}
