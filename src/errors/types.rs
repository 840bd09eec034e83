//! Error type definitions for the workload orchestrator
//!
//! The variants mirror the failure taxonomy callers act on: an unsupported or
//! missing executable is fatal to one request, a timeout or non-zero exit still
//! carries the captured output, and request validation errors never reach the
//! process layer.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::{ExecutionResult, JobId, WorkloadType};

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Process execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Request validation errors
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    /// Job substrate errors
    #[error("Job substrate error: {0}")]
    Substrate(#[from] SubstrateError),

    /// Pipeline compilation errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Errors raised while running an external workload
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The workload name does not map to a known executable
    #[error("Unsupported workload type: {workload}")]
    UnsupportedWorkload { workload: String },

    /// The resolved executable is missing on disk
    #[error("Executable for {workload} not found at {}", .path.display())]
    ExecutableNotFound { workload: WorkloadType, path: PathBuf },

    /// The child outlived the configured timeout and was killed
    #[error("Workload {workload} exceeded timeout of {timeout:?} and was terminated")]
    ExecutionTimeout {
        workload: WorkloadType,
        timeout: Duration,
        result: Box<ExecutionResult>,
    },

    /// The child ran to completion but reported failure
    #[error("Workload {workload} exited with code {}", exit_code_label(.exit_code))]
    NonZeroExit {
        workload: WorkloadType,
        exit_code: Option<i32>,
        result: Box<ExecutionResult>,
    },

    /// Launching or monitoring the child failed unexpectedly
    #[error("Workload {workload} failed after {elapsed_ms}ms: {message}")]
    ExecutionFailure {
        workload: WorkloadType,
        message: String,
        elapsed_ms: u64,
    },
}

impl ExecutionError {
    /// The captured result, when the child got far enough to produce one
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            Self::ExecutionTimeout { result, .. } | Self::NonZeroExit { result, .. } => {
                Some(result)
            }
            _ => None,
        }
    }

    /// Consume the error and take ownership of the captured result
    pub fn into_result(self) -> Option<ExecutionResult> {
        match self {
            Self::ExecutionTimeout { result, .. } | Self::NonZeroExit { result, .. } => {
                Some(*result)
            }
            _ => None,
        }
    }
}

fn exit_code_label(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Validation failures for incoming submissions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Pipeline must contain at least one step")]
    EmptyPipeline,

    #[error("Pipeline name must not be empty")]
    MissingPipelineName,

    #[error("scheduled_at is required for scheduled execution")]
    MissingScheduleTime,

    #[error("cron_expression is required for recurring execution")]
    MissingCronExpression,

    #[error("recurring_job_id is required for recurring execution")]
    MissingRecurringJobId,

    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidCronExpression { expression: String, message: String },
}

/// Errors reported by the job substrate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubstrateError {
    /// A continuation referenced a parent the substrate does not know
    #[error("Job {job_id} not found")]
    JobNotFound { job_id: JobId },

    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidCronExpression { expression: String, message: String },

    /// The substrate could not be reached or refused the operation
    #[error("Job substrate unavailable: {message}")]
    Unavailable { message: String },
}

/// Errors raised while compiling a pipeline into chained jobs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Failed to submit pipeline step: {0}")]
    Substrate(#[from] SubstrateError),
}
