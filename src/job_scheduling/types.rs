//! Job scheduling type definitions

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::models::{ExecutionResult, PipelineId, WorkloadParameters, WorkloadType};

/// Where a job sits in a pipeline, carried for log correlation only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineContext {
    pub pipeline_id: PipelineId,
    pub pipeline_name: String,
    /// Zero-based position of the step in execution order
    pub step_index: usize,
    pub step_count: usize,
}

impl fmt::Display for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pipeline '{}' ({}) step {}/{}",
            self.pipeline_name,
            self.pipeline_id,
            self.step_index + 1,
            self.step_count
        )
    }
}

/// Unit of work handed to the substrate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobCallback {
    /// Run a workload executable
    Execute {
        workload_type: WorkloadType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameters: Option<WorkloadParameters>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pipeline: Option<PipelineContext>,
    },
    /// Wait before releasing the next pipeline step
    Delay {
        #[serde(with = "crate::config::duration_serde::duration")]
        duration: Duration,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pipeline: Option<PipelineContext>,
    },
}

impl JobCallback {
    pub fn execute(workload_type: WorkloadType, parameters: Option<WorkloadParameters>) -> Self {
        Self::Execute {
            workload_type,
            parameters,
            pipeline: None,
        }
    }

    pub fn delay(duration: Duration) -> Self {
        Self::Delay {
            duration,
            pipeline: None,
        }
    }

    pub fn with_pipeline(mut self, context: PipelineContext) -> Self {
        match &mut self {
            Self::Execute { pipeline, .. } | Self::Delay { pipeline, .. } => {
                *pipeline = Some(context)
            }
        }
        self
    }

    pub fn pipeline(&self) -> Option<&PipelineContext> {
        match self {
            Self::Execute { pipeline, .. } | Self::Delay { pipeline, .. } => pipeline.as_ref(),
        }
    }

    pub fn workload_type(&self) -> Option<WorkloadType> {
        match self {
            Self::Execute { workload_type, .. } => Some(*workload_type),
            Self::Delay { .. } => None,
        }
    }
}

impl fmt::Display for JobCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute { workload_type, .. } => write!(f, "execute {workload_type}"),
            Self::Delay { duration, .. } => {
                write!(f, "delay {}", humantime::format_duration(*duration))
            }
        }
    }
}

/// When a continuation may run relative to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationCondition {
    /// Run only if the parent succeeded; otherwise the continuation is deleted
    OnlyOnSucceeded,
    /// Run once the parent succeeded or failed
    OnAnyFinished,
}

impl ContinuationCondition {
    /// Whether a parent that reached `parent_state` releases the continuation
    pub fn is_satisfied_by(self, parent_state: JobState) -> bool {
        match self {
            Self::OnlyOnSucceeded => parent_state == JobState::Succeeded,
            Self::OnAnyFinished => {
                matches!(parent_state, JobState::Succeeded | JobState::Failed)
            }
        }
    }
}

/// Lifecycle states of a job
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum JobState {
    Enqueued,
    Scheduled,
    /// Continuation waiting on its parent
    Awaiting,
    Processing,
    Succeeded,
    Failed,
    Deleted,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Deleted)
    }
}

/// One entry of a job's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub state_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl StateTransition {
    pub fn new(state: JobState, reason: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            state_name: state.to_string(),
            reason,
            at,
        }
    }
}

/// What the substrate knows about a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetails {
    pub created_at: DateTime<Utc>,
    /// Most recent first
    pub history: Vec<StateTransition>,
    /// Execution result recorded when the job finished, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
}

/// Successful outcome of a job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    pub result: Option<ExecutionResult>,
}

impl JobOutput {
    pub fn execution(result: ExecutionResult) -> Self {
        Self {
            result: Some(result),
        }
    }
}

/// Failed outcome of a job, with whatever the workload produced before failing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct JobFailure {
    pub message: String,
    pub result: Option<ExecutionResult>,
}

impl JobFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            result: None,
        }
    }
}
