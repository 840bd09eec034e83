//! Submission requests for single workloads and pipelines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};

use super::workload::{WorkloadParameters, WorkloadType};
use crate::errors::RequestError;

/// How a single workload submission is handed to the job substrate
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ExecutionMode {
    #[default]
    Immediate,
    Scheduled,
    Recurring,
}

/// Request to run one workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadExecutionRequest {
    pub workload_type: WorkloadType,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<WorkloadParameters>,
    /// Required when `mode` is `Scheduled`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Required when `mode` is `Recurring`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    /// Required when `mode` is `Recurring`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_job_id: Option<String>,
}

/// A request that passed validation, with the mode-specific fields unpacked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionTarget<'a> {
    Immediate,
    Scheduled(DateTime<Utc>),
    Recurring { id: &'a str, cron_expression: &'a str },
}

impl WorkloadExecutionRequest {
    pub fn immediate(workload_type: WorkloadType) -> Self {
        Self {
            workload_type,
            mode: ExecutionMode::Immediate,
            parameters: None,
            scheduled_at: None,
            cron_expression: None,
            recurring_job_id: None,
        }
    }

    pub fn scheduled(workload_type: WorkloadType, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            mode: ExecutionMode::Scheduled,
            scheduled_at: Some(scheduled_at),
            ..Self::immediate(workload_type)
        }
    }

    pub fn recurring(
        workload_type: WorkloadType,
        recurring_job_id: impl Into<String>,
        cron_expression: impl Into<String>,
    ) -> Self {
        Self {
            mode: ExecutionMode::Recurring,
            cron_expression: Some(cron_expression.into()),
            recurring_job_id: Some(recurring_job_id.into()),
            ..Self::immediate(workload_type)
        }
    }

    pub fn with_parameters(mut self, parameters: WorkloadParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Check that the fields required by `mode` are present.
    ///
    /// Blank strings count as missing. Cron syntax is not checked here.
    pub fn validate(&self) -> Result<SubmissionTarget<'_>, RequestError> {
        match self.mode {
            ExecutionMode::Immediate => Ok(SubmissionTarget::Immediate),
            ExecutionMode::Scheduled => self
                .scheduled_at
                .map(SubmissionTarget::Scheduled)
                .ok_or(RequestError::MissingScheduleTime),
            ExecutionMode::Recurring => {
                let cron_expression = non_blank(self.cron_expression.as_deref())
                    .ok_or(RequestError::MissingCronExpression)?;
                let id = non_blank(self.recurring_job_id.as_deref())
                    .ok_or(RequestError::MissingRecurringJobId)?;
                Ok(SubmissionTarget::Recurring {
                    id,
                    cron_expression,
                })
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// One step of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub workload_type: WorkloadType,
    /// Sort key; duplicates keep their list position
    #[serde(default)]
    pub order: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<WorkloadParameters>,
    /// Pause inserted between this step and the next one
    #[serde(
        default,
        with = "crate::config::duration_serde::option_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub delay_after_completion: Option<Duration>,
    /// Whether the next step may run when this one fails. Only honoured when the
    /// pipeline policy is `honor_step_flag`.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl WorkflowStep {
    pub fn new(workload_type: WorkloadType, order: i32) -> Self {
        Self {
            workload_type,
            order,
            parameters: None,
            delay_after_completion: None,
            continue_on_error: false,
        }
    }

    pub fn with_parameters(mut self, parameters: WorkloadParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_after_completion = Some(delay);
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// The delay to insert after this step, ignoring zero durations
    pub fn effective_delay(&self) -> Option<Duration> {
        self.delay_after_completion.filter(|delay| !delay.is_zero())
    }
}

/// Ordered multi-step submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPipelineRequest {
    pub pipeline_name: String,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    /// Applied to every step; step parameters win on conflicts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_parameters: Option<WorkloadParameters>,
}

impl WorkflowPipelineRequest {
    pub fn new(pipeline_name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            steps,
            global_parameters: None,
        }
    }

    pub fn with_global_parameters(mut self, parameters: WorkloadParameters) -> Self {
        self.global_parameters = Some(parameters);
        self
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.steps.is_empty() {
            return Err(RequestError::EmptyPipeline);
        }
        if self.pipeline_name.trim().is_empty() {
            return Err(RequestError::MissingPipelineName);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_immediate_request_needs_nothing_else() {
        let request = WorkloadExecutionRequest::immediate(WorkloadType::CacheWarmup);
        assert_eq!(request.validate(), Ok(SubmissionTarget::Immediate));
    }

    #[test]
    fn test_scheduled_request_requires_time() {
        let mut request = WorkloadExecutionRequest::immediate(WorkloadType::CacheWarmup);
        request.mode = ExecutionMode::Scheduled;
        assert_eq!(request.validate(), Err(RequestError::MissingScheduleTime));

        let at = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        let request = WorkloadExecutionRequest::scheduled(WorkloadType::CacheWarmup, at);
        assert_eq!(request.validate(), Ok(SubmissionTarget::Scheduled(at)));
    }

    #[test]
    fn test_recurring_request_requires_cron_and_id() {
        let mut request = WorkloadExecutionRequest::immediate(WorkloadType::IndexRebuild);
        request.mode = ExecutionMode::Recurring;
        assert_eq!(request.validate(), Err(RequestError::MissingCronExpression));

        request.cron_expression = Some("0 0 * * * *".to_string());
        assert_eq!(request.validate(), Err(RequestError::MissingRecurringJobId));

        request.recurring_job_id = Some("   ".to_string());
        assert_eq!(request.validate(), Err(RequestError::MissingRecurringJobId));

        let request = WorkloadExecutionRequest::recurring(
            WorkloadType::IndexRebuild,
            "nightly",
            "0 0 * * * *",
        );
        assert_eq!(
            request.validate(),
            Ok(SubmissionTarget::Recurring {
                id: "nightly",
                cron_expression: "0 0 * * * *",
            })
        );
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: WorkloadExecutionRequest =
            serde_json::from_str(r#"{"workload_type":"DataImport"}"#).unwrap();
        assert_eq!(request.mode, ExecutionMode::Immediate);
        assert!(request.parameters.is_none());
    }

    #[test]
    fn test_step_delay_accepts_human_readable_durations() {
        let step: WorkflowStep = serde_json::from_str(
            r#"{"workload_type":"DataExport","order":1,"delay_after_completion":"2m"}"#,
        )
        .unwrap();
        assert_eq!(step.effective_delay(), Some(Duration::from_secs(120)));
        assert!(!step.continue_on_error);
    }

    #[test]
    fn test_zero_delay_is_no_delay() {
        let step = WorkflowStep::new(WorkloadType::DataExport, 1).with_delay(Duration::ZERO);
        assert_eq!(step.effective_delay(), None);
    }

    #[test]
    fn test_pipeline_validation() {
        let empty = WorkflowPipelineRequest::new("nightly", Vec::new());
        assert_eq!(empty.validate(), Err(RequestError::EmptyPipeline));

        let unnamed = WorkflowPipelineRequest::new(
            " ",
            vec![WorkflowStep::new(WorkloadType::DataExport, 1)],
        );
        assert_eq!(unnamed.validate(), Err(RequestError::MissingPipelineName));
    }

    #[test]
    fn test_pipeline_loads_from_toml() {
        let request: WorkflowPipelineRequest = toml::from_str(
            r#"
            pipeline_name = "month-end"

            [global_parameters]
            region = "eu"

            [[steps]]
            workload_type = "InvoiceGeneration"
            order = 1
            delay_after_completion = "30s"

            [[steps]]
            workload_type = "EmailDispatch"
            order = 2
            continue_on_error = true
            "#,
        )
        .unwrap();

        assert_eq!(request.steps.len(), 2);
        assert_eq!(
            request.steps[0].delay_after_completion,
            Some(Duration::from_secs(30))
        );
        assert!(request.steps[1].continue_on_error);
        assert_eq!(
            request.global_parameters.unwrap()["region"],
            serde_json::json!("eu")
        );
    }
}
