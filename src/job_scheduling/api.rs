//! External API for the orchestration core
//!
//! Validates requests and turns them into substrate submissions. This is the
//! only entry point callers need; the executor is reached through the substrate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::status_translator::JobStatusTranslator;
use super::substrate::JobSubstrate;
use super::types::JobCallback;
use crate::errors::{AppError, AppResult};
use crate::models::{
    ExecutionMode, JobId, JobStatusView, PipelineId, SubmissionTarget, WorkflowPipelineRequest,
    WorkloadExecutionRequest, WorkloadType,
};
use crate::pipeline::{ContinueOnErrorPolicy, PipelineCompiler};
use crate::utils::cron_helper::{calculate_next_scheduled_time, validate_cron_expression};

/// Returned for an accepted single-workload submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    /// The substrate job id, or the recurring id for recurring submissions
    pub job_id: String,
    pub workload_type: WorkloadType,
    pub mode: ExecutionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_job_id: Option<String>,
}

/// Returned for an accepted pipeline submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReceipt {
    pub pipeline_id: PipelineId,
    pub pipeline_name: String,
    pub step_count: usize,
    pub entry_job_id: JobId,
}

pub struct OrchestrationApi<S: JobSubstrate> {
    substrate: Arc<S>,
    compiler: Arc<PipelineCompiler<S>>,
    translator: Arc<JobStatusTranslator<S>>,
}

impl<S: JobSubstrate> OrchestrationApi<S> {
    pub fn new(substrate: Arc<S>, policy: ContinueOnErrorPolicy) -> Self {
        Self {
            compiler: Arc::new(PipelineCompiler::new(substrate.clone(), policy)),
            translator: Arc::new(JobStatusTranslator::new(substrate.clone())),
            substrate,
        }
    }

    pub fn compiler(&self) -> &PipelineCompiler<S> {
        &self.compiler
    }

    /// Submit one workload immediately, at a time, or on a cron schedule
    pub async fn submit(&self, request: &WorkloadExecutionRequest) -> AppResult<SubmissionReceipt> {
        let target = request.validate()?;
        let callback = JobCallback::execute(request.workload_type, request.parameters.clone());

        let receipt = match target {
            SubmissionTarget::Immediate => {
                let job_id = self.substrate.enqueue(callback).await?;
                SubmissionReceipt {
                    job_id: job_id.to_string(),
                    workload_type: request.workload_type,
                    mode: ExecutionMode::Immediate,
                    scheduled_at: None,
                    recurring_job_id: None,
                }
            }
            SubmissionTarget::Scheduled(run_at) => {
                let job_id = self.substrate.schedule_at(callback, run_at).await?;
                SubmissionReceipt {
                    job_id: job_id.to_string(),
                    workload_type: request.workload_type,
                    mode: ExecutionMode::Scheduled,
                    scheduled_at: Some(run_at),
                    recurring_job_id: None,
                }
            }
            SubmissionTarget::Recurring {
                id,
                cron_expression,
            } => {
                validate_cron_expression(cron_expression)?;
                self.substrate
                    .add_or_update_recurring(id, callback, cron_expression)
                    .await?;
                SubmissionReceipt {
                    job_id: id.to_string(),
                    workload_type: request.workload_type,
                    mode: ExecutionMode::Recurring,
                    scheduled_at: calculate_next_scheduled_time(cron_expression),
                    recurring_job_id: Some(id.to_string()),
                }
            }
        };

        info!(
            "API: Accepted {:?} submission of {} as {}",
            receipt.mode, receipt.workload_type, receipt.job_id
        );
        Ok(receipt)
    }

    /// Compile a pipeline into chained jobs
    pub async fn submit_pipeline(
        &self,
        request: &WorkflowPipelineRequest,
    ) -> AppResult<PipelineReceipt> {
        let plan = self.compiler.plan(request)?;
        let job_ids = self.compiler.submit(&plan).await?;
        let entry_job_id = job_ids
            .into_iter()
            .next()
            .ok_or_else(|| AppError::internal("pipeline compiled into zero jobs"))?;

        info!(
            "API: Accepted pipeline '{}' ({}) with {} steps",
            plan.pipeline_name, plan.pipeline_id, plan.step_count
        );
        Ok(PipelineReceipt {
            pipeline_id: plan.pipeline_id,
            pipeline_name: plan.pipeline_name,
            step_count: plan.step_count,
            entry_job_id,
        })
    }

    pub async fn status(&self, job_id: &JobId) -> JobStatusView {
        self.translator.status(job_id).await
    }

    /// Delete a job; substrate failures are logged and reported as `false`
    pub async fn delete_job(&self, job_id: &JobId) -> bool {
        match self.substrate.delete(job_id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("API: Failed to delete job {}: {}", job_id, e);
                false
            }
        }
    }

    /// Remove a recurring definition; substrate failures are logged and reported as `false`
    pub async fn remove_recurring(&self, recurring_id: &str) -> bool {
        match self.substrate.remove_recurring(recurring_id).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("API: Failed to remove recurring job '{}': {}", recurring_id, e);
                false
            }
        }
    }

    /// Next fire time of a cron expression
    pub fn next_occurrence(&self, cron_expression: &str) -> AppResult<Option<DateTime<Utc>>> {
        let schedule = validate_cron_expression(cron_expression)?;
        Ok(schedule.upcoming(Utc).next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RequestError;
    use crate::job_scheduling::{InMemorySubstrate, JobState};
    use crate::models::{STATUS_NOT_FOUND, WorkflowStep};
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    fn api() -> (Arc<InMemorySubstrate>, OrchestrationApi<InMemorySubstrate>) {
        let substrate = Arc::new(InMemorySubstrate::new());
        (
            substrate.clone(),
            OrchestrationApi::new(substrate, ContinueOnErrorPolicy::Halt),
        )
    }

    #[tokio::test]
    async fn test_immediate_submission_enqueues() {
        let (substrate, api) = api();
        let receipt = api
            .submit(&WorkloadExecutionRequest::immediate(WorkloadType::InvoiceGeneration))
            .await
            .unwrap();

        assert_eq!(receipt.mode, ExecutionMode::Immediate);
        let job_id = JobId::from(receipt.job_id);
        assert_eq!(substrate.job_state(&job_id).await, Some(JobState::Enqueued));
        assert_eq!(api.status(&job_id).await.status, "Enqueued");
    }

    #[tokio::test]
    async fn test_scheduled_submission_keeps_time() {
        let (substrate, api) = api();
        let run_at = Utc::now() + Duration::hours(3);
        let receipt = api
            .submit(&WorkloadExecutionRequest::scheduled(WorkloadType::BackupSnapshot, run_at))
            .await
            .unwrap();

        assert_eq!(receipt.scheduled_at, Some(run_at));
        assert_eq!(
            substrate.job_state(&JobId::from(receipt.job_id)).await,
            Some(JobState::Scheduled)
        );
    }

    #[tokio::test]
    async fn test_recurring_submission_uses_recurring_id() {
        let (substrate, api) = api();
        let receipt = api
            .submit(&WorkloadExecutionRequest::recurring(
                WorkloadType::DatabaseCleanup,
                "nightly-cleanup",
                "0 30 2 * * *",
            ))
            .await
            .unwrap();

        assert_eq!(receipt.job_id, "nightly-cleanup");
        assert_eq!(receipt.recurring_job_id.as_deref(), Some("nightly-cleanup"));
        assert!(receipt.scheduled_at.is_some());
        assert_eq!(substrate.recurring_jobs().await.len(), 1);

        assert!(api.remove_recurring("nightly-cleanup").await);
        assert!(!api.remove_recurring("nightly-cleanup").await);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected() {
        let (substrate, api) = api();

        let mut request = WorkloadExecutionRequest::immediate(WorkloadType::DataExport);
        request.mode = ExecutionMode::Scheduled;
        let err = api.submit(&request).await.unwrap_err();
        assert!(matches!(err, AppError::Request(RequestError::MissingScheduleTime)));

        let err = api
            .submit(&WorkloadExecutionRequest::recurring(
                WorkloadType::DataExport,
                "bad-cron",
                "whenever",
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Request(RequestError::InvalidCronExpression { .. })
        ));
        assert_eq!(substrate.stats().await, Default::default());
    }

    #[tokio::test]
    async fn test_pipeline_receipt_points_at_entry_job() {
        let (substrate, api) = api();
        let request = WorkflowPipelineRequest::new(
            "month-end",
            vec![
                WorkflowStep::new(WorkloadType::ReportGeneration, 2),
                WorkflowStep::new(WorkloadType::InvoiceGeneration, 1)
                    .with_delay(StdDuration::from_secs(60)),
            ],
        );

        let receipt = api.submit_pipeline(&request).await.unwrap();
        assert_eq!(receipt.step_count, 2);
        assert_ne!(receipt.pipeline_id.to_string(), receipt.entry_job_id.to_string());

        let entry = substrate.callback(&receipt.entry_job_id).await.unwrap();
        assert_eq!(entry.workload_type(), Some(WorkloadType::InvoiceGeneration));
        assert_eq!(substrate.job_ids().await.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_rejected() {
        let (_, api) = api();
        let err = api
            .submit_pipeline(&WorkflowPipelineRequest::new("nothing", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Request(RequestError::EmptyPipeline)));
    }

    #[tokio::test]
    async fn test_status_and_delete_of_unknown_job() {
        let (_, api) = api();
        let unknown = JobId::from("does-not-exist");

        assert_eq!(api.status(&unknown).await.status, STATUS_NOT_FOUND);
        assert!(!api.delete_job(&unknown).await);
    }

    #[test]
    fn test_next_occurrence() {
        let (_, api) = api();
        assert!(api.next_occurrence("0 0 12 * * *").unwrap().unwrap() > Utc::now());
        assert!(api.next_occurrence("noon").is_err());
    }
}
