//! What a claimed job actually does

use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info};

use super::types::{JobCallback, JobFailure, JobOutput};
use crate::executor::ProcessExecutor;
use crate::models::JobId;

/// Performs the work described by a [`JobCallback`]
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job_id: &JobId, callback: &JobCallback) -> Result<JobOutput, JobFailure>;
}

/// Runs `Execute` callbacks through the process executor and sleeps for `Delay`
#[derive(Debug, Clone)]
pub struct WorkloadJobHandler {
    executor: ProcessExecutor,
}

impl WorkloadJobHandler {
    pub fn new(executor: ProcessExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &ProcessExecutor {
        &self.executor
    }
}

#[async_trait]
impl JobHandler for WorkloadJobHandler {
    async fn handle(
        &self,
        job_id: &JobId,
        callback: &JobCallback,
    ) -> Result<JobOutput, JobFailure> {
        let context = callback
            .pipeline()
            .map(|pipeline| format!(" [{pipeline}]"))
            .unwrap_or_default();

        match callback {
            JobCallback::Execute {
                workload_type,
                parameters,
                ..
            } => {
                info!("Job {}{}: executing {}", job_id, context, workload_type);
                match self.executor.execute(*workload_type, parameters.as_ref()).await {
                    Ok(result) => Ok(JobOutput::execution(result)),
                    Err(e) => {
                        error!("Job {}{}: {}", job_id, context, e);
                        let message = e.to_string();
                        Err(JobFailure {
                            message,
                            result: e.into_result(),
                        })
                    }
                }
            }
            JobCallback::Delay { duration, .. } => {
                info!(
                    "Job {}{}: waiting {} before the next step",
                    job_id,
                    context,
                    humantime::format_duration(*duration)
                );
                let started = Instant::now();
                tokio::time::sleep(*duration).await;
                info!(
                    "Job {}{}: delay finished after {:?}",
                    job_id,
                    context,
                    started.elapsed()
                );
                Ok(JobOutput::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExecutionError;
    use crate::models::WorkloadType;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_delay_sleeps_for_duration() {
        let handler =
            WorkloadJobHandler::new(ProcessExecutor::new("/nonexistent", Duration::from_secs(1)));
        let started = Instant::now();

        let output = handler
            .handle(&JobId::from("delay"), &JobCallback::delay(Duration::from_millis(50)))
            .await
            .unwrap();

        assert_eq!(output, JobOutput::default());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(logs_contain("waiting 50ms before the next step"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_executable_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let handler =
            WorkloadJobHandler::new(ProcessExecutor::new(dir.path(), Duration::from_secs(1)));

        let failure = handler
            .handle(
                &JobId::from("exec"),
                &JobCallback::execute(WorkloadType::CustomerSync, None),
            )
            .await
            .unwrap_err();

        let expected = ExecutionError::ExecutableNotFound {
            workload: WorkloadType::CustomerSync,
            path: handler.executor().resolve_path(WorkloadType::CustomerSync).unwrap(),
        };
        assert_eq!(failure.message, expected.to_string());
        assert!(failure.result.is_none());
        assert!(logs_contain("executing CustomerSync"));
    }
}
