//! The job substrate seam
//!
//! Everything that queues, schedules, persists or chains jobs lives behind
//! [`JobSubstrate`]. The orchestration core only submits callbacks and reads back
//! job history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{ContinuationCondition, JobCallback, JobDetails};
use crate::errors::SubstrateResult;
use crate::models::JobId;

#[async_trait]
pub trait JobSubstrate: Send + Sync {
    /// Queue a job for immediate execution
    async fn enqueue(&self, callback: JobCallback) -> SubstrateResult<JobId>;

    /// Queue a job to become ready at `run_at`
    async fn schedule_at(
        &self,
        callback: JobCallback,
        run_at: DateTime<Utc>,
    ) -> SubstrateResult<JobId>;

    /// Register or replace the recurring definition `recurring_id`
    async fn add_or_update_recurring(
        &self,
        recurring_id: &str,
        callback: JobCallback,
        cron_expression: &str,
    ) -> SubstrateResult<()>;

    /// Queue a job that runs after `parent` finishes in a way `condition` accepts
    async fn continue_with(
        &self,
        parent: &JobId,
        callback: JobCallback,
        condition: ContinuationCondition,
    ) -> SubstrateResult<JobId>;

    /// Delete a job; `false` when there was nothing to delete
    async fn delete(&self, job_id: &JobId) -> SubstrateResult<bool>;

    /// Remove a recurring definition; `false` when it did not exist
    async fn remove_recurring(&self, recurring_id: &str) -> SubstrateResult<bool>;

    /// `None` when the substrate has no record of the job
    async fn job_details(&self, job_id: &JobId) -> SubstrateResult<Option<JobDetails>>;
}
