//! Compiles a pipeline request into a chain of continuation jobs
//!
//! Steps are stably sorted by `order`. The first step is enqueued, every later
//! step is a continuation of the job before it, and a step with a
//! `delay_after_completion` gets a `Delay` job spliced in after it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info};

use super::parameter_merger::merge;
use crate::errors::{PipelineError, RequestError, SubstrateError};
use crate::job_scheduling::{ContinuationCondition, JobCallback, JobSubstrate, PipelineContext};
use crate::models::{JobId, PipelineId, WorkflowPipelineRequest, WorkflowStep};

/// How a step's `continue_on_error` flag affects the chain
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContinueOnErrorPolicy {
    /// Any failed step stops the rest of the pipeline
    #[default]
    Halt,
    /// Steps flagged `continue_on_error` let the next step run after a failure
    HonorStepFlag,
}

impl ContinueOnErrorPolicy {
    /// Link condition for whatever directly follows `step`
    pub fn link_after(self, step: &WorkflowStep) -> ContinuationCondition {
        match self {
            Self::HonorStepFlag if step.continue_on_error => ContinuationCondition::OnAnyFinished,
            _ => ContinuationCondition::OnlyOnSucceeded,
        }
    }
}

/// One submission the compiler will make, in order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedSubmission {
    /// Position of the owning step after sorting; a delay belongs to the step it follows
    pub step_index: usize,
    pub callback: JobCallback,
    /// `None` for the entry job, otherwise the condition on the previous submission
    pub link: Option<ContinuationCondition>,
}

/// Ordered submissions for one pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelinePlan {
    pub pipeline_id: PipelineId,
    pub pipeline_name: String,
    pub step_count: usize,
    pub submissions: Vec<PlannedSubmission>,
}

/// Turns pipeline requests into substrate submissions
pub struct PipelineCompiler<S: JobSubstrate> {
    substrate: Arc<S>,
    policy: ContinueOnErrorPolicy,
}

impl<S: JobSubstrate> PipelineCompiler<S> {
    pub fn new(substrate: Arc<S>, policy: ContinueOnErrorPolicy) -> Self {
        Self { substrate, policy }
    }

    pub fn policy(&self) -> ContinueOnErrorPolicy {
        self.policy
    }

    /// Compute the submissions without touching the substrate
    pub fn plan(&self, request: &WorkflowPipelineRequest) -> Result<PipelinePlan, RequestError> {
        request.validate()?;

        let mut steps: Vec<&WorkflowStep> = request.steps.iter().collect();
        steps.sort_by_key(|step| step.order);

        let pipeline_id = PipelineId::generate();
        let step_count = steps.len();
        let context = |step_index| PipelineContext {
            pipeline_id,
            pipeline_name: request.pipeline_name.clone(),
            step_index,
            step_count,
        };

        let mut submissions = Vec::with_capacity(step_count * 2);
        for (index, step) in steps.iter().enumerate() {
            let parameters = merge(request.global_parameters.as_ref(), step.parameters.as_ref());
            let execute =
                JobCallback::execute(step.workload_type, parameters).with_pipeline(context(index));

            let Some(previous) = index.checked_sub(1).map(|i| steps[i]) else {
                submissions.push(PlannedSubmission {
                    step_index: index,
                    callback: execute,
                    link: None,
                });
                continue;
            };

            let link = self.policy.link_after(previous);
            match previous.effective_delay() {
                Some(delay) => {
                    submissions.push(PlannedSubmission {
                        step_index: index - 1,
                        callback: JobCallback::delay(delay).with_pipeline(context(index - 1)),
                        link: Some(link),
                    });
                    submissions.push(PlannedSubmission {
                        step_index: index,
                        callback: execute,
                        link: Some(ContinuationCondition::OnlyOnSucceeded),
                    });
                }
                None => submissions.push(PlannedSubmission {
                    step_index: index,
                    callback: execute,
                    link: Some(link),
                }),
            }
        }

        Ok(PipelinePlan {
            pipeline_id,
            pipeline_name: request.pipeline_name.clone(),
            step_count,
            submissions,
        })
    }

    /// Submit a plan in order, chaining each job to the one before it.
    ///
    /// Returns the job ids in submission order. A failure part way leaves the
    /// already submitted jobs in place.
    pub async fn submit(&self, plan: &PipelinePlan) -> Result<Vec<JobId>, SubstrateError> {
        let mut job_ids: Vec<JobId> = Vec::with_capacity(plan.submissions.len());

        for submission in &plan.submissions {
            let callback = submission.callback.clone();
            let job_id = match (job_ids.last(), submission.link) {
                (Some(previous_job_id), Some(condition)) => {
                    self.substrate
                        .continue_with(previous_job_id, callback, condition)
                        .await?
                }
                _ => self.substrate.enqueue(callback).await?,
            };
            debug!(
                "Pipeline {} step {}: submitted {} as job {}",
                plan.pipeline_id, submission.step_index, submission.callback, job_id
            );
            job_ids.push(job_id);
        }

        info!(
            "Compiled pipeline '{}' ({}) into {} jobs for {} steps",
            plan.pipeline_name,
            plan.pipeline_id,
            job_ids.len(),
            plan.step_count
        );
        Ok(job_ids)
    }

    /// Plan and submit; returns as soon as every job is accepted
    pub async fn compile(
        &self,
        request: &WorkflowPipelineRequest,
    ) -> Result<PipelineId, PipelineError> {
        let plan = self.plan(request)?;
        self.submit(&plan).await?;
        Ok(plan.pipeline_id)
    }
}
