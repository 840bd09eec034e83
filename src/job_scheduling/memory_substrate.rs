//! In-memory job substrate
//!
//! Keeps every job, its history and its continuation links in one
//! `RwLock`-guarded table. Nothing is persisted and nothing is retried; jobs are
//! handed out through [`InMemorySubstrate::claim_ready`] and reported back with
//! [`InMemorySubstrate::complete`] by the [`super::JobRunner`].

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::substrate::JobSubstrate;
use super::types::{
    ContinuationCondition, JobCallback, JobDetails, JobFailure, JobOutput, JobState,
    StateTransition,
};
use crate::errors::{SubstrateError, SubstrateResult};
use crate::models::{ExecutionResult, JobId};

#[derive(Debug)]
struct JobRecord {
    callback: JobCallback,
    state: JobState,
    created_at: DateTime<Utc>,
    seq: u64,
    /// Most recent first
    history: Vec<StateTransition>,
    continuations: Vec<(JobId, ContinuationCondition)>,
    result: Option<ExecutionResult>,
    /// Claimed by a worker and not yet reported back
    in_flight: bool,
}

impl JobRecord {
    fn transition(&mut self, state: JobState, reason: Option<String>, at: DateTime<Utc>) {
        self.state = state;
        self.history.insert(0, StateTransition::new(state, reason, at));
    }

    fn finished_at(&self) -> Option<DateTime<Utc>> {
        if !self.state.is_terminal() || self.in_flight {
            return None;
        }
        Some(self.history.first().map_or(self.created_at, |latest| latest.at))
    }

    fn details(&self) -> JobDetails {
        JobDetails {
            created_at: self.created_at,
            history: self.history.clone(),
            result: self.result.clone(),
        }
    }
}

/// Heap entry; earliest `ready_at` first, submission order breaks ties
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ReadyEntry {
    ready_at: DateTime<Utc>,
    seq: u64,
    job_id: JobId,
}

#[derive(Debug)]
struct RecurringDefinition {
    callback: JobCallback,
    cron_expression: String,
    schedule: Schedule,
    next_run: Option<DateTime<Utc>>,
    last_job_id: Option<JobId>,
}

#[derive(Debug, Default)]
struct SubstrateState {
    jobs: HashMap<JobId, JobRecord>,
    ready: BinaryHeap<Reverse<ReadyEntry>>,
    recurring: BTreeMap<String, RecurringDefinition>,
    next_seq: u64,
}

impl SubstrateState {
    fn insert_job(
        &mut self,
        callback: JobCallback,
        state: JobState,
        reason: Option<String>,
        ready_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> JobId {
        let job_id = JobId::generate();
        let seq = self.next_seq;
        self.next_seq += 1;

        self.jobs.insert(
            job_id.clone(),
            JobRecord {
                callback,
                state,
                created_at: now,
                seq,
                history: vec![StateTransition::new(state, reason, now)],
                continuations: Vec::new(),
                result: None,
                in_flight: false,
            },
        );
        if let Some(ready_at) = ready_at {
            self.push_ready(job_id.clone(), seq, ready_at);
        }
        job_id
    }

    fn push_ready(&mut self, job_id: JobId, seq: u64, ready_at: DateTime<Utc>) {
        self.ready.push(Reverse(ReadyEntry {
            ready_at,
            seq,
            job_id,
        }));
    }

    /// Release or delete the awaiting continuations of a job that just reached a
    /// terminal state, cascading through deletions.
    fn settle_continuations(
        &mut self,
        parent_id: &JobId,
        parent_state: JobState,
        now: DateTime<Utc>,
    ) {
        let mut pending = vec![(parent_id.clone(), parent_state)];

        while let Some((parent_id, parent_state)) = pending.pop() {
            let continuations = match self.jobs.get_mut(&parent_id) {
                Some(parent) => std::mem::take(&mut parent.continuations),
                None => continue,
            };

            for (child_id, condition) in continuations {
                let Some(child) = self.jobs.get_mut(&child_id) else {
                    continue;
                };
                if child.state != JobState::Awaiting {
                    continue;
                }

                if condition.is_satisfied_by(parent_state) {
                    child.transition(
                        JobState::Enqueued,
                        Some(format!("Parent job {parent_id} {parent_state}")),
                        now,
                    );
                    let seq = child.seq;
                    debug!("Released continuation {} of job {}", child_id, parent_id);
                    self.push_ready(child_id, seq, now);
                } else {
                    child.transition(
                        JobState::Deleted,
                        Some(unmet_condition(&parent_id, parent_state, condition)),
                        now,
                    );
                    debug!("Deleted continuation {} of job {}", child_id, parent_id);
                    pending.push((child_id, JobState::Deleted));
                }
            }
        }
    }
}

fn unmet_condition(
    parent: &JobId,
    parent_state: JobState,
    condition: ContinuationCondition,
) -> String {
    format!("Parent job {parent} ended as {parent_state}, continuation requires {condition}")
}

/// A job handed to a worker
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub job_id: JobId,
    pub callback: JobCallback,
}

/// Public view of a recurring definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecurringJobInfo {
    pub id: String,
    pub cron_expression: String,
    pub next_run: Option<DateTime<Utc>>,
    pub last_job_id: Option<JobId>,
}

/// Job counts per state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubstrateStats {
    pub enqueued: usize,
    pub scheduled: usize,
    pub awaiting: usize,
    pub processing: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deleted: usize,
    pub recurring: usize,
}

/// Non-durable substrate backed by process memory
#[derive(Debug, Default)]
pub struct InMemorySubstrate {
    state: RwLock<SubstrateState>,
}

impl InMemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take up to `limit` jobs whose ready time has passed, marking them `Processing`
    pub async fn claim_ready(&self, now: DateTime<Utc>, limit: usize) -> Vec<ClaimedJob> {
        let mut state = self.state.write().await;
        let mut claimed = Vec::new();

        while claimed.len() < limit {
            match state.ready.peek() {
                Some(Reverse(entry)) if entry.ready_at <= now => {}
                _ => break,
            }
            let Some(Reverse(entry)) = state.ready.pop() else {
                break;
            };
            let Some(record) = state.jobs.get_mut(&entry.job_id) else {
                continue;
            };

            match record.state {
                JobState::Scheduled => {
                    record.transition(
                        JobState::Enqueued,
                        Some("Triggered by scheduler".to_string()),
                        now,
                    );
                }
                JobState::Enqueued => {}
                // Deleted while waiting in the heap
                _ => continue,
            }
            record.transition(JobState::Processing, None, now);
            record.in_flight = true;
            claimed.push(ClaimedJob {
                job_id: entry.job_id,
                callback: record.callback.clone(),
            });
        }

        if !claimed.is_empty() {
            debug!("Claimed {} ready jobs", claimed.len());
        }
        claimed
    }

    /// Record the outcome of a claimed job and settle its continuations
    pub async fn complete(&self, job_id: &JobId, outcome: Result<JobOutput, JobFailure>) {
        let now = Utc::now();
        let mut state = self.state.write().await;

        let Some(record) = state.jobs.get_mut(job_id) else {
            warn!("Completion reported for unknown job {}", job_id);
            return;
        };

        let (final_state, reason, result) = match outcome {
            Ok(output) => (JobState::Succeeded, None, output.result),
            Err(failure) => (JobState::Failed, Some(failure.message), failure.result),
        };
        record.result = result;
        record.in_flight = false;

        if record.state != JobState::Processing {
            // Deletion does not interrupt a running job; its outcome is kept but
            // the state stays as it is.
            debug!(
                "Job {} finished as {} after leaving Processing (now {})",
                job_id, final_state, record.state
            );
            return;
        }

        record.transition(final_state, reason, now);
        state.settle_continuations(job_id, final_state, now);
    }

    /// Enqueue one job for every recurring definition due at `now`
    pub async fn trigger_due_recurring(&self, now: DateTime<Utc>) -> Vec<JobId> {
        let mut state = self.state.write().await;
        let due: Vec<String> = state
            .recurring
            .iter()
            .filter(|(_, definition)| definition.next_run.is_some_and(|next| next <= now))
            .map(|(id, _)| id.clone())
            .collect();

        let mut triggered = Vec::with_capacity(due.len());
        for recurring_id in due {
            let Some(callback) = state
                .recurring
                .get(&recurring_id)
                .map(|definition| definition.callback.clone())
            else {
                continue;
            };

            let job_id = state.insert_job(
                callback,
                JobState::Enqueued,
                Some(format!("Triggered by recurring job '{recurring_id}'")),
                Some(now),
                now,
            );
            if let Some(definition) = state.recurring.get_mut(&recurring_id) {
                definition.next_run = definition.schedule.after(&now).next();
                definition.last_job_id = Some(job_id.clone());
                info!(
                    "Recurring job '{}' enqueued job {}, next run {:?}",
                    recurring_id, job_id, definition.next_run
                );
            }
            triggered.push(job_id);
        }

        triggered
    }

    /// Drop finished jobs whose last transition is older than `cutoff`.
    ///
    /// Jobs still held by a worker are kept even when deleted.
    pub async fn purge_finished(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.state.write().await;
        let SubstrateState { jobs, ready, .. } = &mut *state;

        let before = jobs.len();
        jobs.retain(|_, record| record.finished_at().is_none_or(|at| at >= cutoff));
        let purged = before - jobs.len();

        if purged > 0 {
            ready.retain(|Reverse(entry)| jobs.contains_key(&entry.job_id));
            debug!("Purged {} finished jobs older than {}", purged, cutoff);
        }
        purged
    }

    /// Every known job id in submission order
    pub async fn job_ids(&self) -> Vec<JobId> {
        let state = self.state.read().await;
        let mut jobs: Vec<(&JobId, u64)> = state
            .jobs
            .iter()
            .map(|(job_id, record)| (job_id, record.seq))
            .collect();
        jobs.sort_by_key(|(_, seq)| *seq);
        jobs.into_iter().map(|(job_id, _)| job_id.clone()).collect()
    }

    pub async fn job_state(&self, job_id: &JobId) -> Option<JobState> {
        self.state
            .read()
            .await
            .jobs
            .get(job_id)
            .map(|record| record.state)
    }

    pub async fn callback(&self, job_id: &JobId) -> Option<JobCallback> {
        self.state
            .read()
            .await
            .jobs
            .get(job_id)
            .map(|record| record.callback.clone())
    }

    pub async fn recurring_jobs(&self) -> Vec<RecurringJobInfo> {
        self.state
            .read()
            .await
            .recurring
            .iter()
            .map(|(id, definition)| RecurringJobInfo {
                id: id.clone(),
                cron_expression: definition.cron_expression.clone(),
                next_run: definition.next_run,
                last_job_id: definition.last_job_id.clone(),
            })
            .collect()
    }

    pub async fn stats(&self) -> SubstrateStats {
        let state = self.state.read().await;
        let mut stats = SubstrateStats {
            recurring: state.recurring.len(),
            ..SubstrateStats::default()
        };
        for record in state.jobs.values() {
            let counter = match record.state {
                JobState::Enqueued => &mut stats.enqueued,
                JobState::Scheduled => &mut stats.scheduled,
                JobState::Awaiting => &mut stats.awaiting,
                JobState::Processing => &mut stats.processing,
                JobState::Succeeded => &mut stats.succeeded,
                JobState::Failed => &mut stats.failed,
                JobState::Deleted => &mut stats.deleted,
            };
            *counter += 1;
        }
        stats
    }
}

#[async_trait]
impl JobSubstrate for InMemorySubstrate {
    async fn enqueue(&self, callback: JobCallback) -> SubstrateResult<JobId> {
        let now = Utc::now();
        let description = callback.to_string();
        let job_id = self
            .state
            .write()
            .await
            .insert_job(callback, JobState::Enqueued, None, Some(now), now);

        info!("Enqueued job {} ({})", job_id, description);
        Ok(job_id)
    }

    async fn schedule_at(
        &self,
        callback: JobCallback,
        run_at: DateTime<Utc>,
    ) -> SubstrateResult<JobId> {
        let now = Utc::now();
        let description = callback.to_string();
        let job_id = self.state.write().await.insert_job(
            callback,
            JobState::Scheduled,
            Some(format!("Scheduled for {}", run_at.format("%Y-%m-%d %H:%M:%S UTC"))),
            Some(run_at),
            now,
        );

        info!(
            "Scheduled job {} ({}) for {}",
            job_id,
            description,
            run_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        Ok(job_id)
    }

    async fn add_or_update_recurring(
        &self,
        recurring_id: &str,
        callback: JobCallback,
        cron_expression: &str,
    ) -> SubstrateResult<()> {
        let schedule = Schedule::from_str(cron_expression.trim()).map_err(|e| {
            SubstrateError::InvalidCronExpression {
                expression: cron_expression.to_string(),
                message: e.to_string(),
            }
        })?;
        let next_run = schedule.upcoming(Utc).next();

        let mut state = self.state.write().await;
        let last_job_id = state
            .recurring
            .get(recurring_id)
            .and_then(|existing| existing.last_job_id.clone());
        let replaced = state
            .recurring
            .insert(
                recurring_id.to_string(),
                RecurringDefinition {
                    callback,
                    cron_expression: cron_expression.trim().to_string(),
                    schedule,
                    next_run,
                    last_job_id,
                },
            )
            .is_some();

        info!(
            "{} recurring job '{}' ({}), next run {:?}",
            if replaced { "Updated" } else { "Registered" },
            recurring_id,
            cron_expression.trim(),
            next_run
        );
        Ok(())
    }

    async fn continue_with(
        &self,
        parent: &JobId,
        callback: JobCallback,
        condition: ContinuationCondition,
    ) -> SubstrateResult<JobId> {
        let now = Utc::now();
        let mut state = self.state.write().await;

        let parent_state = state
            .jobs
            .get(parent)
            .map(|record| record.state)
            .ok_or_else(|| SubstrateError::JobNotFound {
                job_id: parent.clone(),
            })?;

        let job_id = if !parent_state.is_terminal() {
            let job_id = state.insert_job(
                callback,
                JobState::Awaiting,
                Some(format!("Awaiting job {parent} ({condition})")),
                None,
                now,
            );
            if let Some(record) = state.jobs.get_mut(parent) {
                record.continuations.push((job_id.clone(), condition));
            }
            job_id
        } else if condition.is_satisfied_by(parent_state) {
            state.insert_job(
                callback,
                JobState::Enqueued,
                Some(format!("Parent job {parent} already {parent_state}")),
                Some(now),
                now,
            )
        } else {
            state.insert_job(
                callback,
                JobState::Deleted,
                Some(unmet_condition(parent, parent_state, condition)),
                None,
                now,
            )
        };

        debug!(
            "Added continuation {} of job {} ({})",
            job_id, parent, condition
        );
        Ok(job_id)
    }

    async fn delete(&self, job_id: &JobId) -> SubstrateResult<bool> {
        let now = Utc::now();
        let mut state = self.state.write().await;

        let Some(record) = state.jobs.get_mut(job_id) else {
            return Ok(false);
        };
        if record.state == JobState::Deleted {
            return Ok(false);
        }

        let previous = record.state;
        record.transition(JobState::Deleted, Some("Deleted by request".to_string()), now);
        state.settle_continuations(job_id, JobState::Deleted, now);

        info!("Deleted job {} (was {})", job_id, previous);
        Ok(true)
    }

    async fn remove_recurring(&self, recurring_id: &str) -> SubstrateResult<bool> {
        let removed = self
            .state
            .write()
            .await
            .recurring
            .remove(recurring_id)
            .is_some();
        if removed {
            info!("Removed recurring job '{}'", recurring_id);
        }
        Ok(removed)
    }

    async fn job_details(&self, job_id: &JobId) -> SubstrateResult<Option<JobDetails>> {
        Ok(self
            .state
            .read()
            .await
            .jobs
            .get(job_id)
            .map(JobRecord::details))
    }
}
