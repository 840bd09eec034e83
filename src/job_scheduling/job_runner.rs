//! Job runner service for executing ready jobs

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, Semaphore};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::job_handler::JobHandler;
use super::memory_substrate::{ClaimedJob, InMemorySubstrate};
use crate::config::RunnerConfig;
use crate::errors::AppResult;

/// Service responsible for executing jobs from the in-memory substrate
pub struct JobRunner<H: JobHandler> {
    substrate: Arc<InMemorySubstrate>,
    handler: Arc<H>,
    slots: Arc<Semaphore>,
    finished: Arc<Notify>,
    config: RunnerConfig,
}

impl<H: JobHandler> JobRunner<H> {
    pub fn new(substrate: Arc<InMemorySubstrate>, handler: Arc<H>, config: RunnerConfig) -> Self {
        let max_concurrent = config.max_concurrent_jobs.max(1);
        Self {
            substrate,
            handler,
            slots: Arc::new(Semaphore::new(max_concurrent)),
            finished: Arc::new(Notify::new()),
            config: RunnerConfig {
                max_concurrent_jobs: max_concurrent,
                ..config
            },
        }
    }

    /// Number of jobs currently executing
    pub fn running_count(&self) -> usize {
        self.config.max_concurrent_jobs - self.slots.available_permits()
    }

    /// Run until cancelled, then wait up to the shutdown grace for running jobs
    pub async fn run(&self, cancellation_token: CancellationToken) -> AppResult<()> {
        info!(
            "Starting job runner (max concurrent: {}, poll interval: {})",
            self.config.max_concurrent_jobs,
            humantime::format_duration(self.config.poll_interval)
        );
        let mut ready_check = interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = ready_check.tick() => {
                    self.process_ready_jobs().await;
                }
                _ = cancellation_token.cancelled() => {
                    info!("Job runner received cancellation signal");
                    self.wait_for_running_jobs_to_complete().await;
                    break;
                }
            }
        }

        info!("Job runner stopped");
        Ok(())
    }

    /// Drive every ready job, and everything it releases, to completion.
    ///
    /// Returns once nothing is running and nothing is ready. Jobs scheduled for
    /// the future are left alone.
    pub async fn run_until_idle(&self) -> usize {
        let mut started = 0;

        loop {
            // Sampled before claiming: a job finishing in between has already
            // released its continuations by the time its slot frees up.
            let running_before = self.running_count();
            let claimed = self.process_ready_jobs().await;
            started += claimed;

            if claimed == 0 {
                if running_before == 0 {
                    break;
                }
                self.finished.notified().await;
            }
        }

        debug!("Job runner idle after starting {} jobs", started);
        started
    }

    /// Claim as many ready jobs as there are free slots and start them
    async fn process_ready_jobs(&self) -> usize {
        let now = Utc::now();
        let triggered = self.substrate.trigger_due_recurring(now).await;
        if !triggered.is_empty() {
            debug!("Recurring definitions enqueued {} jobs", triggered.len());
        }
        self.purge_expired_jobs(now).await;

        let available_slots = self.slots.available_permits();
        if available_slots == 0 {
            debug!(
                "At maximum concurrent jobs ({}), waiting",
                self.config.max_concurrent_jobs
            );
            return 0;
        }

        let jobs = self.substrate.claim_ready(now, available_slots).await;
        let claimed = jobs.len();
        for job in jobs {
            self.spawn_job(job).await;
        }
        claimed
    }

    async fn purge_expired_jobs(&self, now: DateTime<Utc>) {
        let Some(cutoff) = chrono::Duration::from_std(self.config.job_retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
        else {
            return;
        };

        let purged = self.substrate.purge_finished(cutoff).await;
        if purged > 0 {
            debug!(
                "Dropped {} jobs finished more than {} ago",
                purged,
                humantime::format_duration(self.config.job_retention)
            );
        }
    }

    async fn spawn_job(&self, job: ClaimedJob) {
        let permit = match self.slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("Job slot pool closed, cannot start job {}: {}", job.job_id, e);
                return;
            }
        };

        let substrate = self.substrate.clone();
        let handler = self.handler.clone();
        let finished = self.finished.clone();

        tokio::spawn(async move {
            let ClaimedJob { job_id, callback } = job;
            info!("Starting job {} ({})", job_id, callback);

            let start_time = Instant::now();
            let outcome = handler.handle(&job_id, &callback).await;
            let duration = start_time.elapsed();

            match &outcome {
                Ok(_) => info!("Job {} completed successfully in {:?}", job_id, duration),
                Err(failure) => error!("Job {} failed after {:?}: {}", job_id, duration, failure),
            }

            substrate.complete(&job_id, outcome).await;
            drop(permit);
            finished.notify_one();
        });
    }

    /// Wait for all running jobs to complete during shutdown
    async fn wait_for_running_jobs_to_complete(&self) {
        let running = self.running_count();
        if running == 0 {
            return;
        }
        info!(
            "Waiting up to {} for {} running jobs to complete...",
            humantime::format_duration(self.config.shutdown_grace),
            running
        );

        let all_slots = u32::try_from(self.config.max_concurrent_jobs).unwrap_or(u32::MAX);
        match tokio::time::timeout(self.config.shutdown_grace, self.slots.acquire_many(all_slots))
            .await
        {
            Ok(Ok(_permits)) => info!("All jobs completed"),
            Ok(Err(e)) => warn!("Job slot pool closed during shutdown: {}", e),
            Err(_) => {
                let stats = self.substrate.stats().await;
                warn!(
                    "Timeout waiting for {} jobs to complete, proceeding with shutdown ({:?})",
                    self.running_count(),
                    stats
                );
            }
        }
    }
}
