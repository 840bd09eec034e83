//! Job scheduling subsystem
//!
//! The system is built around these components:
//! - `JobSubstrate`: the queue/scheduler seam every submission goes through
//! - `InMemorySubstrate`: non-durable substrate with continuations and cron definitions
//! - `JobRunner`: claims ready jobs and runs them with bounded concurrency
//! - `JobHandler`: what a job does; `WorkloadJobHandler` runs the process executor
//! - `JobStatusTranslator`: substrate history to `JobStatusView`
//! - `OrchestrationApi`: validated submission, pipelines, status and deletion

pub mod api;
pub mod job_handler;
pub mod job_runner;
pub mod memory_substrate;
pub mod status_translator;
pub mod substrate;
pub mod types;

pub use api::{OrchestrationApi, PipelineReceipt, SubmissionReceipt};
pub use job_handler::{JobHandler, WorkloadJobHandler};
pub use job_runner::JobRunner;
pub use memory_substrate::{ClaimedJob, InMemorySubstrate, RecurringJobInfo, SubstrateStats};
pub use status_translator::JobStatusTranslator;
pub use substrate::JobSubstrate;
pub use types::*;
