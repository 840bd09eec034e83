//! Centralized error handling for the workload orchestrator
//!
//! Each layer owns a `thiserror` enum and `AppError` unifies them for callers
//! that only need to report a failure.
//!
//! # Error Categories
//!
//! - **Execution Errors**: launching, monitoring and timing out external workloads
//! - **Request Errors**: validation of submissions before anything is enqueued
//! - **Substrate Errors**: failures reported by the job queue/scheduler
//! - **Pipeline Errors**: compilation of a pipeline into chained jobs
//!
//! # Usage
//!
//! ```rust
//! use workload_orchestrator::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::configuration("executor.timeout must be greater than zero"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for substrate Results
pub type SubstrateResult<T> = Result<T, SubstrateError>;
