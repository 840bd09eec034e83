//! Execution results and job status views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::identifiers::JobId;

/// Outcome of one external process run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub execution_time_ms: u64,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionResult {
    /// Build the result for a process that exited on its own
    pub fn from_exit(
        exit_code: Option<i32>,
        elapsed: Duration,
        stdout_lines: Vec<String>,
        stderr_lines: Vec<String>,
    ) -> Self {
        let success = exit_code == Some(0);
        let error_message = if success {
            None
        } else {
            let summary = match exit_code {
                Some(code) => format!("Process exited with code {code}"),
                None => "Process terminated by signal".to_string(),
            };
            Some(match stderr_lines.last() {
                Some(last) => format!("{summary}: {last}"),
                None => summary,
            })
        };

        Self {
            exit_code,
            execution_time_ms: millis(elapsed),
            stdout_lines,
            stderr_lines,
            success,
            error_message,
        }
    }

    /// Build the result for a process killed after exceeding `timeout`
    pub fn timed_out(
        timeout: Duration,
        elapsed: Duration,
        stdout_lines: Vec<String>,
        stderr_lines: Vec<String>,
    ) -> Self {
        Self {
            exit_code: None,
            execution_time_ms: millis(elapsed),
            stdout_lines,
            stderr_lines,
            success: false,
            error_message: Some(format!(
                "Process exceeded timeout of {} and was terminated",
                humantime::format_duration(timeout)
            )),
        }
    }
}

pub(crate) fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Status reported when the substrate has no record of the job
pub const STATUS_NOT_FOUND: &str = "NotFound";
/// Status reported when the job exists but carries no history
pub const STATUS_UNKNOWN: &str = "Unknown";
/// Status reported when the substrate could not be queried
pub const STATUS_ERROR: &str = "Error";

/// Client-facing view of a job, recomputed on every query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobStatusView {
    pub fn not_found(job_id: JobId) -> Self {
        Self {
            job_id,
            status: STATUS_NOT_FOUND.to_string(),
            created_at: None,
            error_message: None,
        }
    }

    pub fn error(job_id: JobId, message: impl Into<String>) -> Self {
        Self {
            job_id,
            status: STATUS_ERROR.to_string(),
            created_at: None,
            error_message: Some(message.into()),
        }
    }
}
