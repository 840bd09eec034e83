//! Maps substrate job history onto [`JobStatusView`]

use std::sync::Arc;

use tracing::warn;

use super::substrate::JobSubstrate;
use super::types::JobDetails;
use crate::errors::SubstrateResult;
use crate::models::{JobId, JobStatusView, STATUS_UNKNOWN};

/// Read-only status lookups; never fails, degrades to a status string instead
pub struct JobStatusTranslator<S: JobSubstrate> {
    substrate: Arc<S>,
}

impl<S: JobSubstrate> JobStatusTranslator<S> {
    pub fn new(substrate: Arc<S>) -> Self {
        Self { substrate }
    }

    pub async fn status(&self, job_id: &JobId) -> JobStatusView {
        let details = self.substrate.job_details(job_id).await;
        if let Err(e) = &details {
            warn!("Failed to read status of job {}: {}", job_id, e);
        }
        translate(job_id.clone(), details)
    }
}

/// The most recent history entry wins; its reason becomes the error message
pub fn translate(job_id: JobId, details: SubstrateResult<Option<JobDetails>>) -> JobStatusView {
    match details {
        Err(e) => JobStatusView::error(job_id, e.to_string()),
        Ok(None) => JobStatusView::not_found(job_id),
        Ok(Some(details)) => match details.history.first() {
            None => JobStatusView {
                job_id,
                status: STATUS_UNKNOWN.to_string(),
                created_at: Some(details.created_at),
                error_message: None,
            },
            Some(latest) => JobStatusView {
                job_id,
                status: latest.state_name.clone(),
                created_at: Some(details.created_at),
                error_message: latest.reason.clone(),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SubstrateError;
    use crate::job_scheduling::types::{JobState, StateTransition};
    use crate::models::{STATUS_ERROR, STATUS_NOT_FOUND};
    use chrono::{Duration, Utc};

    #[test]
    fn test_missing_job_is_not_found() {
        let view = translate(JobId::from("nope"), Ok(None));
        assert_eq!(view.status, STATUS_NOT_FOUND);
        assert_eq!(view.created_at, None);
        assert_eq!(view.error_message, None);
    }

    #[test]
    fn test_empty_history_is_unknown() {
        let created_at = Utc::now();
        let view = translate(
            JobId::from("blank"),
            Ok(Some(JobDetails {
                created_at,
                history: Vec::new(),
                result: None,
            })),
        );
        assert_eq!(view.status, STATUS_UNKNOWN);
        assert_eq!(view.created_at, Some(created_at));
    }

    #[test]
    fn test_latest_entry_wins() {
        let created_at = Utc::now() - Duration::minutes(5);
        let view = translate(
            JobId::from("failed"),
            Ok(Some(JobDetails {
                created_at,
                history: vec![
                    StateTransition::new(
                        JobState::Failed,
                        Some("Process exited with code 2".to_string()),
                        Utc::now(),
                    ),
                    StateTransition::new(JobState::Processing, None, created_at),
                ],
                result: None,
            })),
        );
        assert_eq!(view.status, "Failed");
        assert_eq!(view.error_message.as_deref(), Some("Process exited with code 2"));
    }

    #[test]
    fn test_substrate_error_becomes_error_status() {
        let view = translate(
            JobId::from("x"),
            Err(SubstrateError::Unavailable {
                message: "connection refused".to_string(),
            }),
        );
        assert_eq!(view.status, STATUS_ERROR);
        assert!(view.error_message.unwrap().contains("connection refused"));
    }
}
