//! Cron utility functions
//!
//! Parsing is delegated to the `cron` crate, which expects six or seven fields
//! (seconds first, optional year last).

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use crate::errors::RequestError;

/// Parse a cron expression, reporting the expression back on failure
pub fn validate_cron_expression(cron_expression: &str) -> Result<Schedule, RequestError> {
    Schedule::from_str(cron_expression.trim()).map_err(|e| RequestError::InvalidCronExpression {
        expression: cron_expression.to_string(),
        message: e.to_string(),
    })
}

/// Calculate the next scheduled time from a cron expression
///
/// # Returns
/// * `Some(DateTime<Utc>)` - The next scheduled time if the expression is valid
/// * `None` - If the cron expression is invalid or has no future schedules
pub fn calculate_next_scheduled_time(cron_expression: &str) -> Option<DateTime<Utc>> {
    next_after(cron_expression, Utc::now())
}

/// Next occurrence strictly after `after`
pub fn next_after(cron_expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    validate_cron_expression(cron_expression)
        .ok()
        .and_then(|schedule| schedule.after(&after).next())
}
