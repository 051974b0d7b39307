//! Handlers for every task the API, the scheduler and other tasks enqueue.

use http::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::TaskError;

pub mod action;
pub mod cohort;
pub mod definitions;
pub mod email;
pub mod identify;
pub mod process_event;
pub mod retention;
pub mod status_report;
pub mod update_cache;
pub mod webhooks;

pub const CALCULATE_ACTION: &str = "calculate_action";
pub const CALCULATE_COHORT: &str = "calculate_cohort";
pub const CALCULATE_EVENT_PROPERTY_USAGE: &str = "calculate_event_property_usage";
pub const EMAIL: &str = "email";
pub const PROCESS_EVENT: &str = "process_event";
pub const SESSION_RECORDING_RETENTION: &str = "session_recording_retention";
pub const STATUS_REPORT: &str = "status_report";
pub const SYNC_EVENT_AND_PROPERTIES_DEFINITIONS: &str = "sync_event_and_properties_definitions";
pub const UPDATE_CACHE: &str = "update_cache";
pub const USER_IDENTIFY: &str = "user_identify";
pub const WEBHOOKS: &str = "webhooks";

pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, TaskError> {
    Ok(serde_json::from_value(args)?)
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// POSTs `payload` as JSON. Connection errors, 429 and 5XX responses can be retried,
/// any other error status cannot.
pub(crate) async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    payload: &T,
) -> Result<(), TaskError> {
    let response = client
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(TaskError::RetryableRequest)?;

    match response.error_for_status() {
        Ok(_) => Ok(()),
        Err(error) => match error.status() {
            Some(status) if !is_retryable_status(status) => {
                Err(TaskError::NonRetryableRequest(error))
            }
            _ => Err(TaskError::RetryableRequest(error)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_status() {
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
