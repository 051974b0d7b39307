use posthog_common::queue::QueueError;
use posthog_common::redis::RedisError;
use posthog_common::store::StoreError;
use thiserror::Error;

/// Why a task did not complete.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("request could not be delivered but could be retried later: {0}")]
    RetryableRequest(reqwest::Error),
    #[error("request could not be delivered and cannot be retried: {0}")]
    NonRetryableRequest(reqwest::Error),
}

impl TaskError {
    /// Whether running the same job again could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::Store(_) | TaskError::Queue(_) | TaskError::RetryableRequest(_)
        )
    }
}

/// Errors stopping the worker itself, as opposed to a single job.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("a queue error occurred when executing a job: {0}")]
    QueueError(#[from] QueueError),
    #[error("task {0} is registered twice")]
    DuplicateTask(String),
    #[error("failed to connect to the database: {0}")]
    StoreError(#[from] StoreError),
    #[error("failed to create the redis client: {0}")]
    RedisError(#[from] RedisError),
    #[error("failed to build the http client: {0}")]
    HttpClientError(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retried() {
        assert!(TaskError::Store(StoreError::Unavailable).is_retryable());
        assert!(TaskError::Queue(QueueError::Unavailable).is_retryable());
        assert!(!TaskError::NotFound("action 1".to_string()).is_retryable());

        let parse_error = serde_json::from_str::<i64>("nope").unwrap_err();
        assert!(!TaskError::InvalidArgs(parse_error).is_retryable());
    }
}
