use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

mod memory;
mod postgres;

pub use memory::MemoryQueue;
pub use postgres::PgQueue;

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("{0} is not a valid JobStatus")]
    ParseJobStatusError(String),
    #[error("job {0} not found")]
    JobNotFound(i64),
    #[error("queue is unavailable")]
    Unavailable,
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Available: waiting to be picked up, possibly not before `scheduled_at`.
/// Running: picked up by a worker.
/// Completed and Failed are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "job_status")]
#[sqlx(rename_all = "lowercase")]
pub enum JobStatus {
    Available,
    Completed,
    Failed,
    Running,
}

impl FromStr for JobStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(JobStatus::Available),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "running" => Ok(JobStatus::Running),
            invalid => Err(QueueError::ParseJobStatusError(invalid.to_owned())),
        }
    }
}

/// A task invocation as stored in the queue.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub queue: String,
    pub task: String,
    pub args: Value,
    pub status: JobStatus,
    /// Incremented on every dequeue, so it is 1 during the first run.
    pub attempt: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub task: String,
    pub args: Value,
    pub max_attempts: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewJob {
    pub fn new(task: &str, args: Value) -> Self {
        Self {
            task: task.to_owned(),
            args,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            scheduled_at: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Durable hand-off between the producers of background work and the worker.
#[async_trait]
pub trait JobQueue {
    /// Adds a job, returns its id.
    async fn enqueue(&self, job: NewJob) -> QueueResult<i64>;
    /// Takes the oldest available job that is due, marking it as running.
    async fn dequeue(&self) -> QueueResult<Option<Job>>;
    async fn complete(&self, job_id: i64) -> QueueResult<()>;
    /// Puts a running job back as available, not to run before `delay` elapsed.
    async fn retry(&self, job_id: i64, delay: Duration, error: &str) -> QueueResult<()>;
    async fn fail(&self, job_id: i64, error: &str) -> QueueResult<()>;
}
