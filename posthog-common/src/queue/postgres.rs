use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use super::{Job, JobQueue, JobStatus, NewJob, QueueError, QueueResult};

/// A queue implemented on top of the `job_queue` PostgreSQL table.
/// Several named queues can share the table.
#[derive(Clone)]
pub struct PgQueue {
    name: String,
    pool: PgPool,
}

fn query_error(command: &str) -> impl FnOnce(sqlx::Error) -> QueueError + '_ {
    move |error| QueueError::QueryError {
        command: command.to_owned(),
        error,
    }
}

impl PgQueue {
    pub fn new(name: &str, pool: PgPool) -> Self {
        Self {
            name: name.to_owned(),
            pool,
        }
    }

    async fn finish(&self, job_id: i64, status: JobStatus, error: Option<&str>) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
UPDATE job_queue
SET status = $2, finished_at = NOW(), last_error = COALESCE($3, last_error)
WHERE id = $1 AND queue = $4
            "#,
        )
        .bind(job_id)
        .bind(status)
        .bind(error)
        .bind(&self.name)
        .execute(&self.pool)
        .await
        .map_err(query_error("UPDATE"))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job_id));
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for PgQueue {
    async fn enqueue(&self, job: NewJob) -> QueueResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
INSERT INTO job_queue
    (queue, task, args, max_attempts, scheduled_at)
VALUES
    ($1, $2, $3, $4, COALESCE($5, NOW()))
RETURNING id
            "#,
        )
        .bind(&self.name)
        .bind(&job.task)
        .bind(&job.args)
        .bind(job.max_attempts)
        .bind(job.scheduled_at)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error("INSERT"))
    }

    async fn dequeue(&self) -> QueueResult<Option<Job>> {
        sqlx::query_as::<_, Job>(
            r#"
WITH available_in_queue AS (
    SELECT
        id
    FROM
        job_queue
    WHERE
        status = 'available'
        AND queue = $1
        AND scheduled_at <= NOW()
    ORDER BY
        scheduled_at, id
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
UPDATE
    job_queue
SET
    started_at = NOW(),
    status = 'running'::job_status,
    attempt = job_queue.attempt + 1
FROM
    available_in_queue
WHERE
    job_queue.id = available_in_queue.id
RETURNING
    job_queue.*
            "#,
        )
        .bind(&self.name)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error("UPDATE"))
    }

    async fn complete(&self, job_id: i64) -> QueueResult<()> {
        self.finish(job_id, JobStatus::Completed, None).await
    }

    async fn retry(&self, job_id: i64, delay: Duration, error: &str) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
UPDATE job_queue
SET
    status = 'available'::job_status,
    scheduled_at = NOW() + $2 * INTERVAL '1 millisecond',
    last_error = $3
WHERE id = $1 AND queue = $4
            "#,
        )
        .bind(job_id)
        .bind(delay.as_millis() as i64)
        .bind(error)
        .bind(&self.name)
        .execute(&self.pool)
        .await
        .map_err(query_error("UPDATE"))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound(job_id));
        }
        Ok(())
    }

    async fn fail(&self, job_id: i64, error: &str) -> QueueResult<()> {
        self.finish(job_id, JobStatus::Failed, Some(error)).await
    }
}
