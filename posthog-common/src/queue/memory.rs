use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{Job, JobQueue, JobStatus, NewJob, QueueError, QueueResult};

/// In-process `JobQueue`, clones share the same jobs.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    jobs: Arc<Mutex<Vec<Job>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every job ever enqueued, in enqueue order.
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }

    /// Names of the tasks enqueued so far, in enqueue order.
    pub fn task_names(&self) -> Vec<String> {
        self.jobs().into_iter().map(|j| j.task).collect()
    }

    fn update<F>(&self, job_id: i64, f: F) -> QueueResult<()>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.lock().map_err(|_| QueueError::Unavailable)?;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;
        f(job);
        Ok(())
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: NewJob) -> QueueResult<i64> {
        let mut jobs = self.jobs.lock().map_err(|_| QueueError::Unavailable)?;
        let now = Utc::now();
        let id = jobs.len() as i64 + 1;
        jobs.push(Job {
            id,
            queue: "memory".to_owned(),
            task: job.task,
            args: job.args,
            status: JobStatus::Available,
            attempt: 0,
            max_attempts: job.max_attempts,
            last_error: None,
            scheduled_at: job.scheduled_at.unwrap_or(now),
            created_at: now,
            started_at: None,
            finished_at: None,
        });
        Ok(id)
    }

    async fn dequeue(&self) -> QueueResult<Option<Job>> {
        let mut jobs = self.jobs.lock().map_err(|_| QueueError::Unavailable)?;
        let now = Utc::now();
        let next = jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Available && j.scheduled_at <= now)
            .min_by_key(|j| (j.scheduled_at, j.id));

        Ok(next.map(|job| {
            job.status = JobStatus::Running;
            job.attempt += 1;
            job.started_at = Some(now);
            job.clone()
        }))
    }

    async fn complete(&self, job_id: i64) -> QueueResult<()> {
        self.update(job_id, |job| {
            job.status = JobStatus::Completed;
            job.finished_at = Some(Utc::now());
        })
    }

    async fn retry(&self, job_id: i64, delay: Duration, error: &str) -> QueueResult<()> {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        self.update(job_id, |job| {
            job.status = JobStatus::Available;
            job.scheduled_at = Utc::now() + delay;
            job.last_error = Some(error.to_owned());
        })
    }

    async fn fail(&self, job_id: i64, error: &str) -> QueueResult<()> {
        self.update(job_id, |job| {
            job.status = JobStatus::Failed;
            job.finished_at = Some(Utc::now());
            job.last_error = Some(error.to_owned());
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_can_enqueue_and_dequeue_job() {
        let queue = MemoryQueue::new();
        queue
            .enqueue(NewJob::new("calculate_action", json!({"action_id": 1})))
            .await
            .unwrap();

        let job = queue.dequeue().await.unwrap().unwrap();

        assert_eq!(job.attempt, 1);
        assert_eq!(job.task, "calculate_action");
        assert_eq!(job.args, json!({"action_id": 1}));
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.finished_at, None);
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retried_job_waits_for_its_delay() {
        let queue = MemoryQueue::new();
        let id = queue
            .enqueue(NewJob::new("email", json!({})))
            .await
            .unwrap();
        queue.dequeue().await.unwrap().unwrap();

        queue
            .retry(id, Duration::from_secs(60), "relay down")
            .await
            .unwrap();
        assert!(queue.dequeue().await.unwrap().is_none());

        queue.retry(id, Duration::ZERO, "relay down").await.unwrap();
        let job = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job.attempt, 2);
        assert_eq!(job.last_error.as_deref(), Some("relay down"));
    }

    #[tokio::test]
    async fn test_finished_jobs_are_not_dequeued() {
        let queue = MemoryQueue::new();
        let completed = queue.enqueue(NewJob::new("a", json!({}))).await.unwrap();
        let failed = queue.enqueue(NewJob::new("b", json!({}))).await.unwrap();
        queue.dequeue().await.unwrap();
        queue.dequeue().await.unwrap();

        queue.complete(completed).await.unwrap();
        queue.fail(failed, "unknown task").await.unwrap();

        let statuses: Vec<JobStatus> = queue.jobs().into_iter().map(|j| j.status).collect();
        assert_eq!(statuses, vec![JobStatus::Completed, JobStatus::Failed]);
        assert!(matches!(
            queue.complete(42).await,
            Err(QueueError::JobNotFound(42))
        ));
    }
}
