use std::sync::Arc;
use std::time;

use chrono::Utc;
use posthog_common::health::HealthHandle;
use posthog_common::metrics::JOB_DURATION_METRIC;
use posthog_common::queue::{Job, JobQueue};
use posthog_common::redis::{Client as RedisClient, WORKER_HEARTBEAT_KEY};
use posthog_common::retry::RetryPolicy;
use tokio::sync;
use tracing::{error, info, warn};

use crate::context::TaskContext;
use crate::error::WorkerError;
use crate::registry::TaskRegistry;

/// What happened to a job once its handler returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retried,
    Failed,
}

/// Polls the queue and runs each job through the handler registered for its task name.
pub struct Worker {
    /// The queue we will be dequeuing jobs from.
    queue: Arc<dyn JobQueue + Send + Sync>,
    registry: Arc<TaskRegistry>,
    context: Arc<TaskContext>,
    /// The interval for polling the queue.
    poll_interval: time::Duration,
    /// Maximum number of concurrent jobs being processed.
    max_concurrent_jobs: usize,
    retry_policy: RetryPolicy,
    /// The liveness check handle, to call on a schedule to report healthy
    liveness: HealthHandle,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue + Send + Sync>,
        registry: TaskRegistry,
        context: TaskContext,
        poll_interval: time::Duration,
        max_concurrent_jobs: usize,
        retry_policy: RetryPolicy,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            queue,
            registry: Arc::new(registry),
            context: Arc::new(context),
            poll_interval,
            max_concurrent_jobs,
            retry_policy,
            liveness,
        }
    }

    /// Wait until a job becomes available in our queue.
    async fn wait_for_job(&self) -> Result<Job, WorkerError> {
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            interval.tick().await;
            self.liveness.report_healthy();

            if let Some(job) = self.queue.dequeue().await? {
                return Ok(job);
            }
        }
    }

    /// Run this worker to continuously process any jobs that become available.
    pub async fn run(&self) -> Result<(), WorkerError> {
        let semaphore = Arc::new(sync::Semaphore::new(self.max_concurrent_jobs));
        let report_semaphore_utilization = || {
            metrics::gauge!("worker_saturation_percent").set(
                1f64 - semaphore.available_permits() as f64 / self.max_concurrent_jobs as f64,
            );
        };

        info!(tasks = self.registry.len(), "worker started");
        loop {
            report_semaphore_utilization();
            let job = self.wait_for_job().await?;

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                return Ok(());
            };
            let queue = self.queue.clone();
            let registry = self.registry.clone();
            let context = self.context.clone();
            let retry_policy = self.retry_policy;

            tokio::spawn(async move {
                let result =
                    process_job(queue.as_ref(), &registry, &context, &retry_policy, job).await;
                drop(permit);
                if let Err(error) = result {
                    error!("failed to process job: {}", error);
                }
            });
        }
    }

    /// Processes the next due job inline, if any.
    pub async fn run_once(&self) -> Result<Option<JobOutcome>, WorkerError> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(None);
        };
        let outcome = process_job(
            self.queue.as_ref(),
            &self.registry,
            &self.context,
            &self.retry_policy,
            job,
        )
        .await?;
        Ok(Some(outcome))
    }
}

/// Runs a job and moves it to its next state: completed on success, back to the queue
/// with a backoff when the error is transient and attempts are left, failed otherwise.
/// Jobs for unknown tasks fail right away.
pub async fn process_job(
    queue: &(dyn JobQueue + Send + Sync),
    registry: &TaskRegistry,
    context: &TaskContext,
    retry_policy: &RetryPolicy,
    job: Job,
) -> Result<JobOutcome, WorkerError> {
    let labels = [("task", job.task.clone())];
    metrics::counter!("worker_jobs_total", &labels).increment(1);

    let Some(handler) = registry.get(&job.task) else {
        warn!(job_id = job.id, task = %job.task, "no handler registered for task");
        queue
            .fail(job.id, &format!("unknown task {}", job.task))
            .await?;
        metrics::counter!("worker_jobs_failed", &labels).increment(1);
        return Ok(JobOutcome::Failed);
    };

    let now = tokio::time::Instant::now();
    let result = handler.run(context, job.args.clone()).await;
    let elapsed = now.elapsed().as_secs_f64();
    metrics::histogram!(JOB_DURATION_METRIC, &labels).record(elapsed);

    match result {
        Ok(()) => {
            queue.complete(job.id).await?;
            metrics::counter!("worker_jobs_completed", &labels).increment(1);
            Ok(JobOutcome::Completed)
        }
        Err(error) if error.is_retryable() && job.has_attempts_left() => {
            let delay = retry_policy.backoff(job.attempt.max(1) as u32);
            warn!(
                job_id = job.id,
                task = %job.task,
                attempt = job.attempt,
                "job failed, retrying in {:?}: {}",
                delay,
                error
            );
            queue.retry(job.id, delay, &error.to_string()).await?;
            metrics::counter!("worker_jobs_retried", &labels).increment(1);
            Ok(JobOutcome::Retried)
        }
        Err(error) => {
            error!(job_id = job.id, task = %job.task, "job failed: {}", error);
            queue.fail(job.id, &error.to_string()).await?;
            metrics::counter!("worker_jobs_failed", &labels).increment(1);
            Ok(JobOutcome::Failed)
        }
    }
}

/// Writes the worker heartbeat the API reports in its preflight checks.
pub async fn write_heartbeat(redis: &(dyn RedisClient + Send + Sync)) {
    if let Err(e) = redis
        .set(
            WORKER_HEARTBEAT_KEY.to_string(),
            Utc::now().timestamp().to_string(),
        )
        .await
    {
        warn!("failed to write the worker heartbeat: {}", e);
    }
}

pub async fn run_heartbeat(
    redis: Arc<dyn RedisClient + Send + Sync>,
    interval: time::Duration,
) {
    let mut interval = tokio::time::interval(interval);
    loop {
        interval.tick().await;
        write_heartbeat(redis.as_ref()).await;
    }
}
