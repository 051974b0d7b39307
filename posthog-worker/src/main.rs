//! Consume `PgQueue` jobs and run the task registered for each of them.
use std::future::ready;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use envconfig::Envconfig;
use posthog_common::health::HealthRegistry;
use posthog_common::metrics::setup_metrics_routes;
use posthog_common::queue::PgQueue;
use posthog_common::redis::RedisClient;
use posthog_common::retry::RetryPolicy;
use posthog_common::store::{get_pool, PgStore, StoreError};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use posthog_worker::config::Config;
use posthog_worker::context::TaskContext;
use posthog_worker::error::WorkerError;
use posthog_worker::registry::TaskRegistry;
use posthog_worker::scheduler::{default_schedules, Scheduler};
use posthog_worker::worker::{run_heartbeat, Worker};

async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, router).await
}

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let retry_policy = RetryPolicy::new(
        config.retry_policy.backoff_coefficient,
        config.retry_policy.initial_interval.0,
        Some(config.retry_policy.maximum_interval.0),
    );

    let pool = get_pool(&config.database_url, config.max_pg_connections)
        .await
        .map_err(StoreError::ConnectionError)?;
    let store = Arc::new(PgStore::new(pool.clone()));
    let queue = Arc::new(PgQueue::new(config.queue_name.as_str(), pool));
    let redis = Arc::new(RedisClient::new(config.redis_url.clone())?);

    let liveness = HealthRegistry::new();
    let worker_liveness = liveness.register("worker", Duration::from_secs(60));

    let context = TaskContext::new(
        store.clone(),
        queue.clone(),
        config.tasks.clone(),
        config.request_timeout.0,
    )?;
    let worker = Worker::new(
        queue.clone(),
        TaskRegistry::default_tasks()?,
        context,
        config.poll_interval.0,
        config.max_concurrent_jobs,
        retry_policy,
        worker_liveness,
    );

    let bind = config.bind();
    tokio::task::spawn(async move {
        let router = Router::new()
            .route("/", get(|| async { "posthog worker" }))
            .route("/_liveness", get(move || ready(liveness.get_status())));
        let router = match setup_metrics_routes(router.clone(), "posthog-worker") {
            Ok(router) => router,
            Err(e) => {
                tracing::warn!("failed to install the metrics recorder: {}", e);
                router
            }
        };
        if let Err(e) = serve(router, &bind).await {
            tracing::error!("failed to serve liveness and metrics: {}", e);
        }
    });

    tokio::task::spawn(run_heartbeat(redis, config.heartbeat_interval.0));

    if config.run_scheduler {
        let scheduler = Scheduler::new(store, queue, default_schedules());
        tokio::task::spawn(scheduler.run());
    }

    worker.run().await?;

    Ok(())
}
