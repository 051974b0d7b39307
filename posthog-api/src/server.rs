use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use posthog_common::health::HealthRegistry;
use posthog_common::queue::PgQueue;
use posthog_common::redis::RedisClient;
use posthog_common::store::{get_pool, PgStore};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::router::{self, AppState};

const LIVENESS_DEADLINE: Duration = Duration::from_secs(30);
const LIVENESS_INTERVAL: Duration = Duration::from_secs(10);

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let pool = get_pool(&config.database_url, config.max_pg_connections).await?;
    let store = Arc::new(PgStore::new(pool.clone()));
    if config.run_migrations {
        store.run_migrations().await?;
    }
    let queue = Arc::new(PgQueue::new(&config.queue_name, pool));
    let redis = Arc::new(RedisClient::new(config.redis_url.clone())?);

    let liveness = HealthRegistry::new();
    let health = liveness.register("api", LIVENESS_DEADLINE);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIVENESS_INTERVAL);
        loop {
            interval.tick().await;
            health.report_healthy();
        }
    });

    let state = AppState::new(store, redis, queue, config.instance);
    let app = router::router(state, liveness, config.enable_metrics);

    info!("listening on {:?}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
