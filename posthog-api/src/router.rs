use std::future::ready;
use std::sync::Arc;

use axum::{
    http::{Method, StatusCode},
    routing::{get, patch},
    Router,
};
use posthog_common::health::HealthRegistry;
use posthog_common::metrics::setup_metrics_routes;
use posthog_common::queue::JobQueue;
use posthog_common::redis::Client as RedisClient;
use posthog_common::store::Store;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::api::{demo, preflight, projects};
use crate::config::InstanceSettings;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store + Send + Sync>,
    pub redis: Arc<dyn RedisClient + Send + Sync>,
    pub queue: Arc<dyn JobQueue + Send + Sync>,
    pub settings: Arc<InstanceSettings>,
}

impl AppState {
    pub fn new<S, R, Q>(
        store: Arc<S>,
        redis: Arc<R>,
        queue: Arc<Q>,
        settings: InstanceSettings,
    ) -> Self
    where
        S: Store + Send + Sync + 'static,
        R: RedisClient + Send + Sync + 'static,
        Q: JobQueue + Send + Sync + 'static,
    {
        Self {
            store,
            redis,
            queue,
            settings: Arc::new(settings),
        }
    }
}

pub fn router(state: AppState, liveness: HealthRegistry, enable_metrics: bool) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    let status_router = Router::new()
        .route("/_readiness", get(|| ready(StatusCode::OK)))
        .route("/_liveness", get(move || ready(liveness.get_status())));

    let api_router = Router::new()
        .route("/_preflight/", get(preflight::preflight))
        .route(
            "/api/projects/",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/:id/",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/api/projects/:id/reset_token/", patch(projects::reset_token))
        .route("/demo/", get(demo::demo))
        .route(
            "/delete_demo_data/",
            get(demo::delete_demo_data).post(demo::delete_demo_data),
        )
        .with_state(state);

    let router = Router::new()
        .merge(status_router)
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // The prometheus recorder is global and can only be installed once per process.
    if !enable_metrics {
        return router;
    }
    match setup_metrics_routes(router.clone(), "posthog-api") {
        Ok(router) => router,
        Err(e) => {
            warn!("failed to install the metrics recorder: {}", e);
            router
        }
    }
}
