//! Prometheus metrics shared by the API and the worker.
use std::time::Instant;

use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
    routing::get, Router,
};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Request handlers answer in milliseconds, the slowest ones seed demo data.
const HTTP_SECONDS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Background tasks range from a single insert to recomputing every action of a team.
const JOB_SECONDS: &[f64] = &[
    0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0,
];

pub const JOB_DURATION_METRIC: &str = "worker_jobs_processing_duration_seconds";

/// Requests to routes we don't serve share one label value.
const UNMATCHED_PATH: &str = "unmatched";

fn builder(service: &'static str) -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .add_global_label("service", service)
        .set_buckets(HTTP_SECONDS)?
        .set_buckets_for_metric(Matcher::Full(JOB_DURATION_METRIC.to_string()), JOB_SECONDS)
}

/// Installs the process-wide recorder, every metric gets a `service` label.
pub fn setup_metrics_recorder(service: &'static str) -> Result<PrometheusHandle, BuildError> {
    builder(service)?.install_recorder()
}

/// Adds a `/metrics` route rendering the recorder, and request tracking to every route.
pub fn setup_metrics_routes(router: Router, service: &'static str) -> Result<Router, BuildError> {
    let handle = setup_metrics_recorder(service)?;

    Ok(router
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .layer(axum::middleware::from_fn(track_metrics)))
}

fn path_label<B>(req: &Request<B>) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED_PATH.to_owned())
}

/// Request count and latency labelled by method, route and status.
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();
    let path = path_label(&req);
    let method = req.method().to_string();

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_requests_share_a_path_label() {
        let req = Request::builder()
            .uri("/api/projects/12345/")
            .body(())
            .unwrap();

        assert_eq!(path_label(&req), UNMATCHED_PATH);
    }

    #[test]
    fn test_job_durations_use_long_buckets() {
        let recorder = builder("posthog-worker").unwrap().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            metrics::histogram!(JOB_DURATION_METRIC, "task" => "update_cache").record(120.0);
            metrics::histogram!("http_requests_duration_seconds").record(0.02);
        });
        let rendered = handle.render();
        let buckets = |metric: &str| -> Vec<String> {
            rendered
                .lines()
                .filter(|line| line.starts_with(&format!("{metric}_bucket")))
                .map(str::to_owned)
                .collect()
        };

        let job_buckets = buckets(JOB_DURATION_METRIC);
        let http_buckets = buckets("http_requests_duration_seconds");
        assert!(!http_buckets.is_empty());
        assert!(job_buckets.iter().any(|line| line.contains(r#"le="900"#)));
        assert!(!http_buckets.iter().any(|line| line.contains(r#"le="900"#)));
        assert!(job_buckets
            .iter()
            .chain(&http_buckets)
            .all(|line| line.contains(r#"service="posthog-worker""#)));
    }
}
