use axum::http::{header::HOST, HeaderMap};

pub mod auth;
pub mod demo;
pub mod errors;
pub mod preflight;
pub mod projects;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Builds an absolute URL for `path` from the host the client used to reach us.
pub fn absolute_uri(headers: &HeaderMap, path: &str) -> String {
    let scheme = headers
        .get(FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}{path}")
}
