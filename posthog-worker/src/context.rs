use std::sync::Arc;
use std::time::Duration;

use posthog_common::queue::JobQueue;
use posthog_common::store::Store;
use reqwest::header;

use crate::config::TaskSettings;

/// Everything a task handler may use. Shared by all concurrently running jobs.
#[derive(Clone)]
pub struct TaskContext {
    pub store: Arc<dyn Store + Send + Sync>,
    pub queue: Arc<dyn JobQueue + Send + Sync>,
    pub http: reqwest::Client,
    pub settings: TaskSettings,
}

impl TaskContext {
    pub fn new<S, Q>(
        store: Arc<S>,
        queue: Arc<Q>,
        settings: TaskSettings,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error>
    where
        S: Store + Send + Sync + 'static,
        Q: JobQueue + Send + Sync + 'static,
    {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("PostHog Worker")
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            store,
            queue,
            http,
            settings,
        })
    }
}
