#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use posthog_api::config::InstanceSettings;
use posthog_api::router::{router, AppState};
use posthog_common::health::HealthRegistry;
use posthog_common::models::{NewTeam, NewUser, Organization, Team, User};
use posthog_common::queue::MemoryQueue;
use posthog_common::redis::MockRedisClient;
use posthog_common::store::{MemoryStore, Store};
use serde_json::Value;
use tower::ServiceExt;

pub const API_KEY: &str = "phx_test_personal_api_key";

pub struct TestApp {
    pub store: MemoryStore,
    pub redis: MockRedisClient,
    pub queue: MemoryQueue,
    pub router: Router,
    pub organization: Organization,
    pub team: Team,
    pub user: User,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_settings(InstanceSettings::default_for_test()).await
    }

    pub async fn with_settings(settings: InstanceSettings) -> Self {
        let store = MemoryStore::new();
        let redis = MockRedisClient::new();
        let queue = MemoryQueue::new();

        let organization = store.create_organization("Hedgehogs").await.unwrap();
        let team = store
            .create_team(NewTeam::new(organization.id, "Default Project"))
            .await
            .unwrap();
        let user = store
            .create_user(NewUser {
                email: "hedgehog@posthog.com".to_string(),
                first_name: "Hedge".to_string(),
                personal_api_key: Some(API_KEY.to_string()),
                current_organization_id: Some(organization.id),
                current_team_id: Some(team.id),
            })
            .await
            .unwrap();

        let state = AppState::new(
            Arc::new(store.clone()),
            Arc::new(redis.clone()),
            Arc::new(queue.clone()),
            settings,
        );
        let router = router(state, HealthRegistry::new(), false);

        TestApp {
            store,
            redis,
            queue,
            router,
            organization,
            team,
            user,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        authenticated: bool,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "testserver");
        if authenticated {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {API_KEY}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, true).await
    }
}
