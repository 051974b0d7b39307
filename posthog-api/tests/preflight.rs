use assert_json_diff::assert_json_include;
use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use posthog_api::api::preflight::{PLUGIN_SERVER_PING_KEY, WORKER_HEARTBEAT_KEY};
use posthog_api::config::{InstanceSettings, PrimaryDb};
use posthog_common::models::License;
use posthog_common::redis::Client;
use posthog_common::store::Store;
use serde_json::json;

mod common;
use common::TestApp;

#[tokio::test]
async fn test_preflight_for_anonymous_callers() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(Method::GET, "/_preflight/", None, false)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "django": true,
            "redis": true,
            "plugins": false,
            "celery": false,
            "db": true,
            "initiated": true,
            "cloud": false,
            "available_social_auth_providers": {
                "google-oauth2": false,
                "github": false,
                "gitlab": false,
            },
        })
    );
}

#[tokio::test]
async fn test_preflight_reports_background_services() {
    let app = TestApp::new().await;
    app.redis
        .set(
            WORKER_HEARTBEAT_KEY.to_string(),
            Utc::now().timestamp().to_string(),
        )
        .await
        .unwrap();
    app.redis
        .set(PLUGIN_SERVER_PING_KEY.to_string(), Utc::now().to_rfc3339())
        .await
        .unwrap();

    let (_, body) = app.get("/_preflight/").await;
    assert_eq!(body["celery"], json!(true));
    assert_eq!(body["plugins"], json!(true));

    app.redis
        .set(
            WORKER_HEARTBEAT_KEY.to_string(),
            (Utc::now() - Duration::minutes(10)).timestamp().to_string(),
        )
        .await
        .unwrap();
    let (_, body) = app.get("/_preflight/").await;
    assert_eq!(body["celery"], json!(false));
}

#[tokio::test]
async fn test_preflight_with_unavailable_dependencies() {
    let app = TestApp::new().await;
    app.store.set_unavailable(true);
    app.redis.set_unavailable(true);

    let (status, body) = app
        .request(Method::GET, "/_preflight/", None, false)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["django"], json!(true));
    assert_eq!(body["db"], json!(false));
    assert_eq!(body["redis"], json!(false));
    assert_eq!(body["celery"], json!(false));
}

#[tokio::test]
async fn test_preflight_for_authenticated_callers() {
    let mut settings = InstanceSettings::default_for_test();
    settings.ee_available = true;
    settings.primary_db = PrimaryDb::Clickhouse;
    settings.multi_tenancy = true;
    settings.github_key = Some("key".to_string());
    settings.github_secret = Some("secret".to_string());
    let app = TestApp::with_settings(settings).await;

    let (status, body) = app.get("/_preflight/").await;

    assert_eq!(status, StatusCode::OK);
    assert_json_include!(
        actual: body.clone(),
        expected: json!({
            "django": true,
            "db": true,
            "initiated": true,
            "cloud": true,
            "available_social_auth_providers": {
                "google-oauth2": false,
                "github": true,
                "gitlab": false,
            },
            "ee_available": true,
            "ee_enabled": true,
            "db_backend": "clickhouse",
            "opt_out_capture": false,
            "posthog_version": env!("CARGO_PKG_VERSION"),
            "email_service_available": false,
            "is_debug": false,
            "is_event_property_usage_enabled": false,
            "licensed_users_available": null,
        })
    );

    let timezones = &body["available_timezones"];
    assert_eq!(timezones["UTC"], json!(0));
    assert_eq!(timezones["Europe/Moscow"], json!(3));
    assert_eq!(timezones["Asia/Kolkata"], json!(5.5));
}

#[tokio::test]
async fn test_licensed_users_available_counts_invites() {
    let app = TestApp::new().await;
    app.store
        .create_license(License {
            key: "key_123".to_string(),
            plan: "enterprise".to_string(),
            valid_until: Utc::now() + Duration::days(30),
            max_users: Some(3),
        })
        .await
        .unwrap();
    app.store
        .create_invite(app.organization.id, "invitee@posthog.com")
        .await
        .unwrap();

    let (_, body) = app.get("/_preflight/").await;
    assert_eq!(body["licensed_users_available"], json!(1));

    for email in ["a@posthog.com", "b@posthog.com", "c@posthog.com"] {
        app.store
            .create_invite(app.organization.id, email)
            .await
            .unwrap();
    }
    let (_, body) = app.get("/_preflight/").await;
    assert_eq!(body["licensed_users_available"], json!(0));
}

#[tokio::test]
async fn test_instance_with_only_inactive_users_is_initiated() {
    let app = TestApp::new().await;
    app.store.set_user_active(app.user.id, false).await.unwrap();
    assert_eq!(app.store.count_users().await.unwrap(), 0);

    let (status, body) = app
        .request(Method::GET, "/_preflight/", None, false)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["initiated"], json!(true));
}
