use axum::http::{Method, StatusCode};
use posthog_common::store::Store;
use serde_json::json;

mod common;
use common::TestApp;

#[tokio::test]
async fn test_demo_seeds_current_project() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/demo/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains(&app.team.api_token));

    let events = app.store.list_events(app.team.id, None).await.unwrap();
    assert_eq!(events.len(), 192);
    assert!(events
        .iter()
        .filter(|e| e.event == "$pageview")
        .all(|e| e.current_url().unwrap().starts_with("http://testserver/demo/")));

    let team = app.store.get_team(app.team.id).await.unwrap().unwrap();
    assert!(team.event_names.contains(&"$pageview".to_string()));
    assert_eq!(team.event_properties_numerical, vec!["purchase".to_string()]);

    assert_eq!(
        app.queue.task_names(),
        vec!["calculate_event_property_usage".to_string()]
    );
    assert_eq!(app.queue.jobs()[0].args, json!({"team_id": app.team.id}));
}

#[tokio::test]
async fn test_demo_twice_seeds_once() {
    let app = TestApp::new().await;

    app.get("/demo/").await;
    let (status, _) = app.get("/demo/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.store.list_persons(app.team.id).await.unwrap().len(), 100);
    assert_eq!(
        app.store.list_events(app.team.id, None).await.unwrap().len(),
        192
    );
}

#[tokio::test]
async fn test_demo_requires_authentication() {
    let app = TestApp::new().await;

    let (status, _) = app.request(Method::GET, "/demo/", None, false).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(app
        .store
        .list_events(app.team.id, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_delete_demo_data() {
    let app = TestApp::new().await;
    app.get("/demo/").await;

    let (status, body) = app
        .request(Method::POST, "/delete_demo_data/", None, true)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
    assert!(app
        .store
        .list_events(app.team.id, None)
        .await
        .unwrap()
        .is_empty());
    assert!(app.store.list_persons(app.team.id).await.unwrap().is_empty());
    assert!(app.store.list_actions(app.team.id).await.unwrap().is_empty());

    let (status, body) = app.get("/delete_demo_data/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    // The project can be seeded again once the demo data is gone.
    app.get("/demo/").await;
    assert_eq!(app.store.list_persons(app.team.id).await.unwrap().len(), 100);
}
