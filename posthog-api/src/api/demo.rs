use axum::{
    extract::State,
    http::HeaderMap,
    response::{Html, Json},
};
use posthog_common::models::{Team, User};
use posthog_common::queue::NewJob;
use serde_json::{json, Value};
use tracing::instrument;

use crate::api::absolute_uri;
use crate::api::auth::AuthenticatedUser;
use crate::api::errors::ApiError;
use crate::demo;
use crate::router::AppState;

pub const EVENT_PROPERTY_USAGE_TASK: &str = "calculate_event_property_usage";

async fn current_team(state: &AppState, user: &User) -> Result<Team, ApiError> {
    let team_id = user.current_team_id.ok_or(ApiError::NotFound)?;
    state
        .store
        .get_team(team_id)
        .await?
        .ok_or(ApiError::NotFound)
}

fn render_demo_page(api_token: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head>
    <title>HogFlix</title>
    <script>
      !function(t,e){{var o=e.createElement("script");o.src="/static/array.js";e.head.appendChild(o)}}(window,document);
      window.posthog_api_token = "{api_token}";
    </script>
  </head>
  <body>
    <div class="container">
      <h1>HogFlix</h1>
      <p>Movies, for hedgehogs.</p>
      <form class="form"><a href="/demo/1" id="sign-up" class="btn btn-success">Sign up</a></form>
    </div>
  </body>
</html>
"#
    )
}

/// Seeds the caller's current project with demo data and serves the demo site.
#[instrument(skip_all)]
pub async fn demo(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    headers: HeaderMap,
) -> Result<Html<String>, ApiError> {
    let mut team = current_team(&state, &user).await?;
    let base_url = absolute_uri(&headers, "/demo/");

    demo::seed(state.store.as_ref(), &mut team, &base_url).await?;

    if team.add_event_name("$pageview") {
        team = state.store.update_team(&team).await?;
    }
    state
        .queue
        .enqueue(NewJob::new(
            EVENT_PROPERTY_USAGE_TASK,
            json!({"team_id": team.id}),
        ))
        .await?;

    Ok(Html(render_demo_page(&team.api_token)))
}

#[instrument(skip_all)]
pub async fn delete_demo_data(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let team = current_team(&state, &user).await?;
    demo::delete_demo_data(state.store.as_ref(), &team).await?;
    Ok(Json(json!({"status": "ok"})))
}
