use std::collections::BTreeMap;

use axum::{extract::State, Json};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::api::auth::AuthenticatedUser;
use crate::api::errors::ApiError;
use crate::config::PrimaryDb;
use crate::router::AppState;
use crate::timezones::available_timezones;

pub use posthog_common::redis::{PLUGIN_SERVER_PING_KEY, WORKER_HEARTBEAT_KEY};

const WORKER_HEARTBEAT_MAX_AGE_SECS: i64 = 300;
const PLUGIN_SERVER_PING_MAX_AGE_SECS: i64 = 30;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SocialAuthProviders {
    #[serde(rename = "google-oauth2")]
    pub google_oauth2: bool,
    pub github: bool,
    pub gitlab: bool,
}

/// What any caller, logged in or not, gets to see.
#[derive(Debug, Serialize)]
pub struct Preflight {
    pub django: bool,
    pub redis: bool,
    pub plugins: bool,
    pub celery: bool,
    pub db: bool,
    pub initiated: bool,
    pub cloud: bool,
    pub available_social_auth_providers: SocialAuthProviders,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub instance: Option<InstanceDetails>,
}

/// Extra details reserved to authenticated users.
#[derive(Debug, Serialize)]
pub struct InstanceDetails {
    pub ee_available: bool,
    pub ee_enabled: bool,
    pub db_backend: PrimaryDb,
    pub opt_out_capture: bool,
    pub posthog_version: &'static str,
    pub email_service_available: bool,
    pub is_debug: bool,
    pub is_event_property_usage_enabled: bool,
    pub licensed_users_available: Option<i64>,
    pub available_timezones: BTreeMap<&'static str, Value>,
}

fn heartbeat_is_recent(heartbeat: Option<String>, now: DateTime<Utc>) -> bool {
    heartbeat
        .and_then(|value| value.parse::<i64>().ok())
        .is_some_and(|seconds| now.timestamp() - seconds <= WORKER_HEARTBEAT_MAX_AGE_SECS)
}

fn ping_is_recent(ping: Option<String>, now: DateTime<Utc>) -> bool {
    ping.and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
        .is_some_and(|at| at > now - Duration::seconds(PLUGIN_SERVER_PING_MAX_AGE_SECS))
}

#[instrument(skip_all)]
pub async fn preflight(
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
) -> Result<Json<Preflight>, ApiError> {
    let now = Utc::now();
    let settings = &state.settings;

    let db = state.store.ping().await.is_ok();
    let redis = state.redis.ping().await.is_ok();
    let celery = match state.redis.get(WORKER_HEARTBEAT_KEY.to_string()).await {
        Ok(heartbeat) => heartbeat_is_recent(heartbeat, now),
        Err(e) => {
            warn!("could not read the worker heartbeat: {}", e);
            false
        }
    };
    let plugins = match state.redis.get(PLUGIN_SERVER_PING_KEY.to_string()).await {
        Ok(ping) => ping_is_recent(ping, now),
        Err(_) => false,
    };
    let initiated = state.store.has_users().await?;

    let instance = match user {
        None => None,
        Some(_) => {
            let license = state.store.get_valid_license(now).await?;
            let licensed_users_available = match license {
                Some(license) => {
                    let active_users = state.store.count_users().await?;
                    let pending_invites = state.store.count_pending_invites().await?;
                    posthog_common::models::licensed_users_available(
                        Some(&license),
                        now,
                        active_users,
                        pending_invites,
                    )
                }
                None => None,
            };

            Some(InstanceDetails {
                ee_available: settings.ee_available,
                ee_enabled: settings.ee_enabled(),
                db_backend: settings.primary_db,
                opt_out_capture: settings.opt_out_capture,
                posthog_version: env!("CARGO_PKG_VERSION"),
                email_service_available: settings.email_available(),
                is_debug: settings.debug,
                is_event_property_usage_enabled: settings.event_property_usage_enabled,
                licensed_users_available,
                available_timezones: available_timezones(now),
            })
        }
    };

    Ok(Json(Preflight {
        django: true,
        redis,
        plugins,
        celery,
        db,
        initiated,
        cloud: settings.multi_tenancy,
        available_social_auth_providers: SocialAuthProviders {
            google_oauth2: settings.google_oauth2_available(),
            github: settings.github_available(),
            gitlab: settings.gitlab_available(),
        },
        instance,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_heartbeat_age() {
        let now = Utc::now();
        let ago = |secs: i64| Some((now.timestamp() - secs).to_string());

        assert!(heartbeat_is_recent(ago(10), now));
        assert!(heartbeat_is_recent(ago(300), now));
        assert!(!heartbeat_is_recent(ago(301), now));
        assert!(!heartbeat_is_recent(Some("not a number".to_string()), now));
        assert!(!heartbeat_is_recent(None, now));
    }

    #[test]
    fn test_plugin_server_ping_age() {
        let now = Utc::now();

        assert!(ping_is_recent(
            Some((now - Duration::seconds(5)).to_rfc3339()),
            now
        ));
        assert!(!ping_is_recent(
            Some((now - Duration::seconds(31)).to_rfc3339()),
            now
        ));
        assert!(!ping_is_recent(Some("yesterday".to_string()), now));
    }
}
