use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use posthog_common::models::{generate_api_token, NewTeam, Team, TeamId, User};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::api::absolute_uri;
use crate::api::auth::AuthenticatedUser;
use crate::api::errors::ApiError;
use crate::router::AppState;
use crate::timezones::is_valid_timezone;

pub const DEFAULT_PAGE_SIZE: i64 = 100;

const CURRENT_PROJECT: &str = "@current";
const CREATION_FORBIDDEN: &str =
    "You must upgrade your PostHog plan to be able to create and manage multiple projects.";

/// The fields every listing shows.
#[derive(Debug, Serialize)]
pub struct ProjectBasic {
    pub id: TeamId,
    pub uuid: Uuid,
    pub organization: Uuid,
    pub api_token: String,
    pub name: String,
    pub completed_snippet_onboarding: bool,
    pub ingested_event: bool,
    pub is_demo: bool,
    pub timezone: String,
}

impl From<&Team> for ProjectBasic {
    fn from(team: &Team) -> Self {
        ProjectBasic {
            id: team.id,
            uuid: team.uuid,
            organization: team.organization_id,
            api_token: team.api_token.clone(),
            name: team.name.clone(),
            completed_snippet_onboarding: team.completed_snippet_onboarding,
            ingested_event: team.ingested_event,
            is_demo: team.is_demo,
            timezone: team.timezone.clone(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EventNameUsage {
    pub event: String,
    pub volume: Option<i64>,
    pub usage_count: Option<i64>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PropertyUsage {
    pub key: String,
    pub volume: Option<i64>,
    pub usage_count: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Project {
    #[serde(flatten)]
    pub basic: ProjectBasic,
    pub app_urls: Vec<String>,
    pub slack_incoming_webhook: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub anonymize_ips: bool,
    pub test_account_filters: Value,
    pub data_attributes: Value,
    pub session_recording_opt_in: bool,
    pub session_recording_retention_period_days: Option<i32>,
    pub event_names: Vec<String>,
    pub event_names_with_usage: Vec<EventNameUsage>,
    pub event_properties: Vec<String>,
    pub event_properties_with_usage: Vec<PropertyUsage>,
    pub event_properties_numerical: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectPage {
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<ProjectBasic>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Distinguishes an explicit `null` from a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Writable team settings. Missing fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub timezone: Option<String>,
    pub app_urls: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub slack_incoming_webhook: Option<Option<String>>,
    pub anonymize_ips: Option<bool>,
    pub completed_snippet_onboarding: Option<bool>,
    pub test_account_filters: Option<Value>,
    pub data_attributes: Option<Value>,
    pub session_recording_opt_in: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub session_recording_retention_period_days: Option<Option<i32>>,
}

impl ProjectUpdate {
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ApiError::invalid_input(
                    Some("name"),
                    "This field may not be blank.",
                ));
            }
        }
        if let Some(timezone) = &self.timezone {
            if !is_valid_timezone(timezone) {
                return Err(ApiError::invalid_choice("timezone", timezone));
            }
        }
        if let Some(filters) = &self.test_account_filters {
            if !filters.is_array() {
                return Err(ApiError::invalid_input(
                    Some("test_account_filters"),
                    "Must be a list of property filters.",
                ));
            }
        }
        if let Some(attributes) = &self.data_attributes {
            if !attributes.is_array() {
                return Err(ApiError::invalid_input(
                    Some("data_attributes"),
                    "Must be a list of attribute names.",
                ));
            }
        }
        if let Some(Some(days)) = self.session_recording_retention_period_days {
            if days <= 0 {
                return Err(ApiError::invalid_input(
                    Some("session_recording_retention_period_days"),
                    "Ensure this value is greater than or equal to 1.",
                ));
            }
        }
        Ok(())
    }

    /// Checks every field before touching the team, so a rejected update changes nothing.
    pub fn apply(self, team: &mut Team) -> Result<(), ApiError> {
        self.validate()?;

        if let Some(name) = self.name {
            team.name = name;
        }
        if let Some(timezone) = self.timezone {
            team.timezone = timezone;
        }
        if let Some(app_urls) = self.app_urls {
            team.app_urls = app_urls;
        }
        if let Some(webhook) = self.slack_incoming_webhook {
            team.slack_incoming_webhook = webhook;
        }
        if let Some(anonymize_ips) = self.anonymize_ips {
            team.anonymize_ips = anonymize_ips;
        }
        if let Some(completed) = self.completed_snippet_onboarding {
            team.completed_snippet_onboarding = completed;
        }
        if let Some(filters) = self.test_account_filters {
            team.test_account_filters = filters;
        }
        if let Some(attributes) = self.data_attributes {
            team.data_attributes = attributes;
        }
        if let Some(opt_in) = self.session_recording_opt_in {
            team.session_recording_opt_in = opt_in;
        }
        if let Some(days) = self.session_recording_retention_period_days {
            team.session_recording_retention_period_days = days;
        }
        Ok(())
    }
}

fn parse_body<T: Default>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(ApiError::invalid_input(None, rejection.body_text())),
    }
}

/// Resolves `@current` or a numeric id to a team of the caller's current organization.
/// Teams of other organizations are reported as missing.
async fn resolve_team(state: &AppState, user: &User, id: &str) -> Result<Team, ApiError> {
    let team_id = if id == CURRENT_PROJECT {
        user.current_team_id.ok_or(ApiError::NotFound)?
    } else {
        id.parse::<TeamId>().map_err(|_| ApiError::NotFound)?
    };

    let team = state
        .store
        .get_team(team_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if Some(team.organization_id) != user.current_organization_id {
        return Err(ApiError::NotFound);
    }
    Ok(team)
}

async fn full_projection(state: &AppState, team: Team) -> Result<Project, ApiError> {
    let event_definitions: HashMap<String, (Option<i64>, Option<i64>)> = state
        .store
        .list_event_definitions(team.id)
        .await?
        .into_iter()
        .map(|d| (d.name, (d.volume_30_day, d.query_usage_30_day)))
        .collect();
    let property_definitions: HashMap<String, (Option<i64>, Option<i64>)> = state
        .store
        .list_property_definitions(team.id)
        .await?
        .into_iter()
        .map(|d| (d.name, (d.volume_30_day, d.query_usage_30_day)))
        .collect();

    let event_names_with_usage = team
        .event_names
        .iter()
        .map(|event| {
            let (volume, usage_count) = event_definitions.get(event).copied().unwrap_or_default();
            EventNameUsage {
                event: event.clone(),
                volume,
                usage_count,
            }
        })
        .collect();
    let event_properties_with_usage = team
        .event_properties
        .iter()
        .map(|key| {
            let (volume, usage_count) = property_definitions.get(key).copied().unwrap_or_default();
            PropertyUsage {
                key: key.clone(),
                volume,
                usage_count,
            }
        })
        .collect();

    Ok(Project {
        basic: ProjectBasic::from(&team),
        app_urls: team.app_urls,
        slack_incoming_webhook: team.slack_incoming_webhook,
        created_at: team.created_at,
        updated_at: team.updated_at,
        anonymize_ips: team.anonymize_ips,
        test_account_filters: team.test_account_filters,
        data_attributes: team.data_attributes,
        session_recording_opt_in: team.session_recording_opt_in,
        session_recording_retention_period_days: team.session_recording_retention_period_days,
        event_names: team.event_names,
        event_names_with_usage,
        event_properties: team.event_properties,
        event_properties_with_usage,
        event_properties_numerical: team.event_properties_numerical,
    })
}

fn page_uri(headers: &HeaderMap, limit: i64, offset: i64) -> String {
    absolute_uri(
        headers,
        &format!("/api/projects/?limit={limit}&offset={offset}"),
    )
}

#[instrument(skip_all)]
pub async fn list_projects(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(pagination): Query<Pagination>,
    headers: HeaderMap,
) -> Result<Json<ProjectPage>, ApiError> {
    let Some(organization_id) = user.current_organization_id else {
        return Ok(Json(ProjectPage {
            next: None,
            previous: None,
            results: Vec::new(),
        }));
    };
    let limit = pagination.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
    let offset = pagination.offset.unwrap_or(0).max(0);

    let teams = state.store.list_teams(organization_id, limit, offset).await?;
    let total = state.store.count_teams(organization_id).await?;

    let next = (offset + limit < total).then(|| page_uri(&headers, limit, offset + limit));
    let previous = (offset > 0).then(|| page_uri(&headers, limit, (offset - limit).max(0)));

    Ok(Json(ProjectPage {
        next,
        previous,
        results: teams.iter().map(ProjectBasic::from).collect(),
    }))
}

#[instrument(skip_all, fields(project = %id))]
pub async fn get_project(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<Project>, ApiError> {
    let team = resolve_team(&state, &user, &id).await?;
    Ok(Json(full_projection(&state, team).await?))
}

#[instrument(skip_all, fields(project = %id))]
pub async fn update_project(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
    payload: Result<Json<ProjectUpdate>, JsonRejection>,
) -> Result<Json<Project>, ApiError> {
    let mut team = resolve_team(&state, &user, &id).await?;
    parse_body(payload)?.apply(&mut team)?;

    let team = state.store.update_team(&team).await?;
    Ok(Json(full_projection(&state, team).await?))
}

#[instrument(skip_all)]
pub async fn create_project(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<ProjectUpdate>, JsonRejection>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    if !state.settings.multi_tenancy
        && state.store.get_valid_license(Utc::now()).await?.is_none()
    {
        return Err(ApiError::PermissionDenied(CREATION_FORBIDDEN));
    }

    let Some(organization_id) = user.current_organization_id else {
        return Err(ApiError::invalid_input(
            None,
            "You need to belong to an organization.",
        ));
    };

    let update = parse_body(payload)?;
    let Some(name) = update.name.clone() else {
        return Err(ApiError::required("name"));
    };
    update.validate()?;

    let mut team = state
        .store
        .create_team(NewTeam::new(organization_id, &name))
        .await?;
    update.apply(&mut team)?;
    let team = state.store.update_team(&team).await?;
    state
        .store
        .set_current_team(user.id, organization_id, team.id)
        .await?;

    info!(team_id = team.id, "created project");
    Ok((StatusCode::CREATED, Json(full_projection(&state, team).await?)))
}

#[instrument(skip_all, fields(project = %id))]
pub async fn delete_project(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let team = resolve_team(&state, &user, &id).await?;
    state.store.delete_team(team.id).await?;

    info!(team_id = team.id, "deleted project");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, fields(project = %id))]
pub async fn reset_token(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<Project>, ApiError> {
    let mut team = resolve_team(&state, &user, &id).await?;
    team.api_token = generate_api_token();

    let team = state.store.update_team(&team).await?;
    Ok(Json(full_projection(&state, team).await?))
}
