use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use posthog_common::models::{
    DashboardItem, EventDefinition, PropertyDefinition, Team, TeamId,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::registry::TaskHandler;
use crate::tasks::parse_args;

const USAGE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
struct Args {
    team_id: TeamId,
}

async fn load_team(ctx: &TaskContext, team_id: TeamId) -> Result<Team, TaskError> {
    ctx.store
        .get_team(team_id)
        .await?
        .ok_or_else(|| TaskError::NotFound(format!("team {team_id}")))
}

/// Number of saved insights whose filter list `list` has an entry with `field` = `value`.
fn query_usage(items: &[DashboardItem], list: &str, field: &str, value: &str) -> i64 {
    items
        .iter()
        .filter(|item| {
            item.filters
                .get(list)
                .and_then(Value::as_array)
                .is_some_and(|entries| {
                    entries
                        .iter()
                        .any(|entry| entry.get(field).and_then(Value::as_str) == Some(value))
                })
        })
        .count() as i64
}

/// Computes 30 day volume and query usage of every event name and property key of a team.
pub struct CalculateEventPropertyUsage;

#[async_trait]
impl TaskHandler for CalculateEventPropertyUsage {
    async fn run(&self, ctx: &TaskContext, args: Value) -> Result<(), TaskError> {
        let Args { team_id } = parse_args(args)?;
        let team = load_team(ctx, team_id).await?;

        let since = Utc::now() - Duration::days(USAGE_WINDOW_DAYS);
        let events = ctx.store.list_events(team.id, Some(since)).await?;
        let items = ctx.store.list_dashboard_items(team.id).await?;

        let mut event_volume: HashMap<&str, i64> = HashMap::new();
        let mut property_volume: HashMap<&str, i64> = HashMap::new();
        for event in &events {
            *event_volume.entry(event.event.as_str()).or_default() += 1;
            if let Some(properties) = event.properties.as_object() {
                for key in properties.keys() {
                    *property_volume.entry(key.as_str()).or_default() += 1;
                }
            }
        }

        for name in &team.event_names {
            ctx.store
                .upsert_event_definition(EventDefinition {
                    team_id: team.id,
                    name: name.clone(),
                    volume_30_day: Some(event_volume.get(name.as_str()).copied().unwrap_or(0)),
                    query_usage_30_day: Some(query_usage(&items, "events", "id", name)),
                })
                .await?;
        }
        for key in &team.event_properties {
            ctx.store
                .upsert_property_definition(PropertyDefinition {
                    team_id: team.id,
                    name: key.clone(),
                    is_numerical: team.event_properties_numerical.contains(key),
                    volume_30_day: Some(property_volume.get(key.as_str()).copied().unwrap_or(0)),
                    query_usage_30_day: Some(query_usage(&items, "properties", "key", key)),
                })
                .await?;
        }

        info!(
            team_id,
            events = team.event_names.len(),
            properties = team.event_properties.len(),
            "calculated event and property usage"
        );
        Ok(())
    }
}

/// Makes the team's definitions mirror its event names and property keys.
pub struct SyncDefinitions;

#[async_trait]
impl TaskHandler for SyncDefinitions {
    async fn run(&self, ctx: &TaskContext, args: Value) -> Result<(), TaskError> {
        let Args { team_id } = parse_args(args)?;
        let team = load_team(ctx, team_id).await?;

        let properties: Vec<(String, bool)> = team
            .event_properties
            .iter()
            .map(|key| (key.clone(), team.event_properties_numerical.contains(key)))
            .collect();
        ctx.store
            .sync_definitions(team.id, &team.event_names, &properties)
            .await?;
        Ok(())
    }
}
