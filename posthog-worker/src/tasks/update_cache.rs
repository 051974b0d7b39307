use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use posthog_common::matching::{count_matching, funnel_step_counts};
use posthog_common::models::{Action, DashboardItem, Event, TeamId};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::registry::TaskHandler;
use crate::tasks::parse_args;

#[derive(Debug, Deserialize)]
struct Args {
    team_id: TeamId,
}

/// Ids of the actions referenced by the item filters, in step order.
fn action_ids(item: &DashboardItem) -> Vec<i64> {
    let mut steps: Vec<(i64, i64)> = item
        .filters
        .get("actions")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .enumerate()
                .filter_map(|(position, entry)| {
                    let id = entry.get("id").and_then(Value::as_i64)?;
                    let order = entry
                        .get("order")
                        .and_then(Value::as_i64)
                        .unwrap_or(position as i64);
                    Some((order, id))
                })
                .collect()
        })
        .unwrap_or_default();
    steps.sort_by_key(|(order, _)| *order);
    steps.into_iter().map(|(_, id)| id).collect()
}

fn compute_result(item: &DashboardItem, actions: &HashMap<i64, Action>, events: &[Event]) -> Value {
    let steps: Vec<Action> = action_ids(item)
        .into_iter()
        .filter_map(|id| actions.get(&id).cloned())
        .collect();

    if item.is_funnel() {
        let counts = funnel_step_counts(&steps, events);
        return Value::Array(
            steps
                .iter()
                .zip(counts)
                .enumerate()
                .map(|(order, (action, count))| {
                    json!({
                        "action_id": action.id,
                        "name": action.name,
                        "order": order,
                        "count": count,
                    })
                })
                .collect(),
        );
    }

    let mut series: Vec<Value> = steps
        .iter()
        .map(|action| {
            json!({
                "action_id": action.id,
                "name": action.name,
                "count": count_matching(action, events),
            })
        })
        .collect();
    let event_names = item
        .filters
        .get("events")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("id").and_then(Value::as_str));
    for name in event_names {
        let count = events.iter().filter(|e| e.event == name).count();
        series.push(json!({"event": name, "count": count}));
    }
    Value::Array(series)
}

/// Refreshes the cached results of every dashboard item of a team.
pub struct UpdateCache;

#[async_trait]
impl TaskHandler for UpdateCache {
    async fn run(&self, ctx: &TaskContext, args: Value) -> Result<(), TaskError> {
        let Args { team_id } = parse_args(args)?;

        let items = ctx.store.list_dashboard_items(team_id).await?;
        if items.is_empty() {
            return Ok(());
        }
        let actions: HashMap<i64, Action> = ctx
            .store
            .list_actions(team_id)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        let events = ctx.store.list_events(team_id, None).await?;

        let now = Utc::now();
        for item in &items {
            let result = compute_result(item, &actions, &events);
            ctx.store
                .update_dashboard_item_result(item.id, result, now)
                .await?;
        }

        info!(team_id, items = items.len(), "updated dashboard cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use posthog_common::models::{ActionStep, NewAction, NewDashboardItem};
    use posthog_common::store::Store;

    use super::*;
    use crate::tasks::test_utils::{env, event};

    #[tokio::test]
    async fn test_funnel_results() {
        let env = env().await;
        let mut step_ids = Vec::new();
        for name in ["viewed", "signed_up"] {
            let action = env
                .store
                .create_action(NewAction::new(
                    env.team.id,
                    name,
                    vec![ActionStep::for_event(name)],
                ))
                .await
                .unwrap();
            step_ids.push(action.id);
        }
        let item = env
            .store
            .create_dashboard_item(NewDashboardItem {
                team_id: env.team.id,
                dashboard_id: None,
                name: "Signup funnel".to_string(),
                item_type: "FunnelViz".to_string(),
                filters: json!({
                    "insight": "FUNNELS",
                    "actions": [
                        {"id": step_ids[1], "order": 1, "type": "actions"},
                        {"id": step_ids[0], "order": 0, "type": "actions"},
                    ],
                }),
            })
            .await
            .unwrap();

        let start = Utc::now() - Duration::hours(1);
        env.store
            .insert_events(vec![
                event(&env.team, "viewed", "a", json!({}), start),
                event(&env.team, "signed_up", "a", json!({}), start + Duration::minutes(1)),
                event(&env.team, "viewed", "b", json!({}), start),
                // Signing up before viewing does not complete the funnel.
                event(&env.team, "signed_up", "c", json!({}), start),
                event(&env.team, "viewed", "c", json!({}), start + Duration::minutes(1)),
            ])
            .await
            .unwrap();

        UpdateCache
            .run(&env.ctx, json!({"team_id": env.team.id}))
            .await
            .unwrap();

        let items = env.store.list_dashboard_items(env.team.id).await.unwrap();
        let refreshed = items.iter().find(|i| i.id == item.id).unwrap();
        assert!(refreshed.last_refresh.is_some());
        assert_eq!(
            refreshed.result,
            Some(json!([
                {"action_id": step_ids[0], "name": "viewed", "order": 0, "count": 3},
                {"action_id": step_ids[1], "name": "signed_up", "order": 1, "count": 1},
            ]))
        );
    }

    #[tokio::test]
    async fn test_event_series_results() {
        let env = env().await;
        env.store
            .create_dashboard_item(NewDashboardItem {
                team_id: env.team.id,
                dashboard_id: None,
                name: "Pageviews".to_string(),
                item_type: "ActionsLineGraph".to_string(),
                filters: json!({"events": [{"id": "$pageview"}]}),
            })
            .await
            .unwrap();
        env.store
            .insert_events(vec![
                event(&env.team, "$pageview", "a", json!({}), Utc::now()),
                event(&env.team, "$pageview", "b", json!({}), Utc::now()),
                event(&env.team, "$autocapture", "b", json!({}), Utc::now()),
            ])
            .await
            .unwrap();

        UpdateCache
            .run(&env.ctx, json!({"team_id": env.team.id}))
            .await
            .unwrap();

        let items = env.store.list_dashboard_items(env.team.id).await.unwrap();
        assert_eq!(
            items[0].result,
            Some(json!([{"event": "$pageview", "count": 2}]))
        );
    }
}
