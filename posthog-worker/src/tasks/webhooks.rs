use async_trait::async_trait;
use posthog_common::models::{Person, TeamId};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::registry::TaskHandler;
use crate::tasks::{parse_args, post_json};

#[derive(Debug, Deserialize)]
struct Args {
    team_id: TeamId,
    action_id: i64,
    event_id: i64,
}

fn person_label(person: Option<&Person>, distinct_id: &str) -> String {
    person
        .and_then(|p| {
            ["email", "name"]
                .iter()
                .find_map(|key| p.properties.get(*key).and_then(Value::as_str))
        })
        .unwrap_or(distinct_id)
        .to_owned()
}

/// Tells the team's Slack channel that an action was triggered.
pub struct PostWebhook;

#[async_trait]
impl TaskHandler for PostWebhook {
    async fn run(&self, ctx: &TaskContext, args: Value) -> Result<(), TaskError> {
        let args: Args = parse_args(args)?;
        let team = ctx
            .store
            .get_team(args.team_id)
            .await?
            .ok_or_else(|| TaskError::NotFound(format!("team {}", args.team_id)))?;
        let Some(webhook) = team.slack_incoming_webhook.as_deref() else {
            debug!(team_id = team.id, "no webhook configured");
            return Ok(());
        };

        let action = ctx
            .store
            .get_action(args.action_id)
            .await?
            .ok_or_else(|| TaskError::NotFound(format!("action {}", args.action_id)))?;
        let event = ctx
            .store
            .get_event(args.event_id)
            .await?
            .ok_or_else(|| TaskError::NotFound(format!("event {}", args.event_id)))?;
        let person = ctx
            .store
            .get_person_by_distinct_id(team.id, &event.distinct_id)
            .await?;

        let text = format!(
            "{} triggered by {}",
            action.name,
            person_label(person.as_ref(), &event.distinct_id)
        );
        post_json(&ctx.http, webhook, &json!({ "text": text })).await?;

        info!(team_id = team.id, action_id = action.id, "posted webhook");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use http::StatusCode;
    use posthog_common::models::{ActionStep, NewAction, NewPerson, PersonDistinctId, Team};
    use posthog_common::store::{MemoryStore, Store};

    use super::*;
    use crate::tasks::test_utils::{capture_server, env, event};

    async fn triggered(store: &MemoryStore, team: &Team) -> Value {
        let action = store
            .create_action(NewAction::new(
                team.id,
                "Paid",
                vec![ActionStep::for_event("purchase")],
            ))
            .await
            .unwrap();
        let person = store
            .create_persons(vec![NewPerson {
                team_id: team.id,
                properties: json!({"email": "hedgehog@hogflix.com"}),
                is_identified: true,
            }])
            .await
            .unwrap()
            .remove(0);
        store
            .insert_distinct_ids(vec![PersonDistinctId {
                team_id: team.id,
                person_id: person.id,
                distinct_id: "hedgehog".to_string(),
            }])
            .await
            .unwrap();
        let event = store
            .insert_event(event(team, "purchase", "hedgehog", json!({}), Utc::now()))
            .await
            .unwrap();
        json!({"team_id": team.id, "action_id": action.id, "event_id": event.id})
    }

    #[tokio::test]
    async fn test_posts_to_slack() {
        let env = env().await;
        let (url, received) = capture_server(StatusCode::OK).await;
        let mut team = env.team.clone();
        team.slack_incoming_webhook = Some(url);
        env.store.update_team(&team).await.unwrap();
        let args = triggered(&env.store, &team).await;

        PostWebhook.run(&env.ctx, args).await.unwrap();

        assert_eq!(
            *received.lock().unwrap(),
            vec![json!({"text": "Paid triggered by hedgehog@hogflix.com"})]
        );
    }

    #[tokio::test]
    async fn test_without_webhook_does_nothing() {
        let env = env().await;
        let args = triggered(&env.store, &env.team).await;

        PostWebhook.run(&env.ctx, args).await.unwrap();
    }

    #[test]
    fn test_person_label_falls_back_to_distinct_id() {
        assert_eq!(person_label(None, "anon-42"), "anon-42");
    }
}
