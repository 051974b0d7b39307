use async_trait::async_trait;
use chrono::{DateTime, Utc};
use posthog_common::matching::action_matches;
use posthog_common::models::{Element, NewEvent, NewPerson, Person, PersonDistinctId, TeamId};
use posthog_common::queue::NewJob;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::registry::TaskHandler;
use crate::tasks::{parse_args, WEBHOOKS};

#[derive(Debug, Deserialize)]
struct Args {
    team_id: TeamId,
    distinct_id: String,
    event: String,
    #[serde(default)]
    properties: Map<String, Value>,
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    elements: Vec<Element>,
}

/// Returns the person owning `distinct_id`, creating it on first sight.
pub(crate) async fn get_or_create_person(
    ctx: &TaskContext,
    team_id: TeamId,
    distinct_id: &str,
) -> Result<Person, TaskError> {
    if let Some(person) = ctx
        .store
        .get_person_by_distinct_id(team_id, distinct_id)
        .await?
    {
        return Ok(person);
    }

    let mut created = ctx
        .store
        .create_persons(vec![NewPerson {
            team_id,
            properties: json!({}),
            is_identified: false,
        }])
        .await?;
    let person = created
        .pop()
        .ok_or_else(|| TaskError::NotFound(format!("person for {distinct_id}")))?;
    ctx.store
        .insert_distinct_ids(vec![PersonDistinctId {
            team_id,
            person_id: person.id,
            distinct_id: distinct_id.to_owned(),
        }])
        .await?;

    // Someone else may have claimed the distinct id in between.
    match ctx
        .store
        .get_person_by_distinct_id(team_id, distinct_id)
        .await?
    {
        Some(owner) if owner.id != person.id => {
            ctx.store.delete_person(person.id).await?;
            Ok(owner)
        }
        _ => Ok(person),
    }
}

/// Stores an incoming event and keeps the team's name and property lists up to date.
pub struct ProcessEvent;

#[async_trait]
impl TaskHandler for ProcessEvent {
    async fn run(&self, ctx: &TaskContext, args: Value) -> Result<(), TaskError> {
        let args: Args = parse_args(args)?;
        let mut team = ctx
            .store
            .get_team(args.team_id)
            .await?
            .ok_or_else(|| TaskError::NotFound(format!("team {}", args.team_id)))?;

        get_or_create_person(ctx, team.id, &args.distinct_id).await?;

        let event = ctx
            .store
            .insert_event(
                NewEvent::new(
                    team.id,
                    &args.event,
                    &args.distinct_id,
                    Value::Object(args.properties.clone()),
                    args.timestamp.unwrap_or_else(Utc::now),
                )
                .with_elements(args.elements),
            )
            .await?;

        let mut changed = !team.ingested_event;
        team.ingested_event = true;
        changed |= team.add_event_name(&args.event);
        for (key, value) in &args.properties {
            changed |= team.add_event_property(key);
            if value.is_number() {
                changed |= team.add_numerical_property(key);
            }
        }
        if changed {
            ctx.store.update_team(&team).await?;
        }

        for action in ctx.store.list_actions(team.id).await? {
            if action.post_to_slack && action_matches(&action, &event) {
                debug!(action_id = action.id, "event triggers a webhook");
                ctx.queue
                    .enqueue(NewJob::new(
                        WEBHOOKS,
                        json!({"team_id": team.id, "action_id": action.id, "event_id": event.id}),
                    ))
                    .await?;
            }
        }

        info!(team_id = team.id, event_id = event.id, "processed event");
        Ok(())
    }
}
