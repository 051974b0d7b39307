use async_trait::async_trait;
use posthog_common::models::{PersonDistinctId, TeamId};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::registry::TaskHandler;
use crate::tasks::parse_args;
use crate::tasks::process_event::get_or_create_person;

#[derive(Debug, Deserialize)]
struct Args {
    team_id: TeamId,
    distinct_id: String,
    anon_distinct_id: Option<String>,
    #[serde(default)]
    properties: Value,
}

/// Links an anonymous distinct id to the identified user, merging both persons.
pub struct UserIdentify;

#[async_trait]
impl TaskHandler for UserIdentify {
    async fn run(&self, ctx: &TaskContext, args: Value) -> Result<(), TaskError> {
        let args: Args = parse_args(args)?;
        let team_id = args.team_id;

        let mut person = get_or_create_person(ctx, team_id, &args.distinct_id).await?;

        if let Some(anon_distinct_id) = args.anon_distinct_id.as_deref() {
            match ctx
                .store
                .get_person_by_distinct_id(team_id, anon_distinct_id)
                .await?
            {
                Some(anonymous) if anonymous.id != person.id => {
                    ctx.store.move_distinct_ids(anonymous.id, person.id).await?;
                    // Properties known about the identified person win.
                    let mut merged = anonymous.clone();
                    merged.merge_properties(&person.properties);
                    person.properties = merged.properties;
                    ctx.store.delete_person(anonymous.id).await?;
                    info!(team_id, from = anonymous.id, to = person.id, "merged persons");
                }
                Some(_) => {}
                None => {
                    ctx.store
                        .insert_distinct_ids(vec![PersonDistinctId {
                            team_id,
                            person_id: person.id,
                            distinct_id: anon_distinct_id.to_owned(),
                        }])
                        .await?;
                }
            }
        }

        person.merge_properties(&args.properties);
        person.is_identified = true;
        ctx.store.update_person(&person).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use posthog_common::store::Store;
    use serde_json::json;

    use super::*;
    use crate::tasks::process_event::ProcessEvent;
    use crate::tasks::test_utils::env;

    #[tokio::test]
    async fn test_merges_anonymous_person() {
        let env = env().await;
        for (distinct_id, properties) in [
            ("anon-1", json!({"$browser": "Firefox", "plan": "free"})),
            ("user@hogflix.com", json!({"plan": "paid"})),
        ] {
            ProcessEvent
                .run(
                    &env.ctx,
                    json!({
                        "team_id": env.team.id,
                        "distinct_id": distinct_id,
                        "event": "$pageview",
                    }),
                )
                .await
                .unwrap();
            let mut person = env
                .store
                .get_person_by_distinct_id(env.team.id, distinct_id)
                .await
                .unwrap()
                .unwrap();
            person.properties = properties;
            env.store.update_person(&person).await.unwrap();
        }

        UserIdentify
            .run(
                &env.ctx,
                json!({
                    "team_id": env.team.id,
                    "distinct_id": "user@hogflix.com",
                    "anon_distinct_id": "anon-1",
                    "properties": {"email": "user@hogflix.com"},
                }),
            )
            .await
            .unwrap();

        let persons = env.store.list_persons(env.team.id).await.unwrap();
        assert_eq!(persons.len(), 1);
        let person = &persons[0];
        assert!(person.is_identified);
        assert_eq!(
            person.properties,
            json!({"$browser": "Firefox", "plan": "paid", "email": "user@hogflix.com"})
        );
        let mut distinct_ids = env.store.list_distinct_ids(person.id).await.unwrap();
        distinct_ids.sort();
        assert_eq!(distinct_ids, vec!["anon-1", "user@hogflix.com"]);
    }

    #[tokio::test]
    async fn test_identify_new_user() {
        let env = env().await;

        UserIdentify
            .run(
                &env.ctx,
                json!({"team_id": env.team.id, "distinct_id": "new", "anon_distinct_id": "anon"}),
            )
            .await
            .unwrap();

        let person = env
            .store
            .get_person_by_distinct_id(env.team.id, "anon")
            .await
            .unwrap()
            .unwrap();
        assert!(person.is_identified);
        assert_eq!(env.store.list_persons(env.team.id).await.unwrap().len(), 1);
    }
}
