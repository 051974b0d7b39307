use async_trait::async_trait;
use chrono::{Duration, Utc};
use posthog_common::models::TeamId;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::registry::TaskHandler;
use crate::tasks::parse_args;

const SNAPSHOT_EVENT: &str = "$snapshot";

#[derive(Debug, Default, Deserialize)]
struct Args {
    team_id: Option<TeamId>,
}

/// Drops session recording snapshots past the team's retention period.
pub struct SessionRecordingRetention;

#[async_trait]
impl TaskHandler for SessionRecordingRetention {
    async fn run(&self, ctx: &TaskContext, args: Value) -> Result<(), TaskError> {
        let args: Args = if args.is_null() {
            Args::default()
        } else {
            parse_args(args)?
        };

        let teams = match args.team_id {
            Some(team_id) => vec![ctx
                .store
                .get_team(team_id)
                .await?
                .ok_or_else(|| TaskError::NotFound(format!("team {team_id}")))?],
            None => ctx.store.list_all_teams().await?,
        };

        let now = Utc::now();
        for team in teams {
            let days = team
                .session_recording_retention_period_days
                .map(i64::from)
                .unwrap_or(ctx.settings.default_retention_days);
            let deleted = ctx
                .store
                .delete_events_before(team.id, SNAPSHOT_EVENT, now - Duration::days(days))
                .await?;
            if deleted > 0 {
                info!(team_id = team.id, deleted, "deleted expired session recordings");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use posthog_common::models::NewTeam;
    use posthog_common::store::Store;
    use serde_json::json;

    use super::*;
    use crate::tasks::test_utils::{env, event};

    #[tokio::test]
    async fn test_expired_snapshots_are_deleted() {
        let env = env().await;
        let organization = env.store.create_organization("Other").await.unwrap();
        let mut long_retention = env
            .store
            .create_team(NewTeam::new(organization.id, "Keeps a week"))
            .await
            .unwrap();
        long_retention.session_recording_retention_period_days = Some(7);
        env.store.update_team(&long_retention).await.unwrap();

        let five_days_ago = Utc::now() - Duration::days(5);
        for team in [&env.team, &long_retention] {
            env.store
                .insert_events(vec![
                    event(team, SNAPSHOT_EVENT, "a", json!({}), five_days_ago),
                    event(team, SNAPSHOT_EVENT, "a", json!({}), Utc::now()),
                    event(team, "$pageview", "a", json!({}), five_days_ago),
                ])
                .await
                .unwrap();
        }

        SessionRecordingRetention
            .run(&env.ctx, json!({}))
            .await
            .unwrap();

        // Default retention is 3 days.
        assert_eq!(env.store.list_events(env.team.id, None).await.unwrap().len(), 2);
        assert_eq!(
            env.store
                .list_events(long_retention.id, None)
                .await
                .unwrap()
                .len(),
            3
        );
    }
}
