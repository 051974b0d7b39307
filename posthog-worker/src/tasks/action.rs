use async_trait::async_trait;
use chrono::Utc;
use posthog_common::matching::count_matching;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::registry::TaskHandler;
use crate::tasks::parse_args;

#[derive(Debug, Deserialize)]
struct Args {
    action_id: i64,
}

/// Refreshes the number of events an action matches.
pub struct CalculateAction;

#[async_trait]
impl TaskHandler for CalculateAction {
    async fn run(&self, ctx: &TaskContext, args: Value) -> Result<(), TaskError> {
        let Args { action_id } = parse_args(args)?;
        let action = ctx
            .store
            .get_action(action_id)
            .await?
            .ok_or_else(|| TaskError::NotFound(format!("action {action_id}")))?;

        let events = ctx.store.list_events(action.team_id, None).await?;
        let count = count_matching(&action, &events);
        ctx.store
            .set_action_count(action.id, count, Utc::now())
            .await?;

        info!(action_id, count, "calculated action");
        Ok(())
    }
}
