use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::registry::TaskHandler;

const REPORT_PERIOD_DAYS: i64 = 7;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct InstanceUsage {
    pub users: i64,
    pub teams: i64,
    pub persons: i64,
    pub events_last_period: i64,
}

pub(crate) async fn instance_usage(ctx: &TaskContext) -> Result<InstanceUsage, TaskError> {
    let since = Utc::now() - Duration::days(REPORT_PERIOD_DAYS);
    Ok(InstanceUsage {
        users: ctx.store.count_users().await?,
        teams: ctx.store.list_all_teams().await?.len() as i64,
        persons: ctx.store.count_persons().await?,
        events_last_period: ctx.store.count_events_since(since).await?,
    })
}

/// Logs how much the instance is used.
pub struct StatusReport;

#[async_trait]
impl TaskHandler for StatusReport {
    async fn run(&self, ctx: &TaskContext, _: Value) -> Result<(), TaskError> {
        let usage = instance_usage(ctx).await?;
        info!(
            users = usage.users,
            teams = usage.teams,
            persons = usage.persons,
            events = usage.events_last_period,
            "instance status report"
        );
        Ok(())
    }
}
