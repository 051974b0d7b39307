use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TeamId;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct Dashboard {
    pub id: i64,
    pub team_id: TeamId,
    pub name: String,
    pub pinned: bool,
    pub share_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDashboard {
    pub team_id: TeamId,
    pub name: String,
    pub pinned: bool,
    pub share_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct DashboardItem {
    pub id: i64,
    pub team_id: TeamId,
    pub dashboard_id: Option<i64>,
    pub name: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub item_type: String,
    pub filters: Value,
    pub result: Option<Value>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DashboardItem {
    pub fn is_funnel(&self) -> bool {
        self.item_type == "FunnelViz"
            || self.filters.get("insight").and_then(Value::as_str) == Some("FUNNELS")
    }
}

#[derive(Debug, Clone)]
pub struct NewDashboardItem {
    pub team_id: TeamId,
    pub dashboard_id: Option<i64>,
    pub name: String,
    pub item_type: String,
    pub filters: Value,
}

/// Saved funnel from before funnels became dashboard items. Only ever read or deleted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct Funnel {
    pub id: i64,
    pub team_id: TeamId,
    pub name: String,
    pub filters: Value,
    pub created_at: DateTime<Utc>,
}
