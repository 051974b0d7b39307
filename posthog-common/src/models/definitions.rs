use serde::{Deserialize, Serialize};

use super::TeamId;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct EventDefinition {
    pub team_id: TeamId,
    pub name: String,
    pub volume_30_day: Option<i64>,
    pub query_usage_30_day: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct PropertyDefinition {
    pub team_id: TeamId,
    pub name: String,
    pub is_numerical: bool,
    pub volume_30_day: Option<i64>,
    pub query_usage_30_day: Option<i64>,
}
