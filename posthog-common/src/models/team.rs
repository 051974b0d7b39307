use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type TeamId = i32;

pub const DEFAULT_TIMEZONE: &str = "UTC";

// Actually a "project" as far as the API is concerned
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct Team {
    pub id: TeamId,
    pub uuid: Uuid,
    pub organization_id: Uuid,
    pub api_token: String,
    pub name: String,
    pub app_urls: Vec<String>,
    pub slack_incoming_webhook: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub anonymize_ips: bool,
    pub completed_snippet_onboarding: bool,
    pub ingested_event: bool,
    pub test_account_filters: Value,
    pub is_demo: bool,
    pub timezone: String,
    pub data_attributes: Value,
    pub session_recording_opt_in: bool,
    pub session_recording_retention_period_days: Option<i32>,
    pub event_names: Vec<String>,
    pub event_properties: Vec<String>,
    pub event_properties_numerical: Vec<String>,
}

impl Team {
    /// Records an event name seen for this team, returns whether the list changed.
    pub fn add_event_name(&mut self, name: &str) -> bool {
        push_unique(&mut self.event_names, name)
    }

    pub fn add_event_property(&mut self, key: &str) -> bool {
        push_unique(&mut self.event_properties, key)
    }

    pub fn add_numerical_property(&mut self, key: &str) -> bool {
        push_unique(&mut self.event_properties_numerical, key)
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_owned());
    true
}

#[derive(Debug, Clone)]
pub struct NewTeam {
    pub organization_id: Uuid,
    pub name: String,
    pub api_token: String,
    pub timezone: String,
    pub is_demo: bool,
}

impl NewTeam {
    pub fn new(organization_id: Uuid, name: &str) -> Self {
        Self {
            organization_id,
            name: name.to_owned(),
            api_token: generate_api_token(),
            timezone: DEFAULT_TIMEZONE.to_owned(),
            is_demo: false,
        }
    }
}

/// Project API tokens are public, they only need to be hard to guess.
pub fn generate_api_token() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(43)
        .map(char::from)
        .collect();
    format!("phc_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_prefixed_and_unique() {
        let first = generate_api_token();
        let second = generate_api_token();

        assert!(first.starts_with("phc_"));
        assert_eq!(first.len(), 47);
        assert_ne!(first, second);
    }

    #[test]
    fn test_event_names_are_deduplicated() {
        let now = Utc::now();
        let mut team = Team {
            id: 1,
            uuid: Uuid::now_v7(),
            organization_id: Uuid::now_v7(),
            api_token: generate_api_token(),
            name: "Default Project".to_string(),
            app_urls: vec![],
            slack_incoming_webhook: None,
            created_at: now,
            updated_at: now,
            anonymize_ips: false,
            completed_snippet_onboarding: false,
            ingested_event: false,
            test_account_filters: Value::Array(vec![]),
            is_demo: false,
            timezone: DEFAULT_TIMEZONE.to_string(),
            data_attributes: Value::Array(vec![]),
            session_recording_opt_in: false,
            session_recording_retention_period_days: None,
            event_names: vec![],
            event_properties: vec![],
            event_properties_numerical: vec![],
        };

        assert!(team.add_event_name("$pageview"));
        assert!(!team.add_event_name("$pageview"));
        assert!(team.add_numerical_property("purchase"));
        assert!(!team.add_numerical_property("purchase"));
        assert_eq!(team.event_names, vec!["$pageview".to_string()]);
        assert_eq!(team.event_properties_numerical, vec!["purchase".to_string()]);
    }
}
