use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Person, TeamId};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct Cohort {
    pub id: i64,
    pub team_id: TeamId,
    pub name: String,
    /// List of `{"properties": {key: value, ...}}` groups, OR-ed together.
    pub groups: Value,
    pub count: Option<i64>,
    pub is_calculating: bool,
    pub last_calculation: Option<DateTime<Utc>>,
}

impl Cohort {
    /// A person belongs to the cohort when every property of at least one group matches.
    pub fn contains(&self, person: &Person) -> bool {
        let Some(groups) = self.groups.as_array() else {
            return false;
        };
        groups.iter().any(|group| {
            let Some(properties) = group.get("properties").and_then(Value::as_object) else {
                return false;
            };
            !properties.is_empty()
                && properties
                    .iter()
                    .all(|(key, expected)| person.properties.get(key) == Some(expected))
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn cohort(groups: Value) -> Cohort {
        Cohort {
            id: 1,
            team_id: 1,
            name: "Paying users".to_string(),
            groups,
            count: None,
            is_calculating: false,
            last_calculation: None,
        }
    }

    fn person(properties: Value) -> Person {
        Person {
            id: 1,
            uuid: Uuid::now_v7(),
            team_id: 1,
            created_at: Utc::now(),
            properties,
            is_identified: true,
        }
    }

    #[test]
    fn test_any_group_matching_is_enough() {
        let cohort = cohort(json!([
            {"properties": {"plan": "paid"}},
            {"properties": {"is_demo": true, "company": "HogFlix"}},
        ]));

        assert!(cohort.contains(&person(json!({"plan": "paid"}))));
        assert!(cohort.contains(&person(json!({"is_demo": true, "company": "HogFlix"}))));
        assert!(!cohort.contains(&person(json!({"is_demo": true}))));
    }

    #[test]
    fn test_empty_groups_match_nobody() {
        let cohort = cohort(json!([{"properties": {}}]));
        assert!(!cohort.contains(&person(json!({"plan": "paid"}))));
        assert!(!cohort_with_null_groups().contains(&person(json!({}))));
    }

    fn cohort_with_null_groups() -> Cohort {
        cohort(Value::Null)
    }
}
