use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{TeamId, DEMO_PERSON_PROPERTY};

pub type PersonId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Person {
    pub id: PersonId,
    pub uuid: Uuid,
    pub team_id: TeamId,
    pub created_at: DateTime<Utc>,
    pub properties: Value,
    pub is_identified: bool,
}

impl Person {
    /// Shallow-merges `other` into the property bag, keys from `other` win.
    pub fn merge_properties(&mut self, other: &Value) {
        let Some(incoming) = other.as_object() else {
            return;
        };
        if !self.properties.is_object() {
            self.properties = Value::Object(Map::new());
        }
        if let Some(props) = self.properties.as_object_mut() {
            for (key, value) in incoming {
                props.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn is_demo(&self) -> bool {
        self.properties
            .get(DEMO_PERSON_PROPERTY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct NewPerson {
    pub team_id: TeamId,
    pub properties: Value,
    pub is_identified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersonDistinctId {
    pub team_id: TeamId,
    pub person_id: PersonId,
    pub distinct_id: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn person(properties: Value) -> Person {
        Person {
            id: 1,
            uuid: Uuid::now_v7(),
            team_id: 1,
            created_at: Utc::now(),
            properties,
            is_identified: false,
        }
    }

    #[test]
    fn test_merge_properties_overwrites_existing_keys() {
        let mut person = person(json!({"is_demo": true, "name": "old"}));
        person.merge_properties(&json!({"name": "Ada", "email": "ada@hogflix.com"}));

        assert_eq!(
            person.properties,
            json!({"is_demo": true, "name": "Ada", "email": "ada@hogflix.com"})
        );
        assert!(person.is_demo());
    }

    #[test]
    fn test_merge_into_non_object_properties() {
        let mut person = person(Value::Null);
        person.merge_properties(&json!({"plan": "free"}));
        assert_eq!(person.properties, json!({"plan": "free"}));
        assert!(!person.is_demo());
    }
}
