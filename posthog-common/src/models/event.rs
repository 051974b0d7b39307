use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::TeamId;

/// One node of the DOM breadcrumb attached to autocaptured events.
/// `order` 0 is the element that was interacted with, higher orders are its ancestors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Element {
    pub tag_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr_id: Option<String>,
    #[serde(default)]
    pub attr_class: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth_child: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth_of_type: Option<i32>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub attributes: Value,
    #[serde(default)]
    pub order: i32,
}

impl Element {
    pub fn new(tag_name: &str, order: i32) -> Self {
        Self {
            tag_name: tag_name.to_owned(),
            order,
            ..Default::default()
        }
    }

    pub fn with_classes(mut self, classes: &[&str]) -> Self {
        self.attr_class = classes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.attr_id = Some(id.to_owned());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_owned());
        self
    }

    pub fn with_href(mut self, href: &str) -> Self {
        self.href = Some(href.to_owned());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Event {
    pub id: i64,
    pub uuid: Uuid,
    pub team_id: TeamId,
    pub event: String,
    pub distinct_id: String,
    pub properties: Value,
    pub elements: Vec<Element>,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn current_url(&self) -> Option<&str> {
        self.properties.get("$current_url").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub team_id: TeamId,
    pub event: String,
    pub distinct_id: String,
    pub properties: Value,
    pub elements: Vec<Element>,
    pub timestamp: DateTime<Utc>,
}

impl NewEvent {
    pub fn new(
        team_id: TeamId,
        event: &str,
        distinct_id: &str,
        properties: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            team_id,
            event: event.to_owned(),
            distinct_id: distinct_id.to_owned(),
            properties,
            elements: Vec::new(),
            timestamp,
        }
    }

    pub fn with_elements(mut self, elements: Vec<Element>) -> Self {
        self.elements = elements;
        self
    }
}
