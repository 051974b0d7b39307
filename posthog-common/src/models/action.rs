use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TeamId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlMatching {
    #[default]
    Contains,
    Exact,
    Regex,
}

impl FromStr for UrlMatching {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(UrlMatching::Contains),
            "exact" => Ok(UrlMatching::Exact),
            "regex" => Ok(UrlMatching::Regex),
            invalid => Err(format!("{invalid} is not a valid url matching mode")),
        }
    }
}

impl fmt::Display for UrlMatching {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UrlMatching::Contains => write!(f, "contains"),
            UrlMatching::Exact => write!(f, "exact"),
            UrlMatching::Regex => write!(f, "regex"),
        }
    }
}

/// A single matching rule of an action, every populated field has to match.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ActionStep {
    pub event: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub url_matching: UrlMatching,
    pub selector: Option<String>,
    pub tag_name: Option<String>,
    pub text: Option<String>,
    pub href: Option<String>,
}

impl ActionStep {
    pub fn for_event(event: &str) -> Self {
        Self {
            event: Some(event.to_owned()),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: &str, url_matching: UrlMatching) -> Self {
        self.url = Some(url.to_owned());
        self.url_matching = url_matching;
        self
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selector = Some(selector.to_owned());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Action {
    pub id: i64,
    pub team_id: TeamId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
    pub post_to_slack: bool,
    pub events_count: i64,
    pub last_calculated_at: Option<DateTime<Utc>>,
    pub steps: Vec<ActionStep>,
}

#[derive(Debug, Clone)]
pub struct NewAction {
    pub team_id: TeamId,
    pub name: String,
    pub post_to_slack: bool,
    pub steps: Vec<ActionStep>,
}

impl NewAction {
    pub fn new(team_id: TeamId, name: &str, steps: Vec<ActionStep>) -> Self {
        Self {
            team_id,
            name: name.to_owned(),
            post_to_slack: false,
            steps,
        }
    }
}
