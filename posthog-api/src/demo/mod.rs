//! Seeds a team with a week of synthetic traffic on a fictional streaming site, so a
//! fresh instance has something to look at, and removes it again on request.

use chrono::{DateTime, Duration, Utc};
use posthog_common::matching::count_matching;
use posthog_common::models::{
    ActionStep, Element, NewAction, NewDashboard, NewDashboardItem, NewEvent, NewPerson,
    PersonDistinctId, Team, UrlMatching, DEMO_PERSON_PROPERTY,
};
use posthog_common::store::{DemoTeardown, Store, StoreError};
use rand::{seq::SliceRandom, Rng};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

pub const DEMO_PERSON_COUNT: usize = 100;
pub const FUNNEL_DASHBOARD_NAME: &str = "Default";
pub const FUNNEL_ITEM_NAME: &str = "HogFlix signup -> watching movie";

const HOMEPAGE_ACTION: &str = "HogFlix homepage view";
const SIGNED_UP_ACTION: &str = "HogFlix signed up";
const PAID_ACTION: &str = "HogFlix paid";

const BROWSERS: [&str; 3] = ["Chrome", "Safari", "Firefox"];
const FIRST_DAYS_AGO: i64 = 7;
const PERSONS_PER_DAY: usize = 14;
const SHARE_TOKEN_BYTES: usize = 22;

static DEMO_PROFILES: &str = include_str!("../../data/demo_data.json");

type Db = dyn Store + Send + Sync;

#[derive(Error, Debug)]
pub enum DemoError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid demo profiles: {0}")]
    Profiles(#[from] serde_json::Error),
    #[error("no demo profiles to hand out")]
    NoProfiles,
}

fn demo_profiles() -> Result<Vec<Map<String, Value>>, DemoError> {
    let profiles: Vec<Map<String, Value>> = serde_json::from_str(DEMO_PROFILES)?;
    if profiles.is_empty() {
        return Err(DemoError::NoProfiles);
    }
    Ok(profiles)
}

fn random_browser() -> &'static str {
    BROWSERS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(BROWSERS[0])
}

fn share_token() -> String {
    let mut bytes = [0u8; SHARE_TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// One synthetic visitor: the distinct id its events are sent under and the browser
/// it uses for the whole visit.
struct Visitor<'a> {
    team_id: i32,
    distinct_id: &'a str,
    browser: &'static str,
}

impl Visitor<'_> {
    fn pageview(&self, url: &str, at: DateTime<Utc>) -> NewEvent {
        NewEvent::new(
            self.team_id,
            "$pageview",
            self.distinct_id,
            json!({"$current_url": url, "$browser": self.browser, "$lib": "web"}),
            at,
        )
    }

    fn click(&self, url: &str, at: DateTime<Utc>, elements: Vec<Element>) -> NewEvent {
        NewEvent::new(
            self.team_id,
            "$autocapture",
            self.distinct_id,
            json!({
                "$current_url": url,
                "$browser": self.browser,
                "$lib": "web",
                "$event_type": "click",
            }),
            at,
        )
        .with_elements(elements)
    }
}

fn sign_up_link_chain() -> Vec<Element> {
    vec![
        Element::new("a", 0)
            .with_href("/demo/1")
            .with_classes(&["btn", "btn-success"])
            .with_id("sign-up")
            .with_text("Sign up"),
        Element::new("form", 1).with_classes(&["form"]),
        Element::new("div", 2).with_classes(&["container"]),
        Element::new("body", 3),
        Element::new("html", 4),
    ]
}

fn sign_up_button_chain() -> Vec<Element> {
    vec![
        Element::new("button", 0)
            .with_classes(&["btn", "btn-success"])
            .with_text("Sign up!"),
        Element::new("form", 1).with_classes(&["form"]),
        Element::new("div", 2).with_classes(&["container"]),
        Element::new("body", 3),
        Element::new("html", 4),
    ]
}

fn pay_button_chain() -> Vec<Element> {
    vec![
        Element::new("button", 0)
            .with_classes(&["btn", "btn-success"])
            .with_text("Pay $10"),
        Element::new("form", 1).with_classes(&["form"]),
        Element::new("div", 2).with_classes(&["container"]),
        Element::new("body", 3),
        Element::new("html", 4),
    ]
}

/// Creates the demo persons and their week of browsing.
///
/// Every person lands on the homepage. One in three signs up through the homepage link
/// and is identified with a demo profile, one in twelve goes on to the sign up form and
/// one in sixty pays.
#[instrument(skip_all, fields(team_id = team.id))]
pub async fn create_anonymous_users(
    store: &Db,
    team: &mut Team,
    base_url: &str,
) -> Result<(), DemoError> {
    let profiles = demo_profiles()?;
    let now = Utc::now();

    let new_persons = (0..DEMO_PERSON_COUNT)
        .map(|_| NewPerson {
            team_id: team.id,
            properties: json!({ DEMO_PERSON_PROPERTY: true }),
            is_identified: false,
        })
        .collect();
    let mut persons = store.create_persons(new_persons).await?;
    persons.sort_by_key(|p| p.id);

    let mut distinct_ids = Vec::with_capacity(persons.len());
    let mut events = Vec::new();
    let mut days_ago = FIRST_DAYS_AGO;
    let mut next_profile = 0;

    for (index, mut person) in persons.into_iter().enumerate() {
        if index > 0 && index % PERSONS_PER_DAY == 0 {
            days_ago -= 1;
        }
        let distinct_id = Uuid::now_v7().to_string();
        distinct_ids.push(PersonDistinctId {
            team_id: team.id,
            person_id: person.id,
            distinct_id: distinct_id.clone(),
        });
        let visitor = Visitor {
            team_id: team.id,
            distinct_id: &distinct_id,
            browser: random_browser(),
        };

        let start = now - Duration::days(days_ago);
        events.push(visitor.pageview(base_url, start));

        if index % 3 != 0 {
            continue;
        }

        let profile = &profiles[next_profile % profiles.len()];
        next_profile += 1;
        person.merge_properties(&Value::Object(profile.clone()));
        person.is_identified = true;
        store.update_person(&person).await?;

        store
            .insert_event(visitor.click(
                base_url,
                start + Duration::seconds(14),
                sign_up_link_chain(),
            ))
            .await?;
        let signup_url = format!("{base_url}1/");
        events.push(visitor.pageview(&signup_url, start + Duration::seconds(15)));

        if index % 4 != 0 {
            continue;
        }

        store
            .insert_event(visitor.click(
                &signup_url,
                start + Duration::seconds(29),
                sign_up_button_chain(),
            ))
            .await?;
        let payment_url = format!("{base_url}2/");
        events.push(visitor.pageview(&payment_url, start + Duration::seconds(30)));

        if index % 5 != 0 {
            continue;
        }

        store
            .insert_event(visitor.click(
                &payment_url,
                start + Duration::seconds(59),
                pay_button_chain(),
            ))
            .await?;
        events.push(NewEvent::new(
            team.id,
            "purchase",
            &distinct_id,
            json!({"price": 10}),
            start + Duration::seconds(60),
        ));
        events.push(visitor.pageview(
            &format!("{base_url}3/"),
            start + Duration::seconds(60),
        ));
    }

    if team.add_numerical_property("purchase") {
        *team = store.update_team(team).await?;
    }
    store.insert_distinct_ids(distinct_ids).await?;
    let inserted = store.insert_events(events).await?;

    info!(inserted, "created demo persons and events");
    Ok(())
}

/// Creates the actions describing the signup funnel and pins it on a dashboard.
#[instrument(skip_all, fields(team_id = team.id))]
pub async fn create_funnel(store: &Db, team: &Team, base_url: &str) -> Result<(), DemoError> {
    let homepage = store
        .create_action(NewAction::new(
            team.id,
            HOMEPAGE_ACTION,
            vec![ActionStep::for_event("$pageview").with_url(base_url, UrlMatching::Exact)],
        ))
        .await?;
    let signed_up = store
        .create_action(NewAction::new(
            team.id,
            SIGNED_UP_ACTION,
            vec![ActionStep::for_event("$autocapture")
                .with_url(&format!("{base_url}1"), UrlMatching::Contains)
                .with_selector("button")],
        ))
        .await?;
    let paid = store
        .create_action(NewAction::new(
            team.id,
            PAID_ACTION,
            vec![ActionStep::for_event("$autocapture")
                .with_url(&format!("{base_url}2"), UrlMatching::Contains)
                .with_selector("button")],
        ))
        .await?;

    let dashboard = store
        .create_dashboard(NewDashboard {
            team_id: team.id,
            name: FUNNEL_DASHBOARD_NAME.to_string(),
            pinned: true,
            share_token: Some(share_token()),
        })
        .await?;

    let steps: Vec<Value> = [&homepage, &signed_up, &paid]
        .iter()
        .enumerate()
        .map(|(order, action)| {
            json!({"id": action.id, "name": action.name, "order": order, "type": "actions"})
        })
        .collect();
    store
        .create_dashboard_item(NewDashboardItem {
            team_id: team.id,
            dashboard_id: Some(dashboard.id),
            name: FUNNEL_ITEM_NAME.to_string(),
            item_type: "FunnelViz".to_string(),
            filters: json!({"actions": steps, "insight": "FUNNELS"}),
        })
        .await?;

    Ok(())
}

/// Refreshes the materialized event count of every action of the team.
#[instrument(skip_all, fields(team_id = team.id))]
pub async fn recalculate(store: &Db, team: &Team) -> Result<(), DemoError> {
    let events = store.list_events(team.id, None).await?;
    let now = Utc::now();
    for action in store.list_actions(team.id).await? {
        let count = count_matching(&action, &events);
        store.set_action_count(action.id, count, now).await?;
    }
    Ok(())
}

/// Seeds the team unless it already has events or someone else seeded it first.
/// Returns whether this call did the seeding.
#[instrument(skip_all, fields(team_id = team.id))]
pub async fn seed(store: &Db, team: &mut Team, base_url: &str) -> Result<bool, DemoError> {
    if store.team_has_events(team.id).await? {
        return Ok(false);
    }
    if !store.claim_demo_seed(team.id).await? {
        info!("demo data is already being seeded");
        return Ok(false);
    }

    create_anonymous_users(store, team, base_url).await?;
    create_funnel(store, team, base_url).await?;
    recalculate(store, team).await?;

    info!("seeded demo data");
    Ok(true)
}

#[instrument(skip_all, fields(team_id = team.id))]
pub async fn delete_demo_data(store: &Db, team: &Team) -> Result<DemoTeardown, DemoError> {
    let removed = store.delete_demo_data(team.id).await?;
    info!(
        events = removed.events,
        persons = removed.persons,
        actions = removed.actions,
        "deleted demo data"
    );
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use posthog_common::models::{NewTeam, DEMO_NAME_MARKER};
    use posthog_common::store::MemoryStore;

    use super::*;

    const BASE_URL: &str = "http://localhost:8000/demo/";

    async fn setup() -> (Arc<MemoryStore>, Team) {
        let store = Arc::new(MemoryStore::new());
        let organization = store.create_organization("Hogflix").await.unwrap();
        let team = store
            .create_team(NewTeam::new(organization.id, "Demo Project"))
            .await
            .unwrap();
        (store, team)
    }

    fn count(events: &[posthog_common::models::Event], name: &str) -> usize {
        events.iter().filter(|e| e.event == name).count()
    }

    #[tokio::test]
    async fn test_seed_creates_expected_activity() {
        let (store, mut team) = setup().await;

        assert!(seed(store.as_ref(), &mut team, BASE_URL).await.unwrap());

        let persons = store.list_persons(team.id).await.unwrap();
        assert_eq!(persons.len(), DEMO_PERSON_COUNT);
        assert!(persons.iter().all(|p| p.is_demo()));
        assert_eq!(persons.iter().filter(|p| p.is_identified).count(), 34);

        let events = store.list_events(team.id, None).await.unwrap();
        assert_eq!(count(&events, "$pageview"), 145);
        assert_eq!(count(&events, "$autocapture"), 45);
        assert_eq!(count(&events, "purchase"), 2);
        assert_eq!(events.len(), 192);

        let team = store.get_team(team.id).await.unwrap().unwrap();
        assert_eq!(team.event_properties_numerical, vec!["purchase".to_string()]);
    }

    #[tokio::test]
    async fn test_each_visitor_keeps_one_browser() {
        let (store, mut team) = setup().await;
        seed(store.as_ref(), &mut team, BASE_URL).await.unwrap();

        let mut browsers: HashMap<String, HashSet<String>> = HashMap::new();
        for event in store.list_events(team.id, None).await.unwrap() {
            if let Some(browser) = event.properties["$browser"].as_str() {
                browsers
                    .entry(event.distinct_id.clone())
                    .or_default()
                    .insert(browser.to_string());
            }
        }

        assert_eq!(browsers.len(), DEMO_PERSON_COUNT);
        assert!(browsers.values().all(|seen| seen.len() == 1));
    }

    #[tokio::test]
    async fn test_seed_funnel_counts() {
        let (store, mut team) = setup().await;
        seed(store.as_ref(), &mut team, BASE_URL).await.unwrap();

        let counts: Vec<(String, i64)> = store
            .list_actions(team.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| (a.name, a.events_count))
            .collect();
        assert_eq!(
            counts,
            vec![
                (HOMEPAGE_ACTION.to_string(), 100),
                (SIGNED_UP_ACTION.to_string(), 9),
                (PAID_ACTION.to_string(), 2),
            ]
        );

        let items = store.list_dashboard_items(team.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_funnel());
        assert!(items[0].name.contains(DEMO_NAME_MARKER));
        assert_eq!(items[0].filters["actions"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_seed_runs_once() {
        let (store, mut team) = setup().await;

        assert!(seed(store.as_ref(), &mut team, BASE_URL).await.unwrap());
        assert!(!seed(store.as_ref(), &mut team, BASE_URL).await.unwrap());

        assert_eq!(store.list_persons(team.id).await.unwrap().len(), 100);
        assert_eq!(store.list_events(team.id, None).await.unwrap().len(), 192);
    }

    #[tokio::test]
    async fn test_concurrent_seeds_seed_once() {
        let (store, team) = setup().await;

        let mut first_team = team.clone();
        let mut second_team = team.clone();
        let (first, second) = tokio::join!(
            seed(store.as_ref(), &mut first_team, BASE_URL),
            seed(store.as_ref(), &mut second_team, BASE_URL),
        );

        assert!(first.unwrap() ^ second.unwrap());
        assert_eq!(store.list_persons(team.id).await.unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_no_seed_when_team_has_events() {
        let (store, mut team) = setup().await;
        store
            .insert_event(NewEvent::new(
                team.id,
                "$pageview",
                "real-user",
                json!({}),
                Utc::now(),
            ))
            .await
            .unwrap();

        assert!(!seed(store.as_ref(), &mut team, BASE_URL).await.unwrap());
        assert!(store.list_persons(team.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_demo_data_keeps_real_data() {
        let (store, mut team) = setup().await;
        seed(store.as_ref(), &mut team, BASE_URL).await.unwrap();
        store
            .insert_event(NewEvent::new(
                team.id,
                "$pageview",
                "real-user",
                json!({}),
                Utc::now(),
            ))
            .await
            .unwrap();

        let removed = delete_demo_data(store.as_ref(), &team).await.unwrap();
        assert_eq!(removed.events, 192);
        assert_eq!(removed.persons, 100);
        assert_eq!(removed.actions, 3);
        assert_eq!(removed.dashboard_items, 1);

        let events = store.list_events(team.id, None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].distinct_id, "real-user");
        assert!(store.list_actions(team.id).await.unwrap().is_empty());

        let again = delete_demo_data(store.as_ref(), &team).await.unwrap();
        assert_eq!(again, DemoTeardown::default());
    }

    #[test]
    fn test_share_tokens_are_url_safe() {
        let token = share_token();
        assert_eq!(token.len(), 30);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_profiles_parse() {
        let profiles = demo_profiles().unwrap();
        assert!(profiles.iter().all(|p| p.contains_key("email")));
    }
}
