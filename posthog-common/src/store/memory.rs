use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::{DemoTeardown, Store, StoreError, StoreResult};
use crate::models::{
    Action, Cohort, Dashboard, DashboardItem, Event, EventDefinition, Funnel, License,
    MembershipLevel, NewAction, NewDashboard, NewDashboardItem, NewEvent, NewPerson, NewTeam,
    NewUser, Organization, OrganizationInvite, Person, PersonDistinctId, PersonId,
    PropertyDefinition, Team, TeamId, User, DEMO_NAME_MARKER,
};

#[derive(Default)]
struct Tables {
    organizations: Vec<Organization>,
    users: Vec<User>,
    memberships: Vec<(Uuid, i64, MembershipLevel)>,
    invites: Vec<OrganizationInvite>,
    licenses: Vec<License>,
    teams: Vec<Team>,
    persons: Vec<Person>,
    distinct_ids: Vec<PersonDistinctId>,
    events: Vec<Event>,
    actions: Vec<Action>,
    dashboards: Vec<Dashboard>,
    dashboard_items: Vec<DashboardItem>,
    funnels: Vec<Funnel>,
    cohorts: Vec<Cohort>,
    event_definitions: Vec<EventDefinition>,
    property_definitions: Vec<PropertyDefinition>,
    demo_seeds: HashSet<TeamId>,
    sequences: HashMap<&'static str, i64>,
}

impl Tables {
    fn next_id(&mut self, table: &'static str) -> i64 {
        let id = self.sequences.entry(table).or_insert(0);
        *id += 1;
        *id
    }
}

/// A `Store` keeping every table in memory. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `ping` fail, as if the database went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut flag) = self.unavailable.lock() {
            *flag = unavailable;
        }
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| StoreError::Unavailable)
    }
}

fn person_demo_distinct_ids(
    tables: &Tables,
    team_id: TeamId,
) -> (HashSet<PersonId>, HashSet<String>) {
    let persons: HashSet<PersonId> = tables
        .persons
        .iter()
        .filter(|p| p.team_id == team_id && p.is_demo())
        .map(|p| p.id)
        .collect();
    let distinct_ids = tables
        .distinct_ids
        .iter()
        .filter(|d| d.team_id == team_id && persons.contains(&d.person_id))
        .map(|d| d.distinct_id.clone())
        .collect();
    (persons, distinct_ids)
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        match self.unavailable.lock() {
            Ok(flag) if !*flag => Ok(()),
            _ => Err(StoreError::Unavailable),
        }
    }

    async fn create_organization(&self, name: &str) -> StoreResult<Organization> {
        let organization = Organization {
            id: Uuid::now_v7(),
            name: name.to_owned(),
            created_at: Utc::now(),
        };
        self.tables()?.organizations.push(organization.clone());
        Ok(organization)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables()?;
        let user = User {
            id: tables.next_id("user"),
            uuid: Uuid::now_v7(),
            email: user.email,
            first_name: user.first_name,
            personal_api_key: user.personal_api_key,
            current_organization_id: user.current_organization_id,
            current_team_id: user.current_team_id,
            is_active: true,
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user_by_api_key(&self, key: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables()?
            .users
            .iter()
            .find(|u| u.is_active && u.personal_api_key.as_deref() == Some(key))
            .cloned())
    }

    async fn set_current_team(
        &self,
        user_id: i64,
        organization_id: Uuid,
        team_id: TeamId,
    ) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        user.current_organization_id = Some(organization_id);
        user.current_team_id = Some(team_id);
        Ok(())
    }

    async fn set_user_active(&self, user_id: i64, is_active: bool) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?;
        user.is_active = is_active;
        Ok(())
    }

    async fn count_users(&self) -> StoreResult<i64> {
        Ok(self.tables()?.users.iter().filter(|u| u.is_active).count() as i64)
    }

    async fn has_users(&self) -> StoreResult<bool> {
        Ok(!self.tables()?.users.is_empty())
    }

    async fn add_membership(
        &self,
        organization_id: Uuid,
        user_id: i64,
        level: MembershipLevel,
    ) -> StoreResult<()> {
        let mut tables = self.tables()?;
        tables
            .memberships
            .retain(|(org, user, _)| !(*org == organization_id && *user == user_id));
        tables.memberships.push((organization_id, user_id, level));
        Ok(())
    }

    async fn create_invite(
        &self,
        organization_id: Uuid,
        target_email: &str,
    ) -> StoreResult<OrganizationInvite> {
        let invite = OrganizationInvite {
            id: Uuid::now_v7(),
            organization_id,
            target_email: target_email.to_owned(),
            created_at: Utc::now(),
        };
        self.tables()?.invites.push(invite.clone());
        Ok(invite)
    }

    async fn count_pending_invites(&self) -> StoreResult<i64> {
        Ok(self.tables()?.invites.len() as i64)
    }

    async fn create_license(&self, license: License) -> StoreResult<License> {
        self.tables()?.licenses.push(license.clone());
        Ok(license)
    }

    async fn get_valid_license(&self, now: DateTime<Utc>) -> StoreResult<Option<License>> {
        Ok(self
            .tables()?
            .licenses
            .iter()
            .filter(|l| l.is_valid(now))
            .max_by_key(|l| l.valid_until)
            .cloned())
    }

    async fn create_team(&self, team: NewTeam) -> StoreResult<Team> {
        let mut tables = self.tables()?;
        let now = Utc::now();
        let team = Team {
            id: tables.next_id("team") as TeamId,
            uuid: Uuid::now_v7(),
            organization_id: team.organization_id,
            api_token: team.api_token,
            name: team.name,
            app_urls: Vec::new(),
            slack_incoming_webhook: None,
            created_at: now,
            updated_at: now,
            anonymize_ips: false,
            completed_snippet_onboarding: false,
            ingested_event: false,
            test_account_filters: Value::Array(Vec::new()),
            is_demo: team.is_demo,
            timezone: team.timezone,
            data_attributes: Value::Array(vec![Value::String("data-attr".to_string())]),
            session_recording_opt_in: false,
            session_recording_retention_period_days: None,
            event_names: Vec::new(),
            event_properties: Vec::new(),
            event_properties_numerical: Vec::new(),
        };
        tables.teams.push(team.clone());
        Ok(team)
    }

    async fn get_team(&self, team_id: TeamId) -> StoreResult<Option<Team>> {
        Ok(self
            .tables()?
            .teams
            .iter()
            .find(|t| t.id == team_id)
            .cloned())
    }

    async fn list_teams(
        &self,
        organization_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Team>> {
        let tables = self.tables()?;
        let mut teams: Vec<Team> = tables
            .teams
            .iter()
            .filter(|t| t.organization_id == organization_id)
            .cloned()
            .collect();
        teams.sort_by_key(|t| t.id);
        Ok(teams
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_teams(&self, organization_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .tables()?
            .teams
            .iter()
            .filter(|t| t.organization_id == organization_id)
            .count() as i64)
    }

    async fn list_all_teams(&self) -> StoreResult<Vec<Team>> {
        let mut teams = self.tables()?.teams.clone();
        teams.sort_by_key(|t| t.id);
        Ok(teams)
    }

    async fn update_team(&self, team: &Team) -> StoreResult<Team> {
        let mut tables = self.tables()?;
        let stored = tables
            .teams
            .iter_mut()
            .find(|t| t.id == team.id)
            .ok_or_else(|| StoreError::NotFound(format!("team {}", team.id)))?;
        *stored = Team {
            updated_at: Utc::now(),
            ..team.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_team(&self, team_id: TeamId) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let action_ids: HashSet<i64> = tables
            .actions
            .iter()
            .filter(|a| a.team_id == team_id)
            .map(|a| a.id)
            .collect();
        tables.actions.retain(|a| !action_ids.contains(&a.id));
        tables.events.retain(|e| e.team_id != team_id);
        tables.distinct_ids.retain(|d| d.team_id != team_id);
        tables.persons.retain(|p| p.team_id != team_id);
        tables.dashboards.retain(|d| d.team_id != team_id);
        tables.dashboard_items.retain(|d| d.team_id != team_id);
        tables.funnels.retain(|f| f.team_id != team_id);
        tables.cohorts.retain(|c| c.team_id != team_id);
        tables.event_definitions.retain(|d| d.team_id != team_id);
        tables.property_definitions.retain(|d| d.team_id != team_id);
        tables.demo_seeds.remove(&team_id);
        for user in tables.users.iter_mut() {
            if user.current_team_id == Some(team_id) {
                user.current_team_id = None;
            }
        }
        tables.teams.retain(|t| t.id != team_id);
        Ok(())
    }

    async fn create_persons(&self, persons: Vec<NewPerson>) -> StoreResult<Vec<Person>> {
        let mut tables = self.tables()?;
        let now = Utc::now();
        let mut created = Vec::with_capacity(persons.len());
        for person in persons {
            let person = Person {
                id: tables.next_id("person"),
                uuid: Uuid::now_v7(),
                team_id: person.team_id,
                created_at: now,
                properties: person.properties,
                is_identified: person.is_identified,
            };
            tables.persons.push(person.clone());
            created.push(person);
        }
        Ok(created)
    }

    async fn get_person(&self, person_id: PersonId) -> StoreResult<Option<Person>> {
        Ok(self
            .tables()?
            .persons
            .iter()
            .find(|p| p.id == person_id)
            .cloned())
    }

    async fn get_person_by_distinct_id(
        &self,
        team_id: TeamId,
        distinct_id: &str,
    ) -> StoreResult<Option<Person>> {
        let tables = self.tables()?;
        let Some(pdi) = tables
            .distinct_ids
            .iter()
            .find(|d| d.team_id == team_id && d.distinct_id == distinct_id)
        else {
            return Ok(None);
        };
        Ok(tables
            .persons
            .iter()
            .find(|p| p.id == pdi.person_id)
            .cloned())
    }

    async fn update_person(&self, person: &Person) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let stored = tables
            .persons
            .iter_mut()
            .find(|p| p.id == person.id)
            .ok_or_else(|| StoreError::NotFound(format!("person {}", person.id)))?;
        stored.properties = person.properties.clone();
        stored.is_identified = person.is_identified;
        Ok(())
    }

    async fn delete_person(&self, person_id: PersonId) -> StoreResult<()> {
        let mut tables = self.tables()?;
        tables.distinct_ids.retain(|d| d.person_id != person_id);
        tables.persons.retain(|p| p.id != person_id);
        Ok(())
    }

    async fn list_persons(&self, team_id: TeamId) -> StoreResult<Vec<Person>> {
        Ok(self
            .tables()?
            .persons
            .iter()
            .filter(|p| p.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn count_persons(&self) -> StoreResult<i64> {
        Ok(self.tables()?.persons.len() as i64)
    }

    async fn insert_distinct_ids(&self, distinct_ids: Vec<PersonDistinctId>) -> StoreResult<()> {
        let mut tables = self.tables()?;
        for pdi in distinct_ids {
            let taken = tables
                .distinct_ids
                .iter()
                .any(|d| d.team_id == pdi.team_id && d.distinct_id == pdi.distinct_id);
            if !taken {
                tables.distinct_ids.push(pdi);
            }
        }
        Ok(())
    }

    async fn list_distinct_ids(&self, person_id: PersonId) -> StoreResult<Vec<String>> {
        Ok(self
            .tables()?
            .distinct_ids
            .iter()
            .filter(|d| d.person_id == person_id)
            .map(|d| d.distinct_id.clone())
            .collect())
    }

    async fn move_distinct_ids(&self, from: PersonId, to: PersonId) -> StoreResult<()> {
        let mut tables = self.tables()?;
        for pdi in tables.distinct_ids.iter_mut() {
            if pdi.person_id == from {
                pdi.person_id = to;
            }
        }
        Ok(())
    }

    async fn insert_event(&self, event: NewEvent) -> StoreResult<Event> {
        let mut tables = self.tables()?;
        let event = Event {
            id: tables.next_id("event"),
            uuid: Uuid::now_v7(),
            team_id: event.team_id,
            event: event.event,
            distinct_id: event.distinct_id,
            properties: event.properties,
            elements: event.elements,
            timestamp: event.timestamp,
            created_at: Utc::now(),
        };
        tables.events.push(event.clone());
        Ok(event)
    }

    async fn insert_events(&self, events: Vec<NewEvent>) -> StoreResult<u64> {
        let count = events.len() as u64;
        for event in events {
            self.insert_event(event).await?;
        }
        Ok(count)
    }

    async fn get_event(&self, event_id: i64) -> StoreResult<Option<Event>> {
        Ok(self
            .tables()?
            .events
            .iter()
            .find(|e| e.id == event_id)
            .cloned())
    }

    async fn team_has_events(&self, team_id: TeamId) -> StoreResult<bool> {
        Ok(self.tables()?.events.iter().any(|e| e.team_id == team_id))
    }

    async fn list_events(
        &self,
        team_id: TeamId,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .tables()?
            .events
            .iter()
            .filter(|e| e.team_id == team_id && since.map_or(true, |s| e.timestamp >= s))
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.timestamp, e.id));
        Ok(events)
    }

    async fn count_events_since(&self, since: DateTime<Utc>) -> StoreResult<i64> {
        Ok(self
            .tables()?
            .events
            .iter()
            .filter(|e| e.timestamp >= since)
            .count() as i64)
    }

    async fn delete_events_before(
        &self,
        team_id: TeamId,
        event: &str,
        before: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut tables = self.tables()?;
        let initial = tables.events.len();
        tables
            .events
            .retain(|e| !(e.team_id == team_id && e.event == event && e.timestamp < before));
        Ok((initial - tables.events.len()) as u64)
    }

    async fn create_action(&self, action: NewAction) -> StoreResult<Action> {
        let mut tables = self.tables()?;
        let action = Action {
            id: tables.next_id("action"),
            team_id: action.team_id,
            name: action.name,
            created_at: Utc::now(),
            deleted: false,
            post_to_slack: action.post_to_slack,
            events_count: 0,
            last_calculated_at: None,
            steps: action.steps,
        };
        tables.actions.push(action.clone());
        Ok(action)
    }

    async fn get_action(&self, action_id: i64) -> StoreResult<Option<Action>> {
        Ok(self
            .tables()?
            .actions
            .iter()
            .find(|a| a.id == action_id)
            .cloned())
    }

    async fn list_actions(&self, team_id: TeamId) -> StoreResult<Vec<Action>> {
        Ok(self
            .tables()?
            .actions
            .iter()
            .filter(|a| a.team_id == team_id && !a.deleted)
            .cloned()
            .collect())
    }

    async fn set_action_count(
        &self,
        action_id: i64,
        count: i64,
        calculated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let action = tables
            .actions
            .iter_mut()
            .find(|a| a.id == action_id)
            .ok_or_else(|| StoreError::NotFound(format!("action {action_id}")))?;
        action.events_count = count;
        action.last_calculated_at = Some(calculated_at);
        Ok(())
    }

    async fn create_dashboard(&self, dashboard: NewDashboard) -> StoreResult<Dashboard> {
        let mut tables = self.tables()?;
        let dashboard = Dashboard {
            id: tables.next_id("dashboard"),
            team_id: dashboard.team_id,
            name: dashboard.name,
            pinned: dashboard.pinned,
            share_token: dashboard.share_token,
            created_at: Utc::now(),
        };
        tables.dashboards.push(dashboard.clone());
        Ok(dashboard)
    }

    async fn create_dashboard_item(&self, item: NewDashboardItem) -> StoreResult<DashboardItem> {
        let mut tables = self.tables()?;
        let item = DashboardItem {
            id: tables.next_id("dashboard_item"),
            team_id: item.team_id,
            dashboard_id: item.dashboard_id,
            name: item.name,
            item_type: item.item_type,
            filters: item.filters,
            result: None,
            last_refresh: None,
            created_at: Utc::now(),
        };
        tables.dashboard_items.push(item.clone());
        Ok(item)
    }

    async fn list_dashboard_items(&self, team_id: TeamId) -> StoreResult<Vec<DashboardItem>> {
        Ok(self
            .tables()?
            .dashboard_items
            .iter()
            .filter(|i| i.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn update_dashboard_item_result(
        &self,
        item_id: i64,
        result: Value,
        refreshed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let item = tables
            .dashboard_items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| StoreError::NotFound(format!("dashboard item {item_id}")))?;
        item.result = Some(result);
        item.last_refresh = Some(refreshed_at);
        Ok(())
    }

    async fn create_funnel(
        &self,
        team_id: TeamId,
        name: &str,
        filters: Value,
    ) -> StoreResult<Funnel> {
        let mut tables = self.tables()?;
        let funnel = Funnel {
            id: tables.next_id("funnel"),
            team_id,
            name: name.to_owned(),
            filters,
            created_at: Utc::now(),
        };
        tables.funnels.push(funnel.clone());
        Ok(funnel)
    }

    async fn list_funnels(&self, team_id: TeamId) -> StoreResult<Vec<Funnel>> {
        Ok(self
            .tables()?
            .funnels
            .iter()
            .filter(|f| f.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn create_cohort(
        &self,
        team_id: TeamId,
        name: &str,
        groups: Value,
    ) -> StoreResult<Cohort> {
        let mut tables = self.tables()?;
        let cohort = Cohort {
            id: tables.next_id("cohort"),
            team_id,
            name: name.to_owned(),
            groups,
            count: None,
            is_calculating: false,
            last_calculation: None,
        };
        tables.cohorts.push(cohort.clone());
        Ok(cohort)
    }

    async fn get_cohort(&self, cohort_id: i64) -> StoreResult<Option<Cohort>> {
        Ok(self
            .tables()?
            .cohorts
            .iter()
            .find(|c| c.id == cohort_id)
            .cloned())
    }

    async fn set_cohort_count(
        &self,
        cohort_id: i64,
        count: i64,
        calculated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let cohort = tables
            .cohorts
            .iter_mut()
            .find(|c| c.id == cohort_id)
            .ok_or_else(|| StoreError::NotFound(format!("cohort {cohort_id}")))?;
        cohort.count = Some(count);
        cohort.is_calculating = false;
        cohort.last_calculation = Some(calculated_at);
        Ok(())
    }

    async fn list_event_definitions(&self, team_id: TeamId) -> StoreResult<Vec<EventDefinition>> {
        Ok(self
            .tables()?
            .event_definitions
            .iter()
            .filter(|d| d.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn list_property_definitions(
        &self,
        team_id: TeamId,
    ) -> StoreResult<Vec<PropertyDefinition>> {
        Ok(self
            .tables()?
            .property_definitions
            .iter()
            .filter(|d| d.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn sync_definitions(
        &self,
        team_id: TeamId,
        event_names: &[String],
        properties: &[(String, bool)],
    ) -> StoreResult<()> {
        let mut tables = self.tables()?;

        tables
            .event_definitions
            .retain(|d| d.team_id != team_id || event_names.contains(&d.name));
        for name in event_names {
            let exists = tables
                .event_definitions
                .iter()
                .any(|d| d.team_id == team_id && &d.name == name);
            if !exists {
                tables.event_definitions.push(EventDefinition {
                    team_id,
                    name: name.clone(),
                    volume_30_day: None,
                    query_usage_30_day: None,
                });
            }
        }

        tables
            .property_definitions
            .retain(|d| d.team_id != team_id || properties.iter().any(|(n, _)| n == &d.name));
        for (name, is_numerical) in properties {
            match tables
                .property_definitions
                .iter_mut()
                .find(|d| d.team_id == team_id && &d.name == name)
            {
                Some(definition) => definition.is_numerical = *is_numerical,
                None => tables.property_definitions.push(PropertyDefinition {
                    team_id,
                    name: name.clone(),
                    is_numerical: *is_numerical,
                    volume_30_day: None,
                    query_usage_30_day: None,
                }),
            }
        }
        Ok(())
    }

    async fn upsert_event_definition(&self, definition: EventDefinition) -> StoreResult<()> {
        let mut tables = self.tables()?;
        tables
            .event_definitions
            .retain(|d| !(d.team_id == definition.team_id && d.name == definition.name));
        tables.event_definitions.push(definition);
        Ok(())
    }

    async fn upsert_property_definition(
        &self,
        definition: PropertyDefinition,
    ) -> StoreResult<()> {
        let mut tables = self.tables()?;
        tables
            .property_definitions
            .retain(|d| !(d.team_id == definition.team_id && d.name == definition.name));
        tables.property_definitions.push(definition);
        Ok(())
    }

    async fn claim_demo_seed(&self, team_id: TeamId) -> StoreResult<bool> {
        Ok(self.tables()?.demo_seeds.insert(team_id))
    }

    async fn delete_demo_data(&self, team_id: TeamId) -> StoreResult<DemoTeardown> {
        // One lock for the whole teardown.
        let mut tables = self.tables()?;
        let (persons, distinct_ids) = person_demo_distinct_ids(&tables, team_id);
        let mut teardown = DemoTeardown::default();

        let before = tables.events.len();
        tables
            .events
            .retain(|e| !(e.team_id == team_id && distinct_ids.contains(&e.distinct_id)));
        teardown.events = (before - tables.events.len()) as u64;

        tables
            .distinct_ids
            .retain(|d| !(d.team_id == team_id && persons.contains(&d.person_id)));
        let before = tables.persons.len();
        tables.persons.retain(|p| !persons.contains(&p.id));
        teardown.persons = (before - tables.persons.len()) as u64;

        let is_demo_named =
            |team: TeamId, name: &str| team == team_id && name.contains(DEMO_NAME_MARKER);

        let before = tables.funnels.len();
        tables.funnels.retain(|f| !is_demo_named(f.team_id, &f.name));
        teardown.funnels = (before - tables.funnels.len()) as u64;

        let before = tables.actions.len();
        tables.actions.retain(|a| !is_demo_named(a.team_id, &a.name));
        teardown.actions = (before - tables.actions.len()) as u64;

        let before = tables.dashboard_items.len();
        tables
            .dashboard_items
            .retain(|i| !is_demo_named(i.team_id, &i.name));
        teardown.dashboard_items = (before - tables.dashboard_items.len()) as u64;

        tables.demo_seeds.remove(&team_id);
        Ok(teardown)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn team(store: &MemoryStore) -> Team {
        let organization = store.create_organization("Hedgehogs").await.unwrap();
        store
            .create_team(NewTeam::new(organization.id, "Default project"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_distinct_ids_are_unique_per_team() {
        let store = MemoryStore::new();
        let team = team(&store).await;
        let persons = store
            .create_persons(vec![
                NewPerson {
                    team_id: team.id,
                    properties: json!({}),
                    is_identified: false,
                },
                NewPerson {
                    team_id: team.id,
                    properties: json!({}),
                    is_identified: false,
                },
            ])
            .await
            .unwrap();

        store
            .insert_distinct_ids(vec![
                PersonDistinctId {
                    team_id: team.id,
                    person_id: persons[0].id,
                    distinct_id: "anon".to_string(),
                },
                PersonDistinctId {
                    team_id: team.id,
                    person_id: persons[1].id,
                    distinct_id: "anon".to_string(),
                },
            ])
            .await
            .unwrap();

        let person = store
            .get_person_by_distinct_id(team.id, "anon")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(person.id, persons[0].id);
        assert!(store.list_distinct_ids(persons[1].id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_demo_seed_can_only_be_claimed_once() {
        let store = MemoryStore::new();
        let team = team(&store).await;

        assert!(store.claim_demo_seed(team.id).await.unwrap());
        assert!(!store.claim_demo_seed(team.id).await.unwrap());

        store.delete_demo_data(team.id).await.unwrap();
        assert!(store.claim_demo_seed(team.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_demo_data_keeps_real_rows() {
        let store = MemoryStore::new();
        let team = team(&store).await;
        let persons = store
            .create_persons(vec![
                NewPerson {
                    team_id: team.id,
                    properties: json!({"is_demo": true}),
                    is_identified: false,
                },
                NewPerson {
                    team_id: team.id,
                    properties: json!({"email": "real@posthog.com"}),
                    is_identified: true,
                },
            ])
            .await
            .unwrap();
        store
            .insert_distinct_ids(vec![
                PersonDistinctId {
                    team_id: team.id,
                    person_id: persons[0].id,
                    distinct_id: "demo".to_string(),
                },
                PersonDistinctId {
                    team_id: team.id,
                    person_id: persons[1].id,
                    distinct_id: "real".to_string(),
                },
            ])
            .await
            .unwrap();
        for distinct_id in ["demo", "real"] {
            store
                .insert_event(NewEvent::new(
                    team.id,
                    "$pageview",
                    distinct_id,
                    json!({}),
                    Utc::now(),
                ))
                .await
                .unwrap();
        }
        store
            .create_action(NewAction::new(team.id, "HogFlix paid", vec![]))
            .await
            .unwrap();
        store
            .create_action(NewAction::new(team.id, "Signed up", vec![]))
            .await
            .unwrap();
        store
            .create_funnel(team.id, "HogFlix funnel", json!({}))
            .await
            .unwrap();

        let teardown = store.delete_demo_data(team.id).await.unwrap();

        assert_eq!(
            teardown,
            DemoTeardown {
                events: 1,
                persons: 1,
                actions: 1,
                dashboard_items: 0,
                funnels: 1,
            }
        );
        let events = store.list_events(team.id, None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].distinct_id, "real");
        assert_eq!(store.list_persons(team.id).await.unwrap().len(), 1);
        assert_eq!(store.list_actions(team.id).await.unwrap()[0].name, "Signed up");

        assert_eq!(
            store.delete_demo_data(team.id).await.unwrap(),
            DemoTeardown::default()
        );
    }

    #[tokio::test]
    async fn test_list_teams_paginates_by_id() {
        let store = MemoryStore::new();
        let organization = store.create_organization("Hedgehogs").await.unwrap();
        for name in ["a", "b", "c"] {
            store
                .create_team(NewTeam::new(organization.id, name))
                .await
                .unwrap();
        }

        let page = store.list_teams(organization.id, 2, 1).await.unwrap();
        let names: Vec<&str> = page.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(store.count_teams(organization.id).await.unwrap(), 3);
    }
}
