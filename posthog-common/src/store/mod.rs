use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Action, Cohort, Dashboard, DashboardItem, Event, EventDefinition, Funnel, License,
    MembershipLevel, NewAction, NewDashboard, NewDashboardItem, NewEvent, NewPerson, NewTeam,
    NewUser, Organization, OrganizationInvite, Person, PersonDistinctId, PersonId,
    PropertyDefinition, Team, TeamId, User,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{get_pool, PgStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {0}")]
    ConnectionError(sqlx::Error),
    #[error("{command} query failed with: {error}")]
    QueryError { command: String, error: sqlx::Error },
    #[error("{0} not found")]
    NotFound(String),
    #[error("storage is unavailable")]
    Unavailable,
}

impl StoreError {
    pub fn query(command: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
        move |error| StoreError::QueryError {
            command: command.to_owned(),
            error,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row counts removed by a demo teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemoTeardown {
    pub events: u64,
    pub persons: u64,
    pub actions: u64,
    pub dashboard_items: u64,
    pub funnels: u64,
}

/// Persistence used by the API and the worker.
///
/// `PgStore` is the production implementation, `MemoryStore` keeps everything in
/// process for tests and local experiments.
#[async_trait]
pub trait Store {
    async fn ping(&self) -> StoreResult<()>;

    async fn create_organization(&self, name: &str) -> StoreResult<Organization>;
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn get_user_by_api_key(&self, key: &str) -> StoreResult<Option<User>>;
    async fn set_current_team(
        &self,
        user_id: i64,
        organization_id: Uuid,
        team_id: TeamId,
    ) -> StoreResult<()>;
    async fn set_user_active(&self, user_id: i64, is_active: bool) -> StoreResult<()>;
    /// Active users of the whole instance.
    async fn count_users(&self) -> StoreResult<i64>;
    /// Whether any user, active or not, was ever created.
    async fn has_users(&self) -> StoreResult<bool>;
    async fn add_membership(
        &self,
        organization_id: Uuid,
        user_id: i64,
        level: MembershipLevel,
    ) -> StoreResult<()>;
    async fn create_invite(
        &self,
        organization_id: Uuid,
        target_email: &str,
    ) -> StoreResult<OrganizationInvite>;
    async fn count_pending_invites(&self) -> StoreResult<i64>;
    async fn create_license(&self, license: License) -> StoreResult<License>;
    /// The license expiring last among the ones still valid at `now`.
    async fn get_valid_license(&self, now: DateTime<Utc>) -> StoreResult<Option<License>>;

    async fn create_team(&self, team: NewTeam) -> StoreResult<Team>;
    async fn get_team(&self, team_id: TeamId) -> StoreResult<Option<Team>>;
    async fn list_teams(
        &self,
        organization_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Team>>;
    async fn count_teams(&self, organization_id: Uuid) -> StoreResult<i64>;
    async fn list_all_teams(&self) -> StoreResult<Vec<Team>>;
    /// Writes every mutable field of `team` and bumps `updated_at`.
    async fn update_team(&self, team: &Team) -> StoreResult<Team>;
    /// Deletes the team with everything that belongs to it.
    async fn delete_team(&self, team_id: TeamId) -> StoreResult<()>;

    async fn create_persons(&self, persons: Vec<NewPerson>) -> StoreResult<Vec<Person>>;
    async fn get_person(&self, person_id: PersonId) -> StoreResult<Option<Person>>;
    async fn get_person_by_distinct_id(
        &self,
        team_id: TeamId,
        distinct_id: &str,
    ) -> StoreResult<Option<Person>>;
    async fn update_person(&self, person: &Person) -> StoreResult<()>;
    async fn delete_person(&self, person_id: PersonId) -> StoreResult<()>;
    async fn list_persons(&self, team_id: TeamId) -> StoreResult<Vec<Person>>;
    async fn count_persons(&self) -> StoreResult<i64>;
    async fn insert_distinct_ids(&self, distinct_ids: Vec<PersonDistinctId>) -> StoreResult<()>;
    async fn list_distinct_ids(&self, person_id: PersonId) -> StoreResult<Vec<String>>;
    async fn move_distinct_ids(&self, from: PersonId, to: PersonId) -> StoreResult<()>;

    async fn insert_event(&self, event: NewEvent) -> StoreResult<Event>;
    async fn insert_events(&self, events: Vec<NewEvent>) -> StoreResult<u64>;
    async fn get_event(&self, event_id: i64) -> StoreResult<Option<Event>>;
    async fn team_has_events(&self, team_id: TeamId) -> StoreResult<bool>;
    /// Events of the team ordered by timestamp, optionally only the ones at or after `since`.
    async fn list_events(
        &self,
        team_id: TeamId,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Event>>;
    async fn count_events_since(&self, since: DateTime<Utc>) -> StoreResult<i64>;
    async fn delete_events_before(
        &self,
        team_id: TeamId,
        event: &str,
        before: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn create_action(&self, action: NewAction) -> StoreResult<Action>;
    async fn get_action(&self, action_id: i64) -> StoreResult<Option<Action>>;
    /// Non deleted actions of the team, ordered by id.
    async fn list_actions(&self, team_id: TeamId) -> StoreResult<Vec<Action>>;
    async fn set_action_count(
        &self,
        action_id: i64,
        count: i64,
        calculated_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn create_dashboard(&self, dashboard: NewDashboard) -> StoreResult<Dashboard>;
    async fn create_dashboard_item(&self, item: NewDashboardItem) -> StoreResult<DashboardItem>;
    async fn list_dashboard_items(&self, team_id: TeamId) -> StoreResult<Vec<DashboardItem>>;
    async fn update_dashboard_item_result(
        &self,
        item_id: i64,
        result: Value,
        refreshed_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn create_funnel(&self, team_id: TeamId, name: &str, filters: Value)
        -> StoreResult<Funnel>;
    async fn list_funnels(&self, team_id: TeamId) -> StoreResult<Vec<Funnel>>;

    async fn create_cohort(&self, team_id: TeamId, name: &str, groups: Value)
        -> StoreResult<Cohort>;
    async fn get_cohort(&self, cohort_id: i64) -> StoreResult<Option<Cohort>>;
    async fn set_cohort_count(
        &self,
        cohort_id: i64,
        count: i64,
        calculated_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn list_event_definitions(&self, team_id: TeamId) -> StoreResult<Vec<EventDefinition>>;
    async fn list_property_definitions(
        &self,
        team_id: TeamId,
    ) -> StoreResult<Vec<PropertyDefinition>>;
    /// Makes the team definitions match exactly the given names, keeping usage of the
    /// ones that survive.
    async fn sync_definitions(
        &self,
        team_id: TeamId,
        event_names: &[String],
        properties: &[(String, bool)],
    ) -> StoreResult<()>;
    async fn upsert_event_definition(&self, definition: EventDefinition) -> StoreResult<()>;
    async fn upsert_property_definition(&self, definition: PropertyDefinition)
        -> StoreResult<()>;

    /// Records that demo data is being seeded for the team. Returns false when
    /// another caller already claimed it.
    async fn claim_demo_seed(&self, team_id: TeamId) -> StoreResult<bool>;
    /// Removes all demo rows of the team and its seed marker, all or nothing.
    async fn delete_demo_data(&self, team_id: TeamId) -> StoreResult<DemoTeardown>;
}
