use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    types::Json,
    Postgres, QueryBuilder,
};
use tracing::info;
use uuid::Uuid;

use super::{DemoTeardown, Store, StoreError, StoreResult};
use crate::models::{
    Action, ActionStep, Cohort, Dashboard, DashboardItem, Element, Event, EventDefinition,
    Funnel, License, MembershipLevel, NewAction, NewDashboard, NewDashboardItem, NewEvent,
    NewPerson, NewTeam, NewUser, Organization, OrganizationInvite, Person, PersonDistinctId,
    PersonId, PropertyDefinition, Team, TeamId, User, DEMO_NAME_MARKER,
};

/// Keeps multi-row inserts well below the Postgres bind parameter limit.
const INSERT_BATCH_SIZE: usize = 1000;

pub async fn get_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    uuid: Uuid,
    team_id: TeamId,
    event: String,
    distinct_id: String,
    properties: Value,
    elements: Json<Vec<Element>>,
    timestamp: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            uuid: row.uuid,
            team_id: row.team_id,
            event: row.event,
            distinct_id: row.distinct_id,
            properties: row.properties,
            elements: row.elements.0,
            timestamp: row.timestamp,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: i64,
    team_id: TeamId,
    name: String,
    created_at: DateTime<Utc>,
    deleted: bool,
    post_to_slack: bool,
    events_count: i64,
    last_calculated_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct ActionStepRow {
    action_id: i64,
    event: Option<String>,
    url: Option<String>,
    url_matching: String,
    selector: Option<String>,
    tag_name: Option<String>,
    text: Option<String>,
    href: Option<String>,
}

impl From<ActionStepRow> for ActionStep {
    fn from(row: ActionStepRow) -> Self {
        ActionStep {
            event: row.event,
            url: row.url,
            url_matching: row.url_matching.parse().unwrap_or_default(),
            selector: row.selector,
            tag_name: row.tag_name,
            text: row.text,
            href: row.href,
        }
    }
}

/// `Store` backed by the Postgres schema under `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::ConnectionError(e.into()))?;
        info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_actions(&self, rows: Vec<ActionRow>) -> StoreResult<Vec<Action>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let steps: Vec<ActionStepRow> = sqlx::query_as(
            r#"
SELECT action_id, event, url, url_matching, selector, tag_name, text, href
FROM posthog_actionstep
WHERE action_id = ANY($1)
ORDER BY id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("SELECT actionstep"))?;

        let mut steps_by_action: HashMap<i64, Vec<ActionStep>> = HashMap::new();
        for step in steps {
            steps_by_action
                .entry(step.action_id)
                .or_default()
                .push(step.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| Action {
                steps: steps_by_action.remove(&row.id).unwrap_or_default(),
                id: row.id,
                team_id: row.team_id,
                name: row.name,
                created_at: row.created_at,
                deleted: row.deleted,
                post_to_slack: row.post_to_slack,
                events_count: row.events_count,
                last_calculated_at: row.last_calculated_at,
            })
            .collect())
    }

    async fn count(&self, query: &'static str) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>(query)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::query("COUNT"))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StoreError::ConnectionError)?;
        Ok(())
    }

    async fn create_organization(&self, name: &str) -> StoreResult<Organization> {
        sqlx::query_as::<_, Organization>(
            "INSERT INTO posthog_organization (id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::query("INSERT organization"))
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
INSERT INTO posthog_user
    (uuid, email, first_name, personal_api_key, current_organization_id, current_team_id)
VALUES
    ($1, $2, $3, $4, $5, $6)
RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.personal_api_key)
        .bind(user.current_organization_id)
        .bind(user.current_team_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::query("INSERT user"))
    }

    async fn get_user_by_api_key(&self, key: &str) -> StoreResult<Option<User>> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM posthog_user WHERE personal_api_key = $1 AND is_active",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::query("SELECT user"))
    }

    async fn set_current_team(
        &self,
        user_id: i64,
        organization_id: Uuid,
        team_id: TeamId,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE posthog_user SET current_organization_id = $2, current_team_id = $3 \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(organization_id)
        .bind(team_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("UPDATE user"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    async fn set_user_active(&self, user_id: i64, is_active: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE posthog_user SET is_active = $2 WHERE id = $1")
            .bind(user_id)
            .bind(is_active)
            .execute(&self.pool)
            .await
            .map_err(StoreError::query("UPDATE"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    async fn count_users(&self) -> StoreResult<i64> {
        self.count("SELECT COUNT(*) FROM posthog_user WHERE is_active")
            .await
    }

    async fn has_users(&self) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM posthog_user)")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::query("SELECT"))
    }

    async fn add_membership(
        &self,
        organization_id: Uuid,
        user_id: i64,
        level: MembershipLevel,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
INSERT INTO posthog_organizationmembership (organization_id, user_id, level)
VALUES ($1, $2, $3)
ON CONFLICT (organization_id, user_id) DO UPDATE SET level = EXCLUDED.level
            "#,
        )
        .bind(organization_id)
        .bind(user_id)
        .bind(level.as_i16())
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("INSERT organizationmembership"))?;
        Ok(())
    }

    async fn create_invite(
        &self,
        organization_id: Uuid,
        target_email: &str,
    ) -> StoreResult<OrganizationInvite> {
        sqlx::query_as::<_, OrganizationInvite>(
            r#"
INSERT INTO posthog_organizationinvite (id, organization_id, target_email)
VALUES ($1, $2, $3)
RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(organization_id)
        .bind(target_email)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::query("INSERT organizationinvite"))
    }

    async fn count_pending_invites(&self) -> StoreResult<i64> {
        self.count("SELECT COUNT(*) FROM posthog_organizationinvite")
            .await
    }

    async fn create_license(&self, license: License) -> StoreResult<License> {
        sqlx::query_as::<_, License>(
            r#"
INSERT INTO ee_license (key, plan, valid_until, max_users)
VALUES ($1, $2, $3, $4)
RETURNING *
            "#,
        )
        .bind(&license.key)
        .bind(&license.plan)
        .bind(license.valid_until)
        .bind(license.max_users)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::query("INSERT license"))
    }

    async fn get_valid_license(&self, now: DateTime<Utc>) -> StoreResult<Option<License>> {
        sqlx::query_as::<_, License>(
            "SELECT * FROM ee_license WHERE valid_until > $1 ORDER BY valid_until DESC LIMIT 1",
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::query("SELECT license"))
    }

    async fn create_team(&self, team: NewTeam) -> StoreResult<Team> {
        sqlx::query_as::<_, Team>(
            r#"
INSERT INTO posthog_team (uuid, organization_id, api_token, name, timezone, is_demo)
VALUES ($1, $2, $3, $4, $5, $6)
RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(team.organization_id)
        .bind(&team.api_token)
        .bind(&team.name)
        .bind(&team.timezone)
        .bind(team.is_demo)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::query("INSERT team"))
    }

    async fn get_team(&self, team_id: TeamId) -> StoreResult<Option<Team>> {
        sqlx::query_as::<_, Team>("SELECT * FROM posthog_team WHERE id = $1")
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::query("SELECT team"))
    }

    async fn list_teams(
        &self,
        organization_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Team>> {
        sqlx::query_as::<_, Team>(
            "SELECT * FROM posthog_team WHERE organization_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(organization_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("SELECT team"))
    }

    async fn count_teams(&self, organization_id: Uuid) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posthog_team WHERE organization_id = $1")
            .bind(organization_id)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::query("COUNT team"))
    }

    async fn list_all_teams(&self) -> StoreResult<Vec<Team>> {
        sqlx::query_as::<_, Team>("SELECT * FROM posthog_team ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::query("SELECT team"))
    }

    async fn update_team(&self, team: &Team) -> StoreResult<Team> {
        sqlx::query_as::<_, Team>(
            r#"
UPDATE posthog_team SET
    name = $2,
    api_token = $3,
    app_urls = $4,
    slack_incoming_webhook = $5,
    anonymize_ips = $6,
    completed_snippet_onboarding = $7,
    ingested_event = $8,
    test_account_filters = $9,
    timezone = $10,
    data_attributes = $11,
    session_recording_opt_in = $12,
    session_recording_retention_period_days = $13,
    event_names = $14,
    event_properties = $15,
    event_properties_numerical = $16,
    updated_at = NOW()
WHERE id = $1
RETURNING *
            "#,
        )
        .bind(team.id)
        .bind(&team.name)
        .bind(&team.api_token)
        .bind(&team.app_urls)
        .bind(&team.slack_incoming_webhook)
        .bind(team.anonymize_ips)
        .bind(team.completed_snippet_onboarding)
        .bind(team.ingested_event)
        .bind(&team.test_account_filters)
        .bind(&team.timezone)
        .bind(&team.data_attributes)
        .bind(team.session_recording_opt_in)
        .bind(team.session_recording_retention_period_days)
        .bind(&team.event_names)
        .bind(&team.event_properties)
        .bind(&team.event_properties_numerical)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::query("UPDATE team"))?
        .ok_or_else(|| StoreError::NotFound(format!("team {}", team.id)))
    }

    async fn delete_team(&self, team_id: TeamId) -> StoreResult<()> {
        // Everything referencing the team cascades.
        sqlx::query("DELETE FROM posthog_team WHERE id = $1")
            .bind(team_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::query("DELETE team"))?;
        Ok(())
    }

    async fn create_persons(&self, persons: Vec<NewPerson>) -> StoreResult<Vec<Person>> {
        let mut created = Vec::with_capacity(persons.len());
        for chunk in persons.chunks(INSERT_BATCH_SIZE) {
            let mut query = QueryBuilder::<Postgres>::new(
                "INSERT INTO posthog_person (uuid, team_id, properties, is_identified) ",
            );
            query.push_values(chunk, |mut row, person| {
                row.push_bind(Uuid::now_v7())
                    .push_bind(person.team_id)
                    .push_bind(&person.properties)
                    .push_bind(person.is_identified);
            });
            query.push(" RETURNING *");

            let mut rows = query
                .build_query_as::<Person>()
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::query("INSERT person"))?;
            rows.sort_by_key(|p| p.id);
            created.extend(rows);
        }
        Ok(created)
    }

    async fn get_person(&self, person_id: PersonId) -> StoreResult<Option<Person>> {
        sqlx::query_as::<_, Person>("SELECT * FROM posthog_person WHERE id = $1")
            .bind(person_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::query("SELECT person"))
    }

    async fn get_person_by_distinct_id(
        &self,
        team_id: TeamId,
        distinct_id: &str,
    ) -> StoreResult<Option<Person>> {
        sqlx::query_as::<_, Person>(
            r#"
SELECT p.*
FROM posthog_person p
JOIN posthog_persondistinctid pdi ON pdi.person_id = p.id
WHERE pdi.team_id = $1 AND pdi.distinct_id = $2
            "#,
        )
        .bind(team_id)
        .bind(distinct_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::query("SELECT person"))
    }

    async fn update_person(&self, person: &Person) -> StoreResult<()> {
        sqlx::query("UPDATE posthog_person SET properties = $2, is_identified = $3 WHERE id = $1")
            .bind(person.id)
            .bind(&person.properties)
            .bind(person.is_identified)
            .execute(&self.pool)
            .await
            .map_err(StoreError::query("UPDATE person"))?;
        Ok(())
    }

    async fn delete_person(&self, person_id: PersonId) -> StoreResult<()> {
        sqlx::query("DELETE FROM posthog_person WHERE id = $1")
            .bind(person_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::query("DELETE person"))?;
        Ok(())
    }

    async fn list_persons(&self, team_id: TeamId) -> StoreResult<Vec<Person>> {
        sqlx::query_as::<_, Person>("SELECT * FROM posthog_person WHERE team_id = $1 ORDER BY id")
            .bind(team_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::query("SELECT person"))
    }

    async fn count_persons(&self) -> StoreResult<i64> {
        self.count("SELECT COUNT(*) FROM posthog_person").await
    }

    async fn insert_distinct_ids(&self, distinct_ids: Vec<PersonDistinctId>) -> StoreResult<()> {
        for chunk in distinct_ids.chunks(INSERT_BATCH_SIZE) {
            let mut query = QueryBuilder::<Postgres>::new(
                "INSERT INTO posthog_persondistinctid (team_id, person_id, distinct_id) ",
            );
            query.push_values(chunk, |mut row, pdi| {
                row.push_bind(pdi.team_id)
                    .push_bind(pdi.person_id)
                    .push_bind(&pdi.distinct_id);
            });
            query.push(" ON CONFLICT (team_id, distinct_id) DO NOTHING");

            query
                .build()
                .execute(&self.pool)
                .await
                .map_err(StoreError::query("INSERT persondistinctid"))?;
        }
        Ok(())
    }

    async fn list_distinct_ids(&self, person_id: PersonId) -> StoreResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT distinct_id FROM posthog_persondistinctid WHERE person_id = $1 ORDER BY id",
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("SELECT persondistinctid"))
    }

    async fn move_distinct_ids(&self, from: PersonId, to: PersonId) -> StoreResult<()> {
        sqlx::query("UPDATE posthog_persondistinctid SET person_id = $2 WHERE person_id = $1")
            .bind(from)
            .bind(to)
            .execute(&self.pool)
            .await
            .map_err(StoreError::query("UPDATE persondistinctid"))?;
        Ok(())
    }

    async fn insert_event(&self, event: NewEvent) -> StoreResult<Event> {
        let row = sqlx::query_as::<_, EventRow>(
            r#"
INSERT INTO posthog_event (uuid, team_id, event, distinct_id, properties, elements, timestamp)
VALUES ($1, $2, $3, $4, $5, $6, $7)
RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(event.team_id)
        .bind(&event.event)
        .bind(&event.distinct_id)
        .bind(&event.properties)
        .bind(Json(&event.elements))
        .bind(event.timestamp)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::query("INSERT event"))?;
        Ok(row.into())
    }

    async fn insert_events(&self, events: Vec<NewEvent>) -> StoreResult<u64> {
        let mut inserted = 0;
        for chunk in events.chunks(INSERT_BATCH_SIZE) {
            let mut query = QueryBuilder::<Postgres>::new(
                "INSERT INTO posthog_event \
                 (uuid, team_id, event, distinct_id, properties, elements, timestamp) ",
            );
            query.push_values(chunk, |mut row, event| {
                row.push_bind(Uuid::now_v7())
                    .push_bind(event.team_id)
                    .push_bind(&event.event)
                    .push_bind(&event.distinct_id)
                    .push_bind(&event.properties)
                    .push_bind(Json(&event.elements))
                    .push_bind(event.timestamp);
            });

            inserted += query
                .build()
                .execute(&self.pool)
                .await
                .map_err(StoreError::query("INSERT event"))?
                .rows_affected();
        }
        Ok(inserted)
    }

    async fn get_event(&self, event_id: i64) -> StoreResult<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>("SELECT * FROM posthog_event WHERE id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::query("SELECT event"))?;
        Ok(row.map(Event::from))
    }

    async fn team_has_events(&self, team_id: TeamId) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM posthog_event WHERE team_id = $1)",
        )
        .bind(team_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::query("SELECT event"))
    }

    async fn list_events(
        &self,
        team_id: TeamId,
        since: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
SELECT * FROM posthog_event
WHERE team_id = $1 AND ($2::timestamptz IS NULL OR timestamp >= $2)
ORDER BY timestamp, id
            "#,
        )
        .bind(team_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("SELECT event"))?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn count_events_since(&self, since: DateTime<Utc>) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posthog_event WHERE timestamp >= $1")
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::query("COUNT event"))
    }

    async fn delete_events_before(
        &self,
        team_id: TeamId,
        event: &str,
        before: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM posthog_event WHERE team_id = $1 AND event = $2 AND timestamp < $3",
        )
        .bind(team_id)
        .bind(event)
        .bind(before)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("DELETE event"))?;
        Ok(result.rows_affected())
    }

    async fn create_action(&self, action: NewAction) -> StoreResult<Action> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(StoreError::ConnectionError)?;

        let row = sqlx::query_as::<_, ActionRow>(
            r#"
INSERT INTO posthog_action (team_id, name, post_to_slack)
VALUES ($1, $2, $3)
RETURNING id, team_id, name, created_at, deleted, post_to_slack, events_count, last_calculated_at
            "#,
        )
        .bind(action.team_id)
        .bind(&action.name)
        .bind(action.post_to_slack)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::query("INSERT action"))?;

        for step in &action.steps {
            sqlx::query(
                r#"
INSERT INTO posthog_actionstep (action_id, event, url, url_matching, selector, tag_name, text, href)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(row.id)
            .bind(&step.event)
            .bind(&step.url)
            .bind(step.url_matching.to_string())
            .bind(&step.selector)
            .bind(&step.tag_name)
            .bind(&step.text)
            .bind(&step.href)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::query("INSERT actionstep"))?;
        }

        tx.commit().await.map_err(StoreError::query("COMMIT"))?;

        Ok(Action {
            id: row.id,
            team_id: row.team_id,
            name: row.name,
            created_at: row.created_at,
            deleted: row.deleted,
            post_to_slack: row.post_to_slack,
            events_count: row.events_count,
            last_calculated_at: row.last_calculated_at,
            steps: action.steps,
        })
    }

    async fn get_action(&self, action_id: i64) -> StoreResult<Option<Action>> {
        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
SELECT id, team_id, name, created_at, deleted, post_to_slack, events_count, last_calculated_at
FROM posthog_action WHERE id = $1
            "#,
        )
        .bind(action_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("SELECT action"))?;
        Ok(self.load_actions(rows).await?.pop())
    }

    async fn list_actions(&self, team_id: TeamId) -> StoreResult<Vec<Action>> {
        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
SELECT id, team_id, name, created_at, deleted, post_to_slack, events_count, last_calculated_at
FROM posthog_action WHERE team_id = $1 AND NOT deleted
ORDER BY id
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("SELECT action"))?;
        self.load_actions(rows).await
    }

    async fn set_action_count(
        &self,
        action_id: i64,
        count: i64,
        calculated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE posthog_action SET events_count = $2, last_calculated_at = $3 WHERE id = $1",
        )
        .bind(action_id)
        .bind(count)
        .bind(calculated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("UPDATE action"))?;
        Ok(())
    }

    async fn create_dashboard(&self, dashboard: NewDashboard) -> StoreResult<Dashboard> {
        sqlx::query_as::<_, Dashboard>(
            r#"
INSERT INTO posthog_dashboard (team_id, name, pinned, share_token)
VALUES ($1, $2, $3, $4)
RETURNING *
            "#,
        )
        .bind(dashboard.team_id)
        .bind(&dashboard.name)
        .bind(dashboard.pinned)
        .bind(&dashboard.share_token)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::query("INSERT dashboard"))
    }

    async fn create_dashboard_item(&self, item: NewDashboardItem) -> StoreResult<DashboardItem> {
        sqlx::query_as::<_, DashboardItem>(
            r#"
INSERT INTO posthog_dashboarditem (team_id, dashboard_id, name, type, filters)
VALUES ($1, $2, $3, $4, $5)
RETURNING *
            "#,
        )
        .bind(item.team_id)
        .bind(item.dashboard_id)
        .bind(&item.name)
        .bind(&item.item_type)
        .bind(&item.filters)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::query("INSERT dashboarditem"))
    }

    async fn list_dashboard_items(&self, team_id: TeamId) -> StoreResult<Vec<DashboardItem>> {
        sqlx::query_as::<_, DashboardItem>(
            "SELECT * FROM posthog_dashboarditem WHERE team_id = $1 ORDER BY id",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("SELECT dashboarditem"))
    }

    async fn update_dashboard_item_result(
        &self,
        item_id: i64,
        result: Value,
        refreshed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE posthog_dashboarditem SET result = $2, last_refresh = $3 WHERE id = $1")
            .bind(item_id)
            .bind(result)
            .bind(refreshed_at)
            .execute(&self.pool)
            .await
            .map_err(StoreError::query("UPDATE dashboarditem"))?;
        Ok(())
    }

    async fn create_funnel(
        &self,
        team_id: TeamId,
        name: &str,
        filters: Value,
    ) -> StoreResult<Funnel> {
        sqlx::query_as::<_, Funnel>(
            "INSERT INTO posthog_funnel (team_id, name, filters) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(team_id)
        .bind(name)
        .bind(filters)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::query("INSERT funnel"))
    }

    async fn list_funnels(&self, team_id: TeamId) -> StoreResult<Vec<Funnel>> {
        sqlx::query_as::<_, Funnel>("SELECT * FROM posthog_funnel WHERE team_id = $1 ORDER BY id")
            .bind(team_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::query("SELECT funnel"))
    }

    async fn create_cohort(
        &self,
        team_id: TeamId,
        name: &str,
        groups: Value,
    ) -> StoreResult<Cohort> {
        sqlx::query_as::<_, Cohort>(
            r#"
INSERT INTO posthog_cohort (team_id, name, groups)
VALUES ($1, $2, $3)
RETURNING id, team_id, name, groups, count, is_calculating, last_calculation
            "#,
        )
        .bind(team_id)
        .bind(name)
        .bind(groups)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::query("INSERT cohort"))
    }

    async fn get_cohort(&self, cohort_id: i64) -> StoreResult<Option<Cohort>> {
        sqlx::query_as::<_, Cohort>(
            r#"
SELECT id, team_id, name, groups, count, is_calculating, last_calculation
FROM posthog_cohort WHERE id = $1
            "#,
        )
        .bind(cohort_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::query("SELECT cohort"))
    }

    async fn set_cohort_count(
        &self,
        cohort_id: i64,
        count: i64,
        calculated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
UPDATE posthog_cohort
SET count = $2, last_calculation = $3, is_calculating = FALSE
WHERE id = $1
            "#,
        )
        .bind(cohort_id)
        .bind(count)
        .bind(calculated_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("UPDATE cohort"))?;
        Ok(())
    }

    async fn list_event_definitions(&self, team_id: TeamId) -> StoreResult<Vec<EventDefinition>> {
        sqlx::query_as::<_, EventDefinition>(
            "SELECT * FROM posthog_eventdefinition WHERE team_id = $1 ORDER BY name",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("SELECT eventdefinition"))
    }

    async fn list_property_definitions(
        &self,
        team_id: TeamId,
    ) -> StoreResult<Vec<PropertyDefinition>> {
        sqlx::query_as::<_, PropertyDefinition>(
            "SELECT * FROM posthog_propertydefinition WHERE team_id = $1 ORDER BY name",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query("SELECT propertydefinition"))
    }

    async fn sync_definitions(
        &self,
        team_id: TeamId,
        event_names: &[String],
        properties: &[(String, bool)],
    ) -> StoreResult<()> {
        let property_names: Vec<String> = properties.iter().map(|(n, _)| n.clone()).collect();
        let numerical: Vec<bool> = properties.iter().map(|(_, n)| *n).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(StoreError::ConnectionError)?;

        sqlx::query(
            "DELETE FROM posthog_eventdefinition WHERE team_id = $1 AND NOT (name = ANY($2))",
        )
        .bind(team_id)
        .bind(event_names)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::query("DELETE eventdefinition"))?;
        sqlx::query(
            r#"
INSERT INTO posthog_eventdefinition (team_id, name)
SELECT $1, name FROM UNNEST($2::text[]) AS name
ON CONFLICT (team_id, name) DO NOTHING
            "#,
        )
        .bind(team_id)
        .bind(event_names)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::query("INSERT eventdefinition"))?;

        sqlx::query(
            "DELETE FROM posthog_propertydefinition WHERE team_id = $1 AND NOT (name = ANY($2))",
        )
        .bind(team_id)
        .bind(&property_names)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::query("DELETE propertydefinition"))?;
        sqlx::query(
            r#"
INSERT INTO posthog_propertydefinition (team_id, name, is_numerical)
SELECT $1, p.name, p.is_numerical FROM UNNEST($2::text[], $3::bool[]) AS p (name, is_numerical)
ON CONFLICT (team_id, name) DO UPDATE SET is_numerical = EXCLUDED.is_numerical
            "#,
        )
        .bind(team_id)
        .bind(&property_names)
        .bind(&numerical)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::query("INSERT propertydefinition"))?;

        tx.commit().await.map_err(StoreError::query("COMMIT"))
    }

    async fn upsert_event_definition(&self, definition: EventDefinition) -> StoreResult<()> {
        sqlx::query(
            r#"
INSERT INTO posthog_eventdefinition (team_id, name, volume_30_day, query_usage_30_day)
VALUES ($1, $2, $3, $4)
ON CONFLICT (team_id, name) DO UPDATE SET
    volume_30_day = EXCLUDED.volume_30_day,
    query_usage_30_day = EXCLUDED.query_usage_30_day
            "#,
        )
        .bind(definition.team_id)
        .bind(&definition.name)
        .bind(definition.volume_30_day)
        .bind(definition.query_usage_30_day)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("UPSERT eventdefinition"))?;
        Ok(())
    }

    async fn upsert_property_definition(
        &self,
        definition: PropertyDefinition,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
INSERT INTO posthog_propertydefinition
    (team_id, name, is_numerical, volume_30_day, query_usage_30_day)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (team_id, name) DO UPDATE SET
    is_numerical = EXCLUDED.is_numerical,
    volume_30_day = EXCLUDED.volume_30_day,
    query_usage_30_day = EXCLUDED.query_usage_30_day
            "#,
        )
        .bind(definition.team_id)
        .bind(&definition.name)
        .bind(definition.is_numerical)
        .bind(definition.volume_30_day)
        .bind(definition.query_usage_30_day)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("UPSERT propertydefinition"))?;
        Ok(())
    }

    async fn claim_demo_seed(&self, team_id: TeamId) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO posthog_demoseed (team_id) VALUES ($1) ON CONFLICT (team_id) DO NOTHING",
        )
        .bind(team_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::query("INSERT demoseed"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_demo_data(&self, team_id: TeamId) -> StoreResult<DemoTeardown> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(StoreError::ConnectionError)?;
        let mut teardown = DemoTeardown::default();

        teardown.events = sqlx::query(
            r#"
DELETE FROM posthog_event
WHERE team_id = $1 AND distinct_id IN (
    SELECT pdi.distinct_id
    FROM posthog_persondistinctid pdi
    JOIN posthog_person p ON p.id = pdi.person_id
    WHERE pdi.team_id = $1 AND p.properties @> '{"is_demo": true}'
)
            "#,
        )
        .bind(team_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::query("DELETE event"))?
        .rows_affected();

        sqlx::query(
            r#"
DELETE FROM posthog_persondistinctid
WHERE team_id = $1 AND person_id IN (
    SELECT id FROM posthog_person WHERE team_id = $1 AND properties @> '{"is_demo": true}'
)
            "#,
        )
        .bind(team_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::query("DELETE persondistinctid"))?;

        teardown.persons = sqlx::query(
            r#"
DELETE FROM posthog_person WHERE team_id = $1 AND properties @> '{"is_demo": true}'
            "#,
        )
        .bind(team_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::query("DELETE person"))?
        .rows_affected();

        teardown.funnels =
            sqlx::query("DELETE FROM posthog_funnel WHERE team_id = $1 AND strpos(name, $2) > 0")
                .bind(team_id)
                .bind(DEMO_NAME_MARKER)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::query("DELETE funnel"))?
                .rows_affected();

        teardown.actions =
            sqlx::query("DELETE FROM posthog_action WHERE team_id = $1 AND strpos(name, $2) > 0")
                .bind(team_id)
                .bind(DEMO_NAME_MARKER)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::query("DELETE action"))?
                .rows_affected();

        teardown.dashboard_items = sqlx::query(
            "DELETE FROM posthog_dashboarditem WHERE team_id = $1 AND strpos(name, $2) > 0",
        )
        .bind(team_id)
        .bind(DEMO_NAME_MARKER)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::query("DELETE dashboarditem"))?
        .rows_affected();

        sqlx::query("DELETE FROM posthog_demoseed WHERE team_id = $1")
            .bind(team_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::query("DELETE demoseed"))?;

        tx.commit().await.map_err(StoreError::query("COMMIT"))?;
        Ok(teardown)
    }
}
