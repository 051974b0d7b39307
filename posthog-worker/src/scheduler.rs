use std::sync::Arc;
use std::time::Duration;

use posthog_common::queue::{JobQueue, NewJob};
use posthog_common::store::Store;
use serde_json::json;
use tracing::{info, warn};

use crate::error::TaskError;
use crate::tasks;

/// A task enqueued on a fixed interval, once per team or once for the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub task: &'static str,
    pub every: Duration,
    pub per_team: bool,
}

impl Schedule {
    pub const fn instance(task: &'static str, every: Duration) -> Self {
        Self {
            task,
            every,
            per_team: false,
        }
    }

    pub const fn per_team(task: &'static str, every: Duration) -> Self {
        Self {
            task,
            every,
            per_team: true,
        }
    }
}

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

pub fn default_schedules() -> Vec<Schedule> {
    vec![
        Schedule::instance(tasks::STATUS_REPORT, Duration::from_secs(24 * HOUR)),
        Schedule::instance(tasks::SESSION_RECORDING_RETENTION, Duration::from_secs(HOUR)),
        Schedule::per_team(
            tasks::CALCULATE_EVENT_PROPERTY_USAGE,
            Duration::from_secs(6 * HOUR),
        ),
        Schedule::per_team(
            tasks::SYNC_EVENT_AND_PROPERTIES_DEFINITIONS,
            Duration::from_secs(HOUR),
        ),
        Schedule::per_team(tasks::UPDATE_CACHE, Duration::from_secs(15 * MINUTE)),
    ]
}

/// Periodically enqueues the maintenance tasks.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn Store + Send + Sync>,
    queue: Arc<dyn JobQueue + Send + Sync>,
    schedules: Vec<Schedule>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store + Send + Sync>,
        queue: Arc<dyn JobQueue + Send + Sync>,
        schedules: Vec<Schedule>,
    ) -> Self {
        Self {
            store,
            queue,
            schedules,
        }
    }

    /// Enqueues the jobs of one schedule, returns how many were enqueued.
    pub async fn enqueue(&self, schedule: &Schedule) -> Result<usize, TaskError> {
        if !schedule.per_team {
            self.queue
                .enqueue(NewJob::new(schedule.task, json!({})))
                .await?;
            return Ok(1);
        }

        let teams = self.store.list_all_teams().await?;
        for team in &teams {
            self.queue
                .enqueue(NewJob::new(schedule.task, json!({"team_id": team.id})))
                .await?;
        }
        Ok(teams.len())
    }

    /// Runs every schedule on its own interval until the process exits.
    pub async fn run(self) {
        let mut handles = Vec::with_capacity(self.schedules.len());
        for schedule in self.schedules.clone() {
            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(schedule.every);
                // Skip the first tick, it completes immediately.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    match scheduler.enqueue(&schedule).await {
                        Ok(count) => info!(task = schedule.task, count, "enqueued scheduled task"),
                        Err(e) => {
                            warn!(task = schedule.task, "failed to enqueue scheduled task: {}", e)
                        }
                    }
                }
            }));
        }
        futures::future::join_all(handles).await;
    }
}
