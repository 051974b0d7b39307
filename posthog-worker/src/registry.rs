use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::TaskContext;
use crate::error::{TaskError, WorkerError};
use crate::tasks;

/// A unit of background work, looked up by name when a job is dequeued.
#[async_trait]
pub trait TaskHandler {
    async fn run(&self, ctx: &TaskContext, args: Value) -> Result<(), TaskError>;
}

/// Task names bound to their handlers.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: BTreeMap<String, Arc<dyn TaskHandler + Send + Sync>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every task the rest of the system enqueues.
    pub fn default_tasks() -> Result<Self, WorkerError> {
        let mut registry = Self::new();
        registry.register(tasks::CALCULATE_ACTION, tasks::action::CalculateAction)?;
        registry.register(tasks::CALCULATE_COHORT, tasks::cohort::CalculateCohort)?;
        registry.register(
            tasks::CALCULATE_EVENT_PROPERTY_USAGE,
            tasks::definitions::CalculateEventPropertyUsage,
        )?;
        registry.register(tasks::EMAIL, tasks::email::SendEmail)?;
        registry.register(tasks::PROCESS_EVENT, tasks::process_event::ProcessEvent)?;
        registry.register(
            tasks::SESSION_RECORDING_RETENTION,
            tasks::retention::SessionRecordingRetention,
        )?;
        registry.register(tasks::STATUS_REPORT, tasks::status_report::StatusReport)?;
        registry.register(
            tasks::SYNC_EVENT_AND_PROPERTIES_DEFINITIONS,
            tasks::definitions::SyncDefinitions,
        )?;
        registry.register(tasks::UPDATE_CACHE, tasks::update_cache::UpdateCache)?;
        registry.register(tasks::USER_IDENTIFY, tasks::identify::UserIdentify)?;
        registry.register(tasks::WEBHOOKS, tasks::webhooks::PostWebhook)?;
        Ok(registry)
    }

    pub fn register<H>(&mut self, name: &str, handler: H) -> Result<(), WorkerError>
    where
        H: TaskHandler + Send + Sync + 'static,
    {
        if self.handlers.contains_key(name) {
            return Err(WorkerError::DuplicateTask(name.to_owned()));
        }
        self.handlers.insert(name.to_owned(), Arc::new(handler));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler + Send + Sync>> {
        self.handlers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl TaskHandler for Noop {
        async fn run(&self, _: &TaskContext, _: Value) -> Result<(), TaskError> {
            Ok(())
        }
    }

    #[test]
    fn test_default_tasks() {
        let registry = TaskRegistry::default_tasks().unwrap();

        assert_eq!(registry.len(), 11);
        assert_eq!(
            registry.names(),
            vec![
                "calculate_action",
                "calculate_cohort",
                "calculate_event_property_usage",
                "email",
                "process_event",
                "session_recording_retention",
                "status_report",
                "sync_event_and_properties_definitions",
                "update_cache",
                "user_identify",
                "webhooks",
            ]
        );
        assert!(registry.get("process_event").is_some());
        assert!(registry.get("send_weekly_digest").is_none());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut registry = TaskRegistry::new();
        registry.register("noop", Noop).unwrap();

        assert!(matches!(
            registry.register("noop", Noop),
            Err(WorkerError::DuplicateTask(name)) if name == "noop"
        ));
        assert_eq!(registry.len(), 1);
    }
}
