use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::registry::TaskHandler;
use crate::tasks::parse_args;

#[derive(Debug, Deserialize)]
struct Args {
    cohort_id: i64,
}

/// Counts the persons belonging to a cohort.
pub struct CalculateCohort;

#[async_trait]
impl TaskHandler for CalculateCohort {
    async fn run(&self, ctx: &TaskContext, args: Value) -> Result<(), TaskError> {
        let Args { cohort_id } = parse_args(args)?;
        let cohort = ctx
            .store
            .get_cohort(cohort_id)
            .await?
            .ok_or_else(|| TaskError::NotFound(format!("cohort {cohort_id}")))?;

        let persons = ctx.store.list_persons(cohort.team_id).await?;
        let count = persons.iter().filter(|p| cohort.contains(p)).count() as i64;
        ctx.store
            .set_cohort_count(cohort.id, count, Utc::now())
            .await?;

        info!(cohort_id, count, "calculated cohort");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use posthog_common::models::NewPerson;
    use posthog_common::store::Store;
    use serde_json::json;

    use super::*;
    use crate::tasks::test_utils::env;

    #[tokio::test]
    async fn test_counts_persons_in_any_group() {
        let env = env().await;
        let persons = [
            json!({"plan": "paid", "country": "France"}),
            json!({"plan": "paid", "country": "Spain"}),
            json!({"plan": "free", "country": "Spain"}),
            json!({"plan": "free", "beta": true}),
        ]
        .into_iter()
        .map(|properties| NewPerson {
            team_id: env.team.id,
            properties,
            is_identified: true,
        })
        .collect();
        env.store.create_persons(persons).await.unwrap();
        let cohort = env
            .store
            .create_cohort(
                env.team.id,
                "Interesting",
                json!([
                    {"properties": {"plan": "paid", "country": "Spain"}},
                    {"properties": {"beta": true}},
                ]),
            )
            .await
            .unwrap();

        CalculateCohort
            .run(&env.ctx, json!({"cohort_id": cohort.id}))
            .await
            .unwrap();

        let cohort = env.store.get_cohort(cohort.id).await.unwrap().unwrap();
        assert_eq!(cohort.count, Some(2));
        assert!(cohort.last_calculation.is_some());
        assert!(!cohort.is_calculating);
    }
}
