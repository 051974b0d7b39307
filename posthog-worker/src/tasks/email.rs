use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::context::TaskContext;
use crate::error::TaskError;
use crate::registry::TaskHandler;
use crate::tasks::{parse_args, post_json};

#[derive(Debug, Deserialize)]
struct Args {
    to: String,
    subject: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct RelayPayload<'a> {
    to: &'a str,
    from: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Hands an email over to the configured relay, or only logs it without one.
pub struct SendEmail;

#[async_trait]
impl TaskHandler for SendEmail {
    async fn run(&self, ctx: &TaskContext, args: Value) -> Result<(), TaskError> {
        let Args { to, subject, body } = parse_args(args)?;

        let Some(relay) = ctx.settings.email_relay_url.as_deref() else {
            info!(%to, %subject, "email relay not configured, not sending");
            return Ok(());
        };

        let payload = RelayPayload {
            to: &to,
            from: &ctx.settings.email_from,
            subject: &subject,
            body: &body,
        };
        post_json(&ctx.http, relay, &payload).await?;

        info!(%to, %subject, "sent email");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::config::TaskSettings;
    use crate::tasks::test_utils::{capture_server, env, env_with_settings};

    fn args() -> Value {
        json!({"to": "hedgehog@posthog.com", "subject": "Welcome", "body": "Hi!"})
    }

    #[tokio::test]
    async fn test_without_relay_only_logs() {
        let env = env().await;

        SendEmail.run(&env.ctx, args()).await.unwrap();
    }

    #[tokio::test]
    async fn test_sends_to_relay() {
        let (url, received) = capture_server(StatusCode::OK).await;
        let env = env_with_settings(TaskSettings {
            email_relay_url: Some(url),
            ..TaskSettings::default_for_test()
        })
        .await;

        SendEmail.run(&env.ctx, args()).await.unwrap();

        assert_eq!(
            *received.lock().unwrap(),
            vec![json!({
                "to": "hedgehog@posthog.com",
                "from": "hey@posthog.com",
                "subject": "Welcome",
                "body": "Hi!",
            })]
        );
    }

    #[tokio::test]
    async fn test_relay_errors() {
        let (url, _) = capture_server(StatusCode::SERVICE_UNAVAILABLE).await;
        let env = env_with_settings(TaskSettings {
            email_relay_url: Some(url),
            ..TaskSettings::default_for_test()
        })
        .await;
        let error = SendEmail.run(&env.ctx, args()).await.unwrap_err();
        assert!(error.is_retryable());

        let (url, _) = capture_server(StatusCode::BAD_REQUEST).await;
        let env = env_with_settings(TaskSettings {
            email_relay_url: Some(url),
            ..TaskSettings::default_for_test()
        })
        .await;
        let error = SendEmail.run(&env.ctx, args()).await.unwrap_err();
        assert!(!error.is_retryable());
    }
}
