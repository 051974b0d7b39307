use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use posthog_common::models::User;

use crate::api::errors::ApiError;
use crate::router::AppState;

/// The user owning the personal API key sent as `Authorization: Bearer <key>`.
pub struct AuthenticatedUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ApiError::NotAuthenticated)?;

        state
            .store
            .get_user_by_api_key(key)
            .await?
            .map(AuthenticatedUser)
            .ok_or(ApiError::InvalidApiKey)
    }
}
