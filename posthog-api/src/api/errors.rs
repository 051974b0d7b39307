use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use posthog_common::queue::QueueError;
use posthog_common::store::StoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::demo::DemoError;

/// Error body in the shape the web app and SDKs already parse.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub code: &'static str,
    pub detail: String,
    pub attr: Option<&'static str>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{detail}")]
    Validation {
        code: &'static str,
        detail: String,
        attr: Option<&'static str>,
    },
    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,
    #[error("Invalid personal API key.")]
    InvalidApiKey,
    #[error("{0}")]
    PermissionDenied(&'static str),
    #[error("Not found.")]
    NotFound,
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("demo seeding failed: {0}")]
    Demo(#[from] DemoError),
}

impl ApiError {
    pub fn invalid_choice(attr: &'static str, value: &str) -> Self {
        ApiError::Validation {
            code: "invalid_choice",
            detail: format!("\"{value}\" is not a valid choice."),
            attr: Some(attr),
        }
    }

    pub fn invalid_input(attr: Option<&'static str>, detail: impl Into<String>) -> Self {
        ApiError::Validation {
            code: "invalid_input",
            detail: detail.into(),
            attr,
        }
    }

    pub fn required(attr: &'static str) -> Self {
        ApiError::Validation {
            code: "required",
            detail: "This field is required.".to_string(),
            attr: Some(attr),
        }
    }

    fn status_and_body(&self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::Validation { code, detail, attr } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error_type: "validation_error",
                    code: *code,
                    detail: detail.clone(),
                    attr: *attr,
                },
            ),
            ApiError::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error_type: "authentication_error",
                    code: "not_authenticated",
                    detail: self.to_string(),
                    attr: None,
                },
            ),
            ApiError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error_type: "authentication_error",
                    code: "authentication_failed",
                    detail: self.to_string(),
                    attr: None,
                },
            ),
            ApiError::PermissionDenied(detail) => (
                StatusCode::FORBIDDEN,
                ErrorResponse {
                    error_type: "authentication_error",
                    code: "permission_denied",
                    detail: detail.to_string(),
                    attr: None,
                },
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error_type: "invalid_request",
                    code: "not_found",
                    detail: self.to_string(),
                    attr: None,
                },
            ),
            ApiError::Store(_) | ApiError::Queue(_) | ApiError::Demo(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error_type: "server_error",
                    code: "error",
                    detail: "A server error occurred.".to_string(),
                    attr: None,
                },
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_choice_body() {
        let (status, body) =
            ApiError::invalid_choice("timezone", "America/I_Dont_Exist").status_and_body();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            serde_json::json!({
                "type": "validation_error",
                "code": "invalid_choice",
                "detail": "\"America/I_Dont_Exist\" is not a valid choice.",
                "attr": "timezone",
            })
        );
    }

    #[test]
    fn test_store_errors_hide_details() {
        let (status, body) =
            ApiError::Store(StoreError::NotFound("team 1".to_string())).status_and_body();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "error");
        assert_eq!(body.detail, "A server error occurred.");
    }
}
