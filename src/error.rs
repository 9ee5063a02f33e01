// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthError;
use crate::storage::StorageError;
use crate::webhooks::WebhookError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

/// Error body returned by every endpoint.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(message) => ApiError::not_found(message),
            StorageError::AlreadyExists(message) => ApiError::conflict(message),
            StorageError::CodeRejected(reason) => ApiError::bad_request(reason.to_string()),
            StorageError::Rejected(reason) => ApiError::bad_request(reason),
            other => {
                tracing::error!(error = %other, "Storage operation failed");
                ApiError::internal("Internal server error")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        if let AuthError::IdentityProvider(detail) | AuthError::Internal(detail) = &e {
            tracing::error!(error = %detail, "Authentication dependency failed");
        }
        ApiError::new(e.status_code(), e.to_string())
    }
}

impl From<WebhookError> for ApiError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                tracing::warn!(error = %e, "Webhook rejected");
                ApiError::unauthorized(e.to_string())
            }
            WebhookError::NotConfigured => {
                tracing::error!("Webhook received but no secret is configured");
                ApiError::internal(e.to_string())
            }
            WebhookError::InvalidPayload(_) => ApiError::bad_request(e.to_string()),
            WebhookError::Storage(inner) => inner.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::CodeRejection;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        assert_eq!(ApiError::unauthorized("x").status, StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status, StatusCode::FORBIDDEN);
        assert_eq!(ApiError::conflict("x").status, StatusCode::CONFLICT);
        assert_eq!(
            ApiError::internal("x").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn storage_errors_map_to_status_families() {
        let e: ApiError = StorageError::NotFound("Student not found".into()).into();
        assert_eq!(e.status, StatusCode::NOT_FOUND);
        assert_eq!(e.message, "Student not found");

        let e: ApiError =
            StorageError::AlreadyExists("Teacher assignment already exists".into()).into();
        assert_eq!(e.status, StatusCode::CONFLICT);

        let e: ApiError = StorageError::CodeRejected(CodeRejection::Exhausted).into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.message, "Teacher code has reached maximum uses");

        let e: ApiError = StorageError::Catalog("role teacher missing".into()).into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!e.message.contains("teacher"));
    }

    #[test]
    fn auth_errors_keep_401_and_403_apart() {
        let e: ApiError = AuthError::NotAuthenticated.into();
        assert_eq!(e.status, StatusCode::UNAUTHORIZED);

        let e: ApiError = AuthError::MissingPermission("admin:users:manage".into()).into();
        assert_eq!(e.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn webhook_errors_map_to_statuses() {
        let e: ApiError = WebhookError::InvalidSignature.into();
        assert_eq!(e.status, StatusCode::UNAUTHORIZED);
        let e: ApiError = WebhookError::MissingSignature.into();
        assert_eq!(e.status, StatusCode::UNAUTHORIZED);
        let e: ApiError = WebhookError::NotConfigured.into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        let e: ApiError = WebhookError::InvalidPayload("eof".into()).into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
