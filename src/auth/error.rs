// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.
//!
//! Identity failures (401) and privilege failures (403) are separate
//! variants and never share a status code. Token failures carry a
//! [`TokenRejection`] for logging, but the response body is the same for
//! every rejection reason.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Why a bearer token was refused. Logged, never returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("token issuer is invalid")]
    InvalidIssuer,
    #[error("token algorithm does not match key")]
    AlgorithmMismatch,
    #[error("no key in JWKS matches the token")]
    UnknownKey,
    #[error("JWKS unavailable: {0}")]
    KeySetUnavailable(String),
    #[error("unsupported JWK: {0}")]
    UnsupportedKey(String),
    #[error("identity no longer exists at the provider")]
    UnknownSubject,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("Authorization header is required")]
    MissingAuthHeader,

    /// Header present but not `Bearer <token>`
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,

    /// Handler reached without the authentication middleware
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid or expired token")]
    InvalidToken(TokenRejection),

    #[error("Account is disabled")]
    AccountInactive,

    #[error("No verified email address found")]
    NoVerifiedEmail,

    #[error("Permission '{0}' required")]
    MissingPermission(String),

    #[error("One of roles [{}] required", .0.join(", "))]
    MissingRole(Vec<String>),

    #[error("Identity provider request failed")]
    IdentityProvider(String),

    #[error("Internal authentication error")]
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::AccountInactive => "account_inactive",
            AuthError::NoVerifiedEmail => "no_verified_email",
            AuthError::MissingPermission(_) => "missing_permission",
            AuthError::MissingRole(_) => "missing_role",
            AuthError::IdentityProvider(_) => "identity_provider_error",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::NotAuthenticated
            | AuthError::InvalidToken(_)
            | AuthError::AccountInactive
            | AuthError::NoVerifiedEmail => StatusCode::UNAUTHORIZED,
            AuthError::MissingPermission(_) | AuthError::MissingRole(_) => StatusCode::FORBIDDEN,
            AuthError::IdentityProvider(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<TokenRejection> for AuthError {
    fn from(reason: TokenRejection) -> Self {
        AuthError::InvalidToken(reason)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AuthError::InvalidToken(reason) => {
                tracing::debug!(reason = %reason, "Bearer token rejected");
            }
            AuthError::IdentityProvider(detail) | AuthError::Internal(detail) => {
                tracing::error!(error = %detail, code = self.error_code(), "Authentication failed");
            }
            _ => {}
        }

        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
