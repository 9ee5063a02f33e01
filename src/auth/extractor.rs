// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for the authenticated account.
//!
//! ```rust,ignore
//! async fn me(Auth(current): Auth) -> impl IntoResponse {
//!     // current.account, current.grants
//! }
//! ```
//!
//! The account is placed in the request extensions by
//! [`authenticate`](super::middleware::authenticate); a handler using `Auth`
//! on a route without that layer is rejected with `NotAuthenticated`.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::error::AuthError;
use super::middleware::CurrentAccount;

pub struct Auth(pub CurrentAccount);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentAccount>()
            .cloned()
            .map(Auth)
            .ok_or(AuthError::NotAuthenticated)
    }
}
