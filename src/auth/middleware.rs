// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization middleware.
//!
//! Protected routes are wrapped in two layers, applied with `route_layer`:
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/v1/admin/users", get(list_users))
//!     .route_layer(from_fn_with_state(require_permission(ADMIN_USERS_MANAGE), enforce))
//!     .route_layer(from_fn_with_state(state.clone(), authenticate));
//! ```
//!
//! `authenticate` runs first and stores a [`CurrentAccount`] in the request
//! extensions; `enforce` then checks its [`Requirement`] against the
//! account's grants. A handler body therefore never runs, and never
//! mutates state, unless both checks passed.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::error::AuthError;
use super::identity::IdentityResolver;
use crate::state::AppState;
use crate::storage::repository::{Grants, StoredAccount};
use crate::storage::RbacRepository;

/// The resolved account and its effective roles and permissions.
#[derive(Debug, Clone)]
pub struct CurrentAccount {
    pub account: StoredAccount,
    pub grants: Grants,
}

impl CurrentAccount {
    pub fn id(&self) -> &str {
        &self.account.id
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.grants.has_permission(permission)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.grants.has_role(role)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Verify the bearer token, resolve the account and load its grants.
pub async fn authenticate_headers(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<CurrentAccount, AuthError> {
    let token = bearer_token(headers)?;
    let claims = state.verifier.verify(token).await?;

    let account = IdentityResolver::new(&state.db, state.identity.as_ref(), state.clock.as_ref())
        .resolve(&claims)
        .await?;

    let grants = RbacRepository::new(&state.db)
        .grants_of(&account.id)
        .map_err(|e| AuthError::Internal(e.to_string()))?;

    tracing::debug!(account_id = %account.id, roles = ?grants.roles, "Request authenticated");
    Ok(CurrentAccount { account, grants })
}

/// Authentication middleware.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate_headers(&state, request.headers()).await {
        Ok(current) => {
            request.extensions_mut().insert(current);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// A precondition checked after authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// The account's effective permissions contain this name
    Permission(&'static str),
    /// The account holds at least one of these roles
    AnyRole(&'static [&'static str]),
}

pub const fn require_permission(permission: &'static str) -> Requirement {
    Requirement::Permission(permission)
}

pub const fn require_role(roles: &'static [&'static str]) -> Requirement {
    Requirement::AnyRole(roles)
}

impl Requirement {
    pub fn check(&self, grants: &Grants) -> Result<(), AuthError> {
        match *self {
            Requirement::Permission(permission) if grants.has_permission(permission) => Ok(()),
            Requirement::Permission(permission) => {
                Err(AuthError::MissingPermission(permission.to_string()))
            }
            Requirement::AnyRole(roles) if roles.iter().any(|r| grants.has_role(r)) => Ok(()),
            Requirement::AnyRole(roles) => Err(AuthError::MissingRole(
                roles.iter().map(|r| r.to_string()).collect(),
            )),
        }
    }
}

/// Authorization middleware. Must sit inside [`authenticate`].
pub async fn enforce(
    State(requirement): State<Requirement>,
    request: Request,
    next: Next,
) -> Response {
    let Some(current) = request.extensions().get::<CurrentAccount>() else {
        return AuthError::NotAuthenticated.into_response();
    };

    if let Err(e) = requirement.check(&current.grants) {
        tracing::info!(
            account_id = %current.account.id,
            requirement = ?requirement,
            "Access denied"
        );
        return e.into_response();
    }

    next.run(request).await
}
