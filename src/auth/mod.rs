// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Clerk session tokens in, local accounts with roles and permissions out.
//!
//! ## Request Flow
//!
//! 1. Frontend authenticates the user with Clerk
//! 2. Frontend sends `Authorization: Bearer <Clerk JWT>`
//! 3. Server:
//!    - Verifies the JWT against the cached Clerk JWKS (signature, expiry, issuer)
//!    - Resolves `sub` to a local account, provisioning it on first sight
//!    - Loads the account's roles and their permission union
//!    - Checks the route's [`Requirement`], if any
//!
//! ## Security
//!
//! - A missing or invalid token is always 401; a missing privilege is always 403
//! - Token failure reasons are logged but never returned to the client
//! - JWKS is cached with a TTL and refreshed when an unknown `kid` appears
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod identity;
pub mod jwks;
pub mod middleware;
pub mod password;
pub mod roles;
pub mod verifier;

pub use claims::VerifiedClaims;
pub use error::{AuthError, TokenRejection};
pub use extractor::Auth;
pub use identity::{ClerkClient, ExternalProfile, IdentityProvider, IdentityResolver};
pub use jwks::JwksManager;
pub use middleware::{authenticate, enforce, require_permission, require_role, CurrentAccount, Requirement};
pub use roles::BuiltinRole;
pub use verifier::TokenVerifier;
