// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and the verified identity handed to the resolver.

use serde::{Deserialize, Serialize};

/// Claims read from a Clerk session token.
///
/// See: https://clerk.com/docs/backend-requests/resources/session-tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClerkClaims {
    /// Subject - the Clerk user id
    pub sub: String,

    /// Issuer (your Clerk instance URL)
    pub iss: String,

    /// Expiration timestamp
    pub exp: i64,

    #[serde(default)]
    pub iat: Option<i64>,

    #[serde(default)]
    pub nbf: Option<i64>,

    /// Clerk session ID
    #[serde(default)]
    pub sid: Option<String>,

    /// Authorized party (the frontend origin)
    #[serde(default)]
    pub azp: Option<String>,
}

/// Identity established by a successfully verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    /// Clerk user id (`sub`)
    pub subject: String,
    pub session_id: Option<String>,
    pub issuer: String,
    /// Unix timestamp
    pub expires_at: i64,
}

impl From<ClerkClaims> for VerifiedClaims {
    fn from(claims: ClerkClaims) -> Self {
        Self {
            subject: claims.sub,
            session_id: claims.sid,
            issuer: claims.iss,
            expires_at: claims.exp,
        }
    }
}
