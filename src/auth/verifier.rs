// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification against the Clerk JWKS.
//!
//! Checks signature, issuer and expiry (60 s leeway). Audience is not
//! checked. Every failure, including an unreachable JWKS endpoint, becomes
//! [`AuthError::InvalidToken`].

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Validation};

use super::claims::{ClerkClaims, VerifiedClaims};
use super::error::{AuthError, TokenRejection};
use super::jwks::JwksManager;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

pub struct TokenVerifier {
    jwks: Arc<JwksManager>,
    issuer: String,
}

impl TokenVerifier {
    pub fn new(jwks: Arc<JwksManager>, issuer: impl Into<String>) -> Self {
        Self {
            jwks,
            issuer: issuer.into(),
        }
    }

    pub fn jwks(&self) -> &JwksManager {
        &self.jwks
    }

    /// Verify a raw bearer token.
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        let header = decode_header(token).map_err(|_| TokenRejection::Malformed)?;
        let (decoding_key, algorithm) = self.jwks.get_decoding_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_aud = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let token_data = decode::<ClerkClaims>(token, &decoding_key, &validation)
            .map_err(|e| classify(e.kind()))?;

        Ok(token_data.claims.into())
    }
}

fn classify(kind: &ErrorKind) -> TokenRejection {
    match kind {
        ErrorKind::ExpiredSignature => TokenRejection::Expired,
        ErrorKind::InvalidSignature => TokenRejection::InvalidSignature,
        ErrorKind::InvalidIssuer => TokenRejection::InvalidIssuer,
        ErrorKind::ImmatureSignature => TokenRejection::NotYetValid,
        ErrorKind::InvalidAlgorithm => TokenRejection::AlgorithmMismatch,
        _ => TokenRejection::Malformed,
    }
}
