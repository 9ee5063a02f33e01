// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{encode, jwk::JwkSet, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::auth::identity::{
    EmailVerification, ExternalEmail, ExternalProfile, IdentityProvider, IdentityProviderError,
};
use crate::auth::{JwksManager, TokenVerifier};
use crate::clock::ManualClock;
use crate::state::AppState;
use crate::storage::repository::StoredAccount;
use crate::storage::{AccountRepository, Database, RbacRepository};

pub const TEST_ISSUER: &str = "https://clerk.test.example";
pub const TEST_KID: &str = "test-key-1";
pub const TEST_SECRET: &[u8] = b"testsecrettestsecrettestsecret123";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";

/// JWKS holding a single HS256 key under [`TEST_KID`].
pub fn static_jwks() -> JwksManager {
    let jwks: JwkSet = serde_json::from_value(json!({
        "keys": [{
            "kty": "oct",
            "kid": TEST_KID,
            "alg": "HS256",
            "k": URL_SAFE_NO_PAD.encode(TEST_SECRET),
        }]
    }))
    .unwrap();
    JwksManager::from_static(jwks, Arc::new(crate::clock::SystemClock))
}

/// Sign arbitrary claims with the test key.
pub fn sign(claims: Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(TEST_KID.to_string());
    encode(&header, &claims, &EncodingKey::from_secret(TEST_SECRET)).unwrap()
}

/// A valid one-hour session token for `subject`.
pub fn token_for(subject: &str) -> String {
    let now = Utc::now().timestamp();
    sign(json!({
        "sub": subject,
        "iss": TEST_ISSUER,
        "iat": now,
        "exp": now + 3600,
        "sid": "sess_test",
    }))
}

/// Clerk profile with a single (primary) email address.
pub fn profile(id: &str, email: &str, verified: bool) -> ExternalProfile {
    ExternalProfile {
        id: id.to_string(),
        email_addresses: vec![ExternalEmail {
            id: Some("idn_1".to_string()),
            email_address: email.to_string(),
            verification: Some(EmailVerification {
                status: if verified { "verified" } else { "unverified" }.to_string(),
            }),
        }],
        primary_email_address_id: Some("idn_1".to_string()),
        first_name: None,
        last_name: None,
    }
}

/// In-process identity provider.
#[derive(Default)]
pub struct MockIdentityProvider {
    profiles: Mutex<HashMap<String, ExternalProfile>>,
    calls: AtomicUsize,
    failing: bool,
}

impl MockIdentityProvider {
    pub fn with(profile: ExternalProfile) -> Self {
        let provider = Self::default();
        provider.insert(profile);
        provider
    }

    /// Every lookup fails with an upstream error.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, profile: ExternalProfile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn fetch_user(&self, user_id: &str) -> Result<ExternalProfile, IdentityProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(IdentityProviderError::Status(503));
        }
        self.profiles
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| IdentityProviderError::NotFound(user_id.to_string()))
    }
}

/// Seeded in-memory database wired into an [`AppState`].
pub struct TestContext {
    pub state: AppState,
    pub db: Arc<Database>,
    pub identity: Arc<MockIdentityProvider>,
    pub clock: Arc<ManualClock>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_provider(MockIdentityProvider::default())
    }

    pub fn with_provider(provider: MockIdentityProvider) -> Self {
        let db = Arc::new(Database::in_memory().unwrap());
        RbacRepository::new(&db).seed().unwrap();

        let identity = Arc::new(provider);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let verifier = Arc::new(TokenVerifier::new(Arc::new(static_jwks()), TEST_ISSUER));

        let state = AppState::new(db.clone(), verifier, identity.clone(), clock.clone())
            .with_webhook_secret(TEST_WEBHOOK_SECRET);

        Self {
            state,
            db,
            identity,
            clock,
        }
    }

    /// Create a verified account linked to `clerk_user_id` holding `roles`.
    pub fn user_with_roles(&self, clerk_user_id: &str, email: &str, roles: &[&str]) -> StoredAccount {
        let mut account = StoredAccount::new(email, "Test User", Utc::now());
        account.clerk_user_id = Some(clerk_user_id.to_string());
        account.is_verified = true;
        AccountRepository::new(&self.db).create(&account).unwrap();

        let rbac = RbacRepository::new(&self.db);
        for role in roles {
            rbac.assign_role(&account.id, role).unwrap();
        }
        self.identity.insert(profile(clerk_user_id, email, true));
        account
    }

    /// Application router over this context's state.
    pub fn router(&self) -> axum::Router {
        crate::api::router(self.state.clone())
    }
}

/// Send one request through `router` and decode the JSON response body
/// (`Value::Null` when empty).
pub async fn send(
    router: axum::Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
