// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mapping verified identities to local accounts.
//!
//! ## Resolution order
//!
//! 1. Account already linked to the token subject → use it.
//! 2. Otherwise fetch the Clerk profile and require a verified email.
//! 3. Account with that email exists → link it to the subject.
//! 4. Otherwise create a verified account named after the profile.
//!
//! No role is granted on creation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::claims::VerifiedClaims;
use super::error::{AuthError, TokenRejection};
use crate::clock::Clock;
use crate::storage::repository::{ExternalIdentity, LinkOutcome, StoredAccount};
use crate::storage::{AccountRepository, Database, StorageError};

/// Fallback display name when the profile has no first or last name.
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// `last_login_at` is refreshed at most this often per account (seconds).
const LOGIN_TOUCH_INTERVAL_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum IdentityProviderError {
    #[error("user {0} not found at identity provider")]
    NotFound(String),

    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity provider returned HTTP {0}")]
    Status(u16),
}

/// Email address entry on a Clerk user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalEmail {
    #[serde(default)]
    pub id: Option<String>,
    pub email_address: String,
    #[serde(default)]
    pub verification: Option<EmailVerification>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailVerification {
    pub status: String,
}

impl ExternalEmail {
    pub fn is_verified(&self) -> bool {
        self.verification
            .as_ref()
            .is_some_and(|v| v.status == "verified")
    }
}

/// The subset of a Clerk user object this service reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalProfile {
    pub id: String,
    #[serde(default)]
    pub email_addresses: Vec<ExternalEmail>,
    #[serde(default)]
    pub primary_email_address_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl ExternalProfile {
    /// The primary email if verified, otherwise the first verified one.
    pub fn verified_email(&self) -> Option<&str> {
        let primary = self.primary_email_address_id.as_deref();
        self.email_addresses
            .iter()
            .filter(|e| e.is_verified())
            .find(|e| primary.is_some() && e.id.as_deref() == primary)
            .or_else(|| self.email_addresses.iter().find(|e| e.is_verified()))
            .map(|e| e.email_address.as_str())
    }

    /// First email address regardless of verification (webhook payloads).
    pub fn any_email(&self) -> Option<&str> {
        self.verified_email().or_else(|| {
            self.email_addresses
                .first()
                .map(|e| e.email_address.as_str())
        })
    }

    /// "first last", trimmed; `None` when both parts are blank.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    pub fn display_name(&self) -> String {
        self.full_name()
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string())
    }
}

/// Read access to the identity provider's user directory.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn fetch_user(&self, user_id: &str) -> Result<ExternalProfile, IdentityProviderError>;
}

/// Clerk Backend API client.
pub struct ClerkClient {
    base_url: Url,
    secret_key: String,
    client: reqwest::Client,
}

impl ClerkClient {
    pub fn new(base_url: Url, secret_key: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url,
            secret_key: secret_key.into(),
            client,
        }
    }

    fn user_url(&self, user_id: &str) -> String {
        format!(
            "{}/users/{}",
            self.base_url.as_str().trim_end_matches('/'),
            user_id
        )
    }
}

#[async_trait]
impl IdentityProvider for ClerkClient {
    async fn fetch_user(&self, user_id: &str) -> Result<ExternalProfile, IdentityProviderError> {
        let response = self
            .client
            .get(self.user_url(user_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            reqwest::StatusCode::NOT_FOUND => {
                Err(IdentityProviderError::NotFound(user_id.to_string()))
            }
            status => Err(IdentityProviderError::Status(status.as_u16())),
        }
    }
}

/// Build the shared outbound HTTP client.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Resolves verified claims to a local account.
pub struct IdentityResolver<'a> {
    db: &'a Database,
    provider: &'a dyn IdentityProvider,
    clock: &'a dyn Clock,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(db: &'a Database, provider: &'a dyn IdentityProvider, clock: &'a dyn Clock) -> Self {
        Self {
            db,
            provider,
            clock,
        }
    }

    /// Return the account for `claims`, provisioning it on first sight.
    pub async fn resolve(&self, claims: &VerifiedClaims) -> Result<StoredAccount, AuthError> {
        let accounts = AccountRepository::new(self.db);

        let account = match accounts
            .find_by_external_id(&claims.subject)
            .map_err(internal)?
        {
            Some(account) => account,
            None => self.provision(&claims.subject).await?,
        };

        if !account.is_active {
            tracing::info!(account_id = %account.id, "Inactive account refused");
            return Err(AuthError::AccountInactive);
        }

        let account = if account.is_verified {
            account
        } else {
            self.reverify(account, &claims.subject).await?
        };

        let now = self.clock.now();
        let stale = account
            .last_login_at
            .is_none_or(|last| (now - last).num_seconds() >= LOGIN_TOUCH_INTERVAL_SECS);
        if stale {
            if let Err(e) = accounts.touch_login(&account.id, now) {
                tracing::warn!(account_id = %account.id, error = %e, "Failed to record login");
            }
        }
        Ok(account)
    }

    /// Require a verified email for a linked account that has none on
    /// record, copying it onto the account once the provider reports one.
    async fn reverify(
        &self,
        account: StoredAccount,
        external_id: &str,
    ) -> Result<StoredAccount, AuthError> {
        let profile = self.fetch_profile(external_id).await?;
        let Some(email) = profile.verified_email() else {
            tracing::info!(account_id = %account.id, "Linked account has no verified email");
            return Err(AuthError::NoVerifiedEmail);
        };

        let updated = AccountRepository::new(self.db)
            .apply_profile(&account.id, profile.full_name().as_deref(), Some(email))
            .map_err(internal)?;
        if !updated.is_verified {
            return Err(AuthError::NoVerifiedEmail);
        }
        tracing::info!(account_id = %updated.id, "Account email verified");
        Ok(updated)
    }

    async fn fetch_profile(&self, external_id: &str) -> Result<ExternalProfile, AuthError> {
        self.provider
            .fetch_user(external_id)
            .await
            .map_err(|e| match e {
                IdentityProviderError::NotFound(_) => {
                    AuthError::InvalidToken(TokenRejection::UnknownSubject)
                }
                other => AuthError::IdentityProvider(other.to_string()),
            })
    }

    /// Provision (or link) the account for an external user id.
    pub async fn provision(&self, external_id: &str) -> Result<StoredAccount, AuthError> {
        let profile = self.fetch_profile(external_id).await?;

        let email = profile.verified_email().ok_or(AuthError::NoVerifiedEmail)?;

        let name = profile.display_name();
        let identity = ExternalIdentity {
            external_id,
            email,
            name: &name,
            email_verified: true,
        };
        let outcome = AccountRepository::new(self.db)
            .link_or_create(&identity, self.clock.now())
            .map_err(internal)?;

        match &outcome {
            LinkOutcome::Created(account) => {
                tracing::info!(account_id = %account.id, "Provisioned account on first login");
            }
            LinkOutcome::Linked(account) => {
                tracing::info!(account_id = %account.id, "Linked existing account to identity");
            }
            LinkOutcome::Existing(_) => {}
        }
        Ok(outcome.into_account())
    }
}

impl IdentityResolver<'_> {
    /// Best-effort refresh of name, email and verification from the
    /// provider. Any failure is logged and the account is returned as is.
    pub async fn refresh_profile(&self, account: StoredAccount) -> StoredAccount {
        let Some(external_id) = account.clerk_user_id.clone() else {
            return account;
        };

        let profile = match self.provider.fetch_user(&external_id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "Profile refresh skipped");
                return account;
            }
        };

        match AccountRepository::new(self.db).apply_profile(
            &account.id,
            profile.full_name().as_deref(),
            profile.verified_email(),
        ) {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "Profile refresh not saved");
                account
            }
        }
    }
}

fn internal(e: StorageError) -> AuthError {
    AuthError::Internal(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::storage::RbacRepository;
    use crate::test_support::{profile, MockIdentityProvider};

    fn claims(subject: &str) -> VerifiedClaims {
        VerifiedClaims {
            subject: subject.to_string(),
            session_id: None,
            issuer: "https://clerk.test".to_string(),
            expires_at: 0,
        }
    }

    #[test]
    fn verified_email_prefers_primary() {
        let mut p = profile("user_1", "first@example.com", true);
        p.email_addresses.push(ExternalEmail {
            id: Some("idn_2".into()),
            email_address: "second@example.com".into(),
            verification: Some(EmailVerification {
                status: "verified".into(),
            }),
        });
        p.primary_email_address_id = Some("idn_2".into());
        assert_eq!(p.verified_email(), Some("second@example.com"));
    }

    #[test]
    fn unverified_email_ignored() {
        let p = profile("user_1", "first@example.com", false);
        assert_eq!(p.verified_email(), None);
        assert_eq!(p.any_email(), Some("first@example.com"));
    }

    #[test]
    fn display_name_falls_back() {
        let mut p = profile("user_1", "a@example.com", true);
        p.first_name = Some("  ".into());
        p.last_name = None;
        assert_eq!(p.display_name(), "User");

        p.first_name = Some("Ada".into());
        p.last_name = Some("Lovelace".into());
        assert_eq!(p.display_name(), "Ada Lovelace");

        p.first_name = None;
        assert_eq!(p.display_name(), "Lovelace");
    }

    #[tokio::test]
    async fn first_login_creates_verified_account_without_roles() {
        let db = Database::in_memory().unwrap();
        RbacRepository::new(&db).seed().unwrap();
        let provider = MockIdentityProvider::with(profile("user_new", "New@Ex.com", true));
        let resolver = IdentityResolver::new(&db, &provider, &SystemClock);

        let account = resolver.resolve(&claims("user_new")).await.unwrap();
        assert_eq!(account.email, "new@ex.com");
        assert!(account.is_verified);
        assert_eq!(account.clerk_user_id.as_deref(), Some("user_new"));
        assert!(RbacRepository::new(&db).roles_of(&account.id).unwrap().is_empty());

        let stored = AccountRepository::new(&db).get(&account.id).unwrap();
        assert!(stored.last_login_at.is_some());

        // Second resolution is a lookup, not a second account
        let again = resolver.resolve(&claims("user_new")).await.unwrap();
        assert_eq!(again.id, account.id);
        assert_eq!(AccountRepository::new(&db).count().unwrap(), 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn invited_account_is_linked_by_email() {
        let db = Database::in_memory().unwrap();
        let invited = StoredAccount::new("invited@example.com", "Invited", chrono::Utc::now());
        AccountRepository::new(&db).create(&invited).unwrap();

        let provider = MockIdentityProvider::with(profile("user_inv", "invited@example.com", true));
        let resolver = IdentityResolver::new(&db, &provider, &SystemClock);

        let account = resolver.resolve(&claims("user_inv")).await.unwrap();
        assert_eq!(account.id, invited.id);
        assert_eq!(account.clerk_user_id.as_deref(), Some("user_inv"));
        assert!(account.is_verified);
    }

    #[tokio::test]
    async fn no_verified_email_is_unauthorized() {
        let db = Database::in_memory().unwrap();
        let provider = MockIdentityProvider::with(profile("user_x", "x@example.com", false));
        let resolver = IdentityResolver::new(&db, &provider, &SystemClock);

        let err = resolver.resolve(&claims("user_x")).await.unwrap_err();
        assert!(matches!(err, AuthError::NoVerifiedEmail));
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(AccountRepository::new(&db).count().unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_subject_is_unauthorized() {
        let db = Database::in_memory().unwrap();
        let provider = MockIdentityProvider::default();
        let resolver = IdentityResolver::new(&db, &provider, &SystemClock);

        let err = resolver.resolve(&claims("user_gone")).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn provider_outage_is_internal() {
        let db = Database::in_memory().unwrap();
        let provider = MockIdentityProvider::failing();
        let resolver = IdentityResolver::new(&db, &provider, &SystemClock);

        let err = resolver.resolve(&claims("user_any")).await.unwrap_err();
        assert!(matches!(err, AuthError::IdentityProvider(_)));
    }

    #[tokio::test]
    async fn inactive_account_refused() {
        let db = Database::in_memory().unwrap();
        let mut account = StoredAccount::new("off@example.com", "Off", chrono::Utc::now());
        account.clerk_user_id = Some("user_off".into());
        account.is_active = false;
        AccountRepository::new(&db).create(&account).unwrap();

        let provider = MockIdentityProvider::default();
        let resolver = IdentityResolver::new(&db, &provider, &SystemClock);
        assert!(matches!(
            resolver.resolve(&claims("user_off")).await,
            Err(AuthError::AccountInactive)
        ));
    }

    #[tokio::test]
    async fn linked_account_without_verified_email_is_unauthorized() {
        let db = Database::in_memory().unwrap();
        let mut account = StoredAccount::new("pending@example.com", "Pending", chrono::Utc::now());
        account.clerk_user_id = Some("user_pending".into());
        AccountRepository::new(&db).create(&account).unwrap();

        let provider = MockIdentityProvider::with(profile("user_pending", "pending@example.com", false));
        let resolver = IdentityResolver::new(&db, &provider, &SystemClock);
        assert!(matches!(
            resolver.resolve(&claims("user_pending")).await,
            Err(AuthError::NoVerifiedEmail)
        ));

        // Verification on the provider side unlocks the account
        provider.insert(profile("user_pending", "pending@example.com", true));
        let resolved = resolver.resolve(&claims("user_pending")).await.unwrap();
        assert_eq!(resolved.id, account.id);
        assert!(resolved.is_verified);
        assert!(AccountRepository::new(&db).get(&account.id).unwrap().is_verified);

        // Verified accounts are not looked up again
        let calls = provider.calls();
        resolver.resolve(&claims("user_pending")).await.unwrap();
        assert_eq!(provider.calls(), calls);
    }

    #[test]
    fn clerk_user_url_joins_cleanly() {
        let client = ClerkClient::new(
            Url::parse("https://api.clerk.com/v1/").unwrap(),
            "sk_test",
            reqwest::Client::new(),
        );
        assert_eq!(client.user_url("user_1"), "https://api.clerk.com/v1/users/user_1");
    }

    #[test]
    fn profile_parses_clerk_payload() {
        let p: ExternalProfile = serde_json::from_value(serde_json::json!({
            "id": "user_29w83sxmDNGwOuEthce5gg56FcC",
            "object": "user",
            "first_name": "Example",
            "last_name": null,
            "primary_email_address_id": "idn_29w83yL7CwVlJXylYLxcslromF1",
            "email_addresses": [{
                "id": "idn_29w83yL7CwVlJXylYLxcslromF1",
                "email_address": "example@example.org",
                "verification": { "status": "verified", "strategy": "ticket" }
            }]
        }))
        .unwrap();
        assert_eq!(p.verified_email(), Some("example@example.org"));
        assert_eq!(p.display_name(), "Example");
    }

    #[tokio::test]
    async fn refresh_profile_is_best_effort() {
        let db = Database::in_memory().unwrap();
        let mut account = StoredAccount::new("stale@example.com", "Stale", chrono::Utc::now());
        account.clerk_user_id = Some("user_r".into());
        AccountRepository::new(&db).create(&account).unwrap();

        let failing = MockIdentityProvider::failing();
        let resolver = IdentityResolver::new(&db, &failing, &SystemClock);
        let unchanged = resolver.refresh_profile(account.clone()).await;
        assert_eq!(unchanged, account);

        let mut fresh = profile("user_r", "fresh@example.com", true);
        fresh.first_name = Some("Fresh".into());
        let provider = MockIdentityProvider::with(fresh);
        let resolver = IdentityResolver::new(&db, &provider, &SystemClock);
        let updated = resolver.refresh_profile(account).await;
        assert_eq!(updated.name, "Fresh");
        assert_eq!(updated.email, "fresh@example.com");
        assert!(updated.is_verified);
    }
}
