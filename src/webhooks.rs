// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Clerk webhook verification and account synchronization.
//!
//! ## Signature
//!
//! The `svix-signature` header carries one or more space separated
//! signatures, each an HMAC-SHA256 hex digest of the raw body, optionally
//! prefixed with `v1,`. Any matching signature authenticates the event;
//! comparison is constant-time.
//!
//! ## Events
//!
//! | Event          | Effect                                                  |
//! |----------------|---------------------------------------------------------|
//! | `user.created` | create the account, or link an unlinked one by email    |
//! | `user.updated` | update the display name of the linked account           |
//! | `user.deleted` | hard-delete the linked account and everything it owns   |
//!
//! Every handler is idempotent. Unknown event types are acknowledged and
//! ignored.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use utoipa::ToSchema;

use crate::auth::identity::ExternalProfile;
use crate::storage::repository::{ExternalIdentity, LinkOutcome};
use crate::storage::{AccountRepository, Database, StorageError};

pub const SIGNATURE_HEADER: &str = "svix-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook secret is not configured")]
    NotConfigured,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, WebhookError> {
    let mut mac = mac_for(secret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn mac_for(secret: &str) -> Result<HmacSha256, WebhookError> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::NotConfigured)
}

/// Check a signature header value against `body`.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> Result<(), WebhookError> {
    let mut mac = mac_for(secret)?;
    mac.update(body);

    let matched = header
        .split_whitespace()
        .map(|candidate| candidate.strip_prefix("v1,").unwrap_or(candidate))
        .filter_map(|candidate| hex::decode(candidate).ok())
        .any(|expected| mac.clone().verify_slice(&expected).is_ok());

    if matched {
        Ok(())
    } else {
        Err(WebhookError::InvalidSignature)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletedUser {
    #[serde(default)]
    pub id: Option<String>,
}

/// A Clerk webhook event this service understands.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    UserCreated(ExternalProfile),
    UserUpdated(ExternalProfile),
    UserDeleted(DeletedUser),
    Other(String),
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

        fn data<T: serde::de::DeserializeOwned>(
            value: serde_json::Value,
        ) -> Result<T, WebhookError> {
            serde_json::from_value(value).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
        }

        Ok(match envelope.kind.as_str() {
            "user.created" => WebhookEvent::UserCreated(data(envelope.data)?),
            "user.updated" => WebhookEvent::UserUpdated(data(envelope.data)?),
            "user.deleted" => WebhookEvent::UserDeleted(data(envelope.data)?),
            _ => WebhookEvent::Other(envelope.kind),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            WebhookEvent::UserCreated(_) => "user.created",
            WebhookEvent::UserUpdated(_) => "user.updated",
            WebhookEvent::UserDeleted(_) => "user.deleted",
            WebhookEvent::Other(kind) => kind,
        }
    }
}

/// What a handled event did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Created,
    Linked,
    Updated,
    Deleted,
    /// Nothing to do (already in sync, unknown account or unknown event)
    Ignored,
}

/// Applies identity-provider events to local accounts.
pub struct WebhookSynchronizer<'a> {
    db: &'a Database,
}

impl<'a> WebhookSynchronizer<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn handle(&self, event: &WebhookEvent, now: DateTime<Utc>) -> Result<SyncOutcome, WebhookError> {
        let outcome = match event {
            WebhookEvent::UserCreated(profile) => self.user_created(profile, now)?,
            WebhookEvent::UserUpdated(profile) => self.user_updated(profile)?,
            WebhookEvent::UserDeleted(deleted) => self.user_deleted(deleted)?,
            WebhookEvent::Other(kind) => {
                tracing::debug!(kind = %kind, "Ignoring webhook event");
                SyncOutcome::Ignored
            }
        };
        tracing::info!(kind = event.kind(), outcome = ?outcome, "Webhook event processed");
        Ok(outcome)
    }

    fn user_created(
        &self,
        profile: &ExternalProfile,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome, WebhookError> {
        let Some(email) = profile.any_email() else {
            tracing::warn!(external_id = %profile.id, "user.created without an email address");
            return Ok(SyncOutcome::Ignored);
        };

        let accounts = AccountRepository::new(self.db);
        if let Some(existing) = accounts.find_by_email(email)? {
            if existing
                .clerk_user_id
                .as_deref()
                .is_some_and(|linked| linked != profile.id)
            {
                tracing::warn!(
                    account_id = %existing.id,
                    "user.created for an email already linked to another identity"
                );
                return Ok(SyncOutcome::Ignored);
            }
        }

        let name = profile.display_name();
        let identity = ExternalIdentity {
            external_id: &profile.id,
            email,
            name: &name,
            email_verified: profile.verified_email().is_some(),
        };
        Ok(match accounts.link_or_create(&identity, now)? {
            LinkOutcome::Created(_) => SyncOutcome::Created,
            LinkOutcome::Linked(_) => SyncOutcome::Linked,
            LinkOutcome::Existing(_) => SyncOutcome::Ignored,
        })
    }

    fn user_updated(&self, profile: &ExternalProfile) -> Result<SyncOutcome, WebhookError> {
        let Some(name) = profile.full_name() else {
            return Ok(SyncOutcome::Ignored);
        };
        Ok(
            match AccountRepository::new(self.db).rename_by_external_id(&profile.id, &name)? {
                Some(_) => SyncOutcome::Updated,
                None => SyncOutcome::Ignored,
            },
        )
    }

    fn user_deleted(&self, deleted: &DeletedUser) -> Result<SyncOutcome, WebhookError> {
        let Some(external_id) = deleted.id.as_deref() else {
            return Ok(SyncOutcome::Ignored);
        };
        Ok(
            match AccountRepository::new(self.db).delete_by_external_id(external_id)? {
                Some(account_id) => {
                    tracing::info!(account_id = %account_id, "Account deleted by identity provider");
                    SyncOutcome::Deleted
                }
                None => SyncOutcome::Ignored,
            },
        )
    }
}
