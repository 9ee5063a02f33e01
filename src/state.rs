// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{IdentityProvider, TokenVerifier};
use crate::clock::SharedClock;
use crate::storage::Database;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub verifier: Arc<TokenVerifier>,
    /// Clerk user directory
    pub identity: Arc<dyn IdentityProvider>,
    /// Shared secret for webhook signatures; webhooks are refused when unset
    pub webhook_secret: Option<Arc<str>>,
    pub clock: SharedClock,
}

impl AppState {
    pub fn new(
        db: Arc<Database>,
        verifier: Arc<TokenVerifier>,
        identity: Arc<dyn IdentityProvider>,
        clock: SharedClock,
    ) -> Self {
        Self {
            db,
            verifier,
            identity,
            webhook_secret: None,
            clock,
        }
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<Arc<str>>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }
}
