// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Cache policy
//!
//! - Keys are fetched lazily on first use and kept for the configured TTL
//! - A token whose `kid` is not in the cached set triggers one refresh, at
//!   most once per [`MIN_REFRESH_INTERVAL`]
//! - If a refresh fails while a stale set is cached, the stale set is used
//! - Concurrent first fetches may race; the last writer wins, which is fine
//!   because every fetch returns the same upstream document
//!
//! Time comes from the injected [`Clock`], so expiry is testable.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;

use super::error::TokenRejection;
use crate::clock::SharedClock;
use crate::config::DEFAULT_JWKS_CACHE_TTL;

/// Minimum gap between refreshes forced by an unknown `kid`.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

struct CacheEntry {
    jwks: JwkSet,
    fetched_at: DateTime<Utc>,
}

enum KeySource {
    Remote {
        url: String,
        client: reqwest::Client,
    },
    /// Fixed key set; never refreshed.
    Static,
}

/// JWKS manager with caching.
#[derive(Clone)]
pub struct JwksManager {
    source: Arc<KeySource>,
    cache_ttl: Duration,
    cache: Arc<RwLock<Option<CacheEntry>>>,
    clock: SharedClock,
}

impl JwksManager {
    /// Manager that fetches from `jwks_url` using `client` (which carries the
    /// outbound timeout).
    pub fn new(jwks_url: impl Into<String>, client: reqwest::Client, clock: SharedClock) -> Self {
        Self {
            source: Arc::new(KeySource::Remote {
                url: jwks_url.into(),
                client,
            }),
            cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            cache: Arc::new(RwLock::new(None)),
            clock,
        }
    }

    /// Manager serving a fixed key set.
    pub fn from_static(jwks: JwkSet, clock: SharedClock) -> Self {
        let fetched_at = clock.now();
        Self {
            source: Arc::new(KeySource::Static),
            cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            cache: Arc::new(RwLock::new(Some(CacheEntry { jwks, fetched_at }))),
            clock,
        }
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        if matches!(*self.source, KeySource::Static) {
            return true;
        }
        let age = self.clock.now() - entry.fetched_at;
        age.to_std().map(|age| age < self.cache_ttl).unwrap_or(true)
    }

    /// Current key set, fetching if the cache is empty or expired.
    async fn get_jwks(&self) -> Result<JwkSet, TokenRejection> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = &*cache {
                if self.is_fresh(entry) {
                    return Ok(entry.jwks.clone());
                }
            }
        }

        match self.refresh().await {
            Ok(jwks) => Ok(jwks),
            Err(e) => {
                let cache = self.cache.read().await;
                match &*cache {
                    Some(entry) => {
                        tracing::warn!(error = %e, "JWKS refresh failed, using stale keys");
                        Ok(entry.jwks.clone())
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Fetch JWKS from the endpoint.
    async fn fetch_jwks(&self) -> Result<Option<JwkSet>, TokenRejection> {
        let KeySource::Remote { url, client } = &*self.source else {
            return Ok(None);
        };

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| TokenRejection::KeySetUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TokenRejection::KeySetUnavailable(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| TokenRejection::KeySetUnavailable(e.to_string()))?;

        tracing::debug!(keys = jwks.keys.len(), "Fetched JWKS");
        Ok(Some(jwks))
    }

    /// Force refresh the JWKS cache and return the new set.
    pub async fn refresh(&self) -> Result<JwkSet, TokenRejection> {
        match self.fetch_jwks().await? {
            Some(jwks) => {
                let mut cache = self.cache.write().await;
                *cache = Some(CacheEntry {
                    jwks: jwks.clone(),
                    fetched_at: self.clock.now(),
                });
                Ok(jwks)
            }
            None => {
                let cache = self.cache.read().await;
                cache
                    .as_ref()
                    .map(|entry| entry.jwks.clone())
                    .ok_or_else(|| TokenRejection::KeySetUnavailable("no keys configured".into()))
            }
        }
    }

    /// Whether the cached set was fetched less than `MIN_REFRESH_INTERVAL` ago.
    async fn recently_fetched(&self) -> bool {
        let cache = self.cache.read().await;
        cache.as_ref().is_some_and(|entry| {
            (self.clock.now() - entry.fetched_at)
                .to_std()
                .map(|age| age < MIN_REFRESH_INTERVAL)
                .unwrap_or(true)
        })
    }

    /// Get the decoding key for a token header's `kid`.
    ///
    /// Without a `kid`, the first usable key is returned.
    pub async fn get_decoding_key(
        &self,
        kid: Option<&str>,
    ) -> Result<(DecodingKey, Algorithm), TokenRejection> {
        let jwks = self.get_jwks().await?;

        let Some(kid) = kid else {
            return jwks
                .keys
                .iter()
                .find_map(|jwk| jwk_to_decoding_key(jwk).ok())
                .ok_or(TokenRejection::UnknownKey);
        };

        if let Some(jwk) = find_key(&jwks, kid) {
            return jwk_to_decoding_key(jwk);
        }

        // Unknown kid: the provider may have rotated keys
        if matches!(*self.source, KeySource::Static) || self.recently_fetched().await {
            return Err(TokenRejection::UnknownKey);
        }
        tracing::info!(kid, "Unknown JWKS kid, refreshing key set");
        let jwks = self.refresh().await?;
        find_key(&jwks, kid)
            .ok_or(TokenRejection::UnknownKey)
            .and_then(jwk_to_decoding_key)
    }

    /// Check if JWKS is currently cached and valid.
    pub async fn is_cached(&self) -> bool {
        let cache = self.cache.read().await;
        cache.as_ref().is_some_and(|entry| self.is_fresh(entry))
    }
}

fn find_key<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwks.keys
        .iter()
        .find(|k| k.common.key_id.as_deref() == Some(kid))
}

/// Convert a JWK to a DecodingKey and the algorithm tokens must use with it.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), TokenRejection> {
    let declared = jwk.common.key_algorithm;
    let alg = match &jwk.algorithm {
        AlgorithmParameters::RSA(_) => match declared {
            Some(KeyAlgorithm::RS384) => Algorithm::RS384,
            Some(KeyAlgorithm::RS512) => Algorithm::RS512,
            Some(KeyAlgorithm::PS256) => Algorithm::PS256,
            Some(KeyAlgorithm::PS384) => Algorithm::PS384,
            Some(KeyAlgorithm::PS512) => Algorithm::PS512,
            _ => Algorithm::RS256,
        },
        AlgorithmParameters::EllipticCurve(_) => match declared {
            Some(KeyAlgorithm::ES384) => Algorithm::ES384,
            _ => Algorithm::ES256,
        },
        AlgorithmParameters::OctetKeyPair(_) => Algorithm::EdDSA,
        AlgorithmParameters::OctetKey(_) => match declared {
            Some(KeyAlgorithm::HS384) => Algorithm::HS384,
            Some(KeyAlgorithm::HS512) => Algorithm::HS512,
            _ => Algorithm::HS256,
        },
    };

    let key = DecodingKey::from_jwk(jwk)
        .map_err(|e| TokenRejection::UnsupportedKey(e.to_string()))?;
    Ok((key, alg))
}
