// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the typed configuration loaded
//! once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATABASE_PATH` | redb database file | `./data/classroom-access.redb` |
//! | `CLERK_JWKS_URL` | Clerk JWKS endpoint for JWT verification | Required |
//! | `CLERK_ISSUER` | Expected JWT issuer claim | Required |
//! | `CLERK_API_URL` | Clerk backend API base URL | `https://api.clerk.com/v1` |
//! | `CLERK_SECRET_KEY` | Clerk backend API secret | Required |
//! | `CLERK_WEBHOOK_SECRET` | Shared secret for webhook signatures | Optional |
//! | `JWKS_CACHE_TTL_SECS` | JWKS cache lifetime | `3600` |
//! | `HTTP_TIMEOUT_SECS` | Timeout for outbound HTTP calls | `10` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";
pub const CLERK_JWKS_URL_ENV: &str = "CLERK_JWKS_URL";
pub const CLERK_ISSUER_ENV: &str = "CLERK_ISSUER";
pub const CLERK_API_URL_ENV: &str = "CLERK_API_URL";
pub const CLERK_SECRET_KEY_ENV: &str = "CLERK_SECRET_KEY";
pub const CLERK_WEBHOOK_SECRET_ENV: &str = "CLERK_WEBHOOK_SECRET";
pub const JWKS_CACHE_TTL_ENV: &str = "JWKS_CACHE_TTL_SECS";
pub const HTTP_TIMEOUT_ENV: &str = "HTTP_TIMEOUT_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE_PATH: &str = "./data/classroom-access.redb";
pub const DEFAULT_CLERK_API_URL: &str = "https://api.clerk.com/v1";
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub clerk_jwks_url: Url,
    pub clerk_issuer: String,
    pub clerk_api_url: Url,
    pub clerk_secret_key: String,
    pub clerk_webhook_secret: Option<String>,
    pub jwks_cache_ttl: Duration,
    pub http_timeout: Duration,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: PORT_ENV,
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    reason: format!("expected 'json' or 'pretty', got '{other}'"),
                })
            }
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            database_path: get(DATABASE_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            clerk_jwks_url: parse_url(CLERK_JWKS_URL_ENV, &required(CLERK_JWKS_URL_ENV)?)?,
            clerk_issuer: required(CLERK_ISSUER_ENV)?,
            clerk_api_url: parse_url(
                CLERK_API_URL_ENV,
                &get(CLERK_API_URL_ENV).unwrap_or_else(|| DEFAULT_CLERK_API_URL.to_string()),
            )?,
            clerk_secret_key: required(CLERK_SECRET_KEY_ENV)?,
            clerk_webhook_secret: get(CLERK_WEBHOOK_SECRET_ENV),
            jwks_cache_ttl: parse_secs(JWKS_CACHE_TTL_ENV, get(JWKS_CACHE_TTL_ENV))?
                .unwrap_or(DEFAULT_JWKS_CACHE_TTL),
            http_timeout: parse_secs(HTTP_TIMEOUT_ENV, get(HTTP_TIMEOUT_ENV))?
                .unwrap_or(DEFAULT_HTTP_TIMEOUT),
            log_format,
        })
    }

    /// Socket address to bind the HTTP server to.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: HOST_ENV,
                reason: e.to_string(),
            })
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "https" | "http" => Ok(url),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn parse_secs(name: &'static str, raw: Option<String>) -> Result<Option<Duration>, ConfigError> {
    raw.map(|raw| {
        raw.parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (CLERK_JWKS_URL_ENV, "https://clerk.example.com/.well-known/jwks.json".to_string()),
            (CLERK_ISSUER_ENV, "https://clerk.example.com".to_string()),
            (CLERK_SECRET_KEY_ENV, "sk_test_123".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn defaults_applied() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.jwks_cache_ttl, DEFAULT_JWKS_CACHE_TTL);
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.clerk_webhook_secret.is_none());
        assert_eq!(config.clerk_api_url.as_str(), "https://api.clerk.com/v1");
    }

    #[test]
    fn missing_issuer_rejected() {
        let mut env = base_env();
        env.remove(CLERK_ISSUER_ENV);
        assert!(matches!(load(&env), Err(ConfigError::Missing(CLERK_ISSUER_ENV))));
    }

    #[test]
    fn invalid_port_rejected() {
        let mut env = base_env();
        env.insert(PORT_ENV, "eighty".to_string());
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { name: PORT_ENV, .. })
        ));
    }

    #[test]
    fn non_http_jwks_url_rejected() {
        let mut env = base_env();
        env.insert(CLERK_JWKS_URL_ENV, "ftp://clerk.example.com/jwks".to_string());
        assert!(load(&env).is_err());
    }

    #[test]
    fn overrides_parsed() {
        let mut env = base_env();
        env.insert(PORT_ENV, "9090".to_string());
        env.insert(JWKS_CACHE_TTL_ENV, "120".to_string());
        env.insert(LOG_FORMAT_ENV, "json".to_string());
        env.insert(CLERK_WEBHOOK_SECRET_ENV, "whsec_abc".to_string());

        let config = load(&env).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.jwks_cache_ttl, Duration::from_secs(120));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.clerk_webhook_secret.as_deref(), Some("whsec_abc"));
        assert_eq!(config.bind_addr().unwrap().port(), 9090);
    }
}
