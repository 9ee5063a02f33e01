// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use classroom_access_server::{
    api::router,
    auth::{identity::http_client, ClerkClient, JwksManager, TokenVerifier},
    clock::{SharedClock, SystemClock},
    config::{AppConfig, LogFormat},
    logging::init_tracing,
    state::AppState,
    storage::{Database, RbacRepository},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::Pretty);
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    init_tracing(config.log_format);

    let clock: SharedClock = Arc::new(SystemClock);

    // Open the store and make sure the role catalog exists
    let db = Arc::new(Database::open(&config.database_path)?);
    RbacRepository::new(&db).seed()?;
    tracing::info!(path = %config.database_path.display(), "Database ready");

    // One outbound client (and timeout) for JWKS and the Clerk API
    let http = http_client(config.http_timeout)?;
    let jwks = JwksManager::new(config.clerk_jwks_url.as_str(), http.clone(), clock.clone())
        .with_cache_ttl(config.jwks_cache_ttl);
    let verifier = Arc::new(TokenVerifier::new(
        Arc::new(jwks),
        config.clerk_issuer.clone(),
    ));
    let identity = Arc::new(ClerkClient::new(
        config.clerk_api_url.clone(),
        config.clerk_secret_key.clone(),
        http,
    ));

    let mut state = AppState::new(db, verifier, identity, clock);
    match config.clerk_webhook_secret.as_deref() {
        Some(secret) => state = state.with_webhook_secret(secret),
        None => tracing::warn!("CLERK_WEBHOOK_SECRET not set; webhook deliveries will be refused"),
    }

    let app = router(state);
    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Classroom access server listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
