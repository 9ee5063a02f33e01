// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity-provider webhook endpoint.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    state::AppState,
    webhooks::{verify_signature, SyncOutcome, WebhookError, WebhookEvent, WebhookSynchronizer, SIGNATURE_HEADER},
};

/// Acknowledgement returned for every authenticated event.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    pub event_type: String,
    pub outcome: SyncOutcome,
}

/// Receive a Clerk user event.
///
/// The raw body is authenticated with HMAC-SHA256 before it is parsed.
/// Unknown event types are acknowledged and ignored.
#[utoipa::path(
    post,
    path = "/v1/webhooks/clerk",
    tag = "Webhooks",
    request_body(content = String, description = "Raw Clerk event JSON", content_type = "application/json"),
    params(("svix-signature" = String, Header, description = "HMAC-SHA256 hex digest of the body")),
    responses(
        (status = 200, description = "Event processed", body = WebhookAck),
        (status = 400, description = "Malformed event", body = crate::error::ErrorBody),
        (status = 401, description = "Missing or invalid signature", body = crate::error::ErrorBody),
        (status = 500, description = "Webhook secret not configured", body = crate::error::ErrorBody)
    )
)]
pub async fn clerk_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let secret = state
        .webhook_secret
        .as_deref()
        .ok_or(WebhookError::NotConfigured)?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;
    verify_signature(secret, &body, signature)?;

    let event = WebhookEvent::parse(&body)?;
    let outcome = WebhookSynchronizer::new(&state.db).handle(&event, state.clock.now())?;

    Ok(Json(WebhookAck {
        received: true,
        event_type: event.kind().to_string(),
        outcome,
    }))
}

#[cfg(test)]
mod tests {
    use crate::storage::AccountRepository;
    use crate::test_support::{profile, send, token_for, TestContext, TEST_WEBHOOK_SECRET};
    use crate::webhooks::{sign, SIGNATURE_HEADER};
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn created_body() -> String {
        json!({
            "type": "user.created",
            "data": {
                "id": "user_hook",
                "first_name": "Hook",
                "last_name": "User",
                "primary_email_address_id": "idn_1",
                "email_addresses": [{
                    "id": "idn_1",
                    "email_address": "hook@example.com",
                    "verification": { "status": "verified" }
                }]
            }
        })
        .to_string()
    }

    async fn deliver(ctx: &TestContext, body: &str, signature: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/clerk")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        let response = ctx
            .router()
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn signed_event_creates_account_once() {
        let ctx = TestContext::new();
        let body = created_body();
        let signature = format!("v1,{}", sign(TEST_WEBHOOK_SECRET, body.as_bytes()).unwrap());

        let (status, ack) = deliver(&ctx, &body, Some(&signature)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["event_type"], "user.created");
        assert_eq!(ack["outcome"], "created");

        let (status, ack) = deliver(&ctx, &body, Some(&signature)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["outcome"], "ignored");

        let account = AccountRepository::new(&ctx.db)
            .find_by_external_id("user_hook")
            .unwrap()
            .unwrap();
        assert_eq!(account.name, "Hook User");
    }

    #[tokio::test]
    async fn unsigned_or_forged_event_is_401_and_ignored() {
        let ctx = TestContext::new();
        let body = created_body();

        let (status, _) = deliver(&ctx, &body, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let forged = sign("whsec_wrong", body.as_bytes()).unwrap();
        let (status, _) = deliver(&ctx, &body, Some(&forged)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert_eq!(AccountRepository::new(&ctx.db).count().unwrap(), 0);
    }

    #[tokio::test]
    async fn signed_garbage_is_400() {
        let ctx = TestContext::new();
        let body = "{\"data\":{}}";
        let signature = sign(TEST_WEBHOOK_SECRET, body.as_bytes()).unwrap();
        let (status, _) = deliver(&ctx, body, Some(&signature)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_account_without_verified_email_cannot_authenticate() {
        let ctx = TestContext::new();
        let body = json!({
            "type": "user.created",
            "data": {
                "id": "user_unverified",
                "first_name": "Una",
                "primary_email_address_id": "idn_1",
                "email_addresses": [{
                    "id": "idn_1",
                    "email_address": "una@example.com",
                    "verification": { "status": "unverified" }
                }]
            }
        })
        .to_string();
        let signature = sign(TEST_WEBHOOK_SECRET, body.as_bytes()).unwrap();
        let (status, ack) = deliver(&ctx, &body, Some(&signature)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["outcome"], "created");

        ctx.identity
            .insert(profile("user_unverified", "una@example.com", false));
        let token = token_for("user_unverified");
        let (status, _) = send(ctx.router(), Method::GET, "/v1/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        ctx.identity
            .insert(profile("user_unverified", "una@example.com", true));
        let (status, me) = send(ctx.router(), Method::GET, "/v1/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "una@example.com");
    }

    #[tokio::test]
    async fn missing_secret_is_500() {
        let mut ctx = TestContext::new();
        ctx.state.webhook_secret = None;
        let body = created_body();
        let signature = sign(TEST_WEBHOOK_SECRET, body.as_bytes()).unwrap();
        let (status, _) = deliver(&ctx, &body, Some(&signature)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
