use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use crate::services::payments::events;
use crate::services::reconciler;
use crate::state::AppState;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SignatureError {
    #[error("missing Stripe-Signature header")]
    Missing,

    #[error("malformed Stripe-Signature header")]
    Malformed,

    #[error("signature timestamp outside tolerance")]
    Expired,

    #[error("no matching signature")]
    Mismatch,
}

/// Checks a `t=<unix>,v1=<hex>[,v1=<hex>]` header against
/// HMAC-SHA256(secret, "<t>.<payload>").
pub fn verify_stripe_signature(
    secret: &str,
    header: &str,
    payload: &[u8],
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    if header.trim().is_empty() {
        return Err(SignatureError::Missing);
    }

    let mut timestamp = None;
    let mut signatures = vec![];
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    for signature in signatures {
        let Ok(expected) = hex::decode(signature) else {
            continue;
        };
        let mut mac =
            Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        // verify_slice compares in constant time.
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

fn reject(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn acknowledge() -> Response {
    (StatusCode::OK, Json(json!({ "received": true }))).into_response()
}

// POST /webhooks/payment
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let secret = &state.config.stripe_webhook_secret;
    if secret.is_empty() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not configured, rejecting webhook");
        return reject("Webhook not configured");
    }

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let now = chrono::Utc::now().timestamp();
    if let Err(e) = verify_stripe_signature(
        secret,
        signature,
        &body,
        now,
        state.config.webhook_tolerance_secs,
    ) {
        tracing::warn!(error = %e, "invalid webhook signature");
        return reject("Invalid signature");
    }

    // Past this point the delivery is always acknowledged.
    let event = match events::parse_event(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "dropping unparsable webhook payload");
            return acknowledge();
        }
    };

    tracing::info!(event_type = event_kind(&event), "payment webhook received");
    reconciler::handle_event(&state, event).await;

    acknowledge()
}

fn event_kind(event: &events::PaymentEvent) -> &str {
    use events::PaymentEvent::*;
    match event {
        CheckoutCompleted(_) => "checkout_completed",
        PaymentFailed { .. } => "payment_failed",
        SessionExpired { .. } => "session_expired",
        AsyncPaymentFailed { .. } => "async_payment_failed",
        Ignored { kind } => kind.as_str(),
    }
}
