pub mod cars;
pub mod health;
pub mod insurance;
pub mod payments;
pub mod webhook;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/cars/search", post(cars::search))
        .route("/insurance/plans", get(insurance::list_plans))
        .route("/payments/checkout", post(payments::create_checkout))
        .route("/payments/status", get(payments::status))
        .route("/payments/session", get(payments::session))
        .route("/webhooks/payment", post(webhook::payment_webhook))
        .with_state(state)
}
