use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::ReservationStatus;
use crate::services::checkout::{self, CheckoutRequest, CheckoutResponse};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

impl SessionQuery {
    fn require(&self) -> Result<&str, AppError> {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::Validation("Missing session_id".to_string()))
    }
}

// POST /payments/checkout
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let response = checkout::create_checkout(&state, request).await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct StatusResponse {
    pub status: &'static str,
}

fn public_status(status: ReservationStatus) -> &'static str {
    match status {
        ReservationStatus::Pending => "pending",
        ReservationStatus::Confirmed => "confirmed",
        ReservationStatus::Failed | ReservationStatus::Cancelled => "failed",
    }
}

// GET /payments/status?session_id=
pub async fn status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<StatusResponse>, AppError> {
    let session_id = query.require()?;

    let local = {
        let db = state.db();
        queries::get_reservation_by_token(&db, session_id)?
    };
    if let Some(reservation) = local {
        return Ok(Json(StatusResponse {
            status: public_status(reservation.status),
        }));
    }

    // Webhook not processed yet: ask the provider whether the session is dead.
    let status = match state.payments.retrieve_session(session_id).await {
        Ok(session) if session.status.as_deref() == Some("expired") => "failed",
        Ok(_) => "pending",
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "live session status lookup failed");
            "pending"
        }
    };
    Ok(Json(StatusResponse { status }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub status: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub receipt_url: Option<String>,
}

// GET /payments/session?session_id=
pub async fn session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionResponse>, AppError> {
    let session_id = query.require()?;

    let session = state.payments.retrieve_session(session_id).await.map_err(|e| {
        tracing::warn!(session_id = %session_id, error = %e, "session lookup failed");
        AppError::Validation(e.to_string())
    })?;

    Ok(Json(SessionResponse {
        id: session.id,
        status: session.payment_status,
        amount_total: session.amount_total,
        currency: session.currency,
        receipt_url: session.receipt_url,
    }))
}
