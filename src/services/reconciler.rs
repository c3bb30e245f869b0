use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::models::payment::METHOD_CARD;
use crate::models::{Payment, PaymentStatus, Reservation, ReservationStatus};
use crate::services::availability;
use crate::services::checkout::{BookingMetadata, MetadataError};
use crate::services::notifications::{self, ConfirmationNotice};
use crate::services::payments::events::{CompletedCheckout, PaymentEvent};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The event can never be applied. Safe to drop.
    #[error("malformed checkout metadata: {0}")]
    Malformed(#[from] MetadataError),

    /// Storage failed mid-way; the transaction was rolled back.
    #[error("reconciliation storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug)]
pub enum Outcome {
    /// The reservation became confirmed by this event.
    Confirmed(ConfirmationNotice),
    /// A previous delivery already confirmed it. Nothing was written.
    AlreadyConfirmed { reservation_id: String },
    /// The reservation is in a state payments may not touch.
    Skipped {
        reservation_id: String,
        status: ReservationStatus,
    },
    /// The session completed but no money was captured yet.
    AwaitingPayment,
}

/// Applies a successful checkout exactly once per session token.
///
/// Runs in one IMMEDIATE transaction so the user upsert, the reservation
/// write and the payment insert land together or not at all, and so that a
/// concurrent duplicate delivery sees the committed result.
pub fn apply_checkout_completed(
    conn: &mut Connection,
    checkout: &CompletedCheckout,
) -> Result<Outcome, ReconcileError> {
    let token = checkout.session_token.as_str();
    if !checkout.paid {
        return Ok(Outcome::AwaitingPayment);
    }

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin reconcile transaction")?;

    let existing = queries::get_reservation_by_token(&tx, token)?;
    match &existing {
        Some(r) if r.status == ReservationStatus::Confirmed => {
            return Ok(Outcome::AlreadyConfirmed {
                reservation_id: r.id.clone(),
            });
        }
        Some(r) if r.status == ReservationStatus::Cancelled => {
            return Ok(Outcome::Skipped {
                reservation_id: r.id.clone(),
                status: r.status,
            });
        }
        _ => {}
    }

    let metadata = BookingMetadata::decode(&checkout.metadata, checkout.customer_email.as_deref())?;
    let vehicle = queries::get_vehicle(&tx, metadata.car_id)?
        .ok_or(MetadataError::UnknownVehicle(metadata.car_id))?;

    let plan = match metadata.insurance_id {
        Some(id) => {
            let plan = queries::get_insurance_plan(&tx, id)?;
            if plan.is_none() {
                tracing::warn!(session_id = %token, insurance_id = id, "unknown insurance plan in metadata");
            }
            plan
        }
        None => None,
    };

    if availability::has_conflict(&tx, vehicle.id, &metadata.pickup, &metadata.dropoff, Some(token))? {
        // Money is already captured, so the booking stands and staff must resolve it.
        tracing::warn!(
            session_id = %token,
            vehicle_id = vehicle.id,
            "confirmed reservation overlaps another active reservation"
        );
    }

    let user = queries::upsert_user(
        &tx,
        &metadata.driver_email,
        metadata.driver_name.as_deref(),
        metadata.driver_phone.as_deref(),
    )?;

    let now = Utc::now().naive_utc();
    let reservation = Reservation {
        id: existing
            .as_ref()
            .map(|r| r.id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        user_id: user.id,
        vehicle_id: vehicle.id,
        insurance_plan_id: plan.as_ref().map(|p| p.id),
        start_at: metadata.pickup,
        end_at: metadata.dropoff,
        total_cost_cents: checkout.amount_total_cents,
        session_token: token.to_string(),
        status: ReservationStatus::Confirmed,
        created_at: now,
        updated_at: now,
    };

    let written = if existing.is_some() {
        queries::confirm_reservation(&tx, &reservation)?
    } else {
        queries::insert_reservation(&tx, &reservation)?
    };
    if !written {
        return Err(anyhow::anyhow!("reservation for session {token} changed during reconciliation").into());
    }

    queries::insert_payment(
        &tx,
        &Payment {
            id: uuid::Uuid::new_v4().to_string(),
            reservation_id: reservation.id.clone(),
            amount_cents: checkout.amount_total_cents,
            status: PaymentStatus::Paid,
            method: METHOD_CARD.to_string(),
            transaction_ref: checkout.payment_reference.clone(),
            paid_at: Some(now),
        },
    )?;

    tx.commit().context("failed to commit reconcile transaction")?;

    let insurance_title = plan.map(|p| p.title).or(metadata.insurance_title);
    Ok(Outcome::Confirmed(ConfirmationNotice {
        reservation_id: reservation.id,
        customer_email: metadata.driver_email,
        customer_name: metadata.driver_name,
        car_name: metadata.car_name.unwrap_or_else(|| vehicle.display_name()),
        insurance_title,
        pickup_location: metadata.pickup_location,
        dropoff_location: metadata.dropoff_location,
        pickup: metadata.pickup,
        dropoff: metadata.dropoff,
        total_cents: checkout.amount_total_cents,
    }))
}

/// Marks a pending reservation failed. Confirmed, cancelled and unknown
/// tokens are left alone. Returns whether anything changed.
pub fn apply_failure(conn: &Connection, session_token: &str) -> anyhow::Result<bool> {
    queries::fail_reservation(conn, session_token)
}

/// Entry point for verified webhook events. Never fails: every error is
/// logged so the webhook can still acknowledge the delivery.
pub async fn handle_event(state: &Arc<AppState>, event: PaymentEvent) {
    match event {
        PaymentEvent::CheckoutCompleted(checkout) => handle_completed(state, &checkout),
        PaymentEvent::PaymentFailed {
            payment_intent,
            session_hint,
        } => {
            let token = match session_hint {
                Some(token) => Some(token),
                None => match state
                    .payments
                    .find_session_for_payment_intent(&payment_intent)
                    .await
                {
                    Ok(token) => token,
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            payment_intent = %payment_intent,
                            "failed to resolve session for payment intent"
                        );
                        None
                    }
                },
            };

            match token {
                Some(token) => mark_failed(state, &token, "payment_intent.payment_failed"),
                None => tracing::warn!(
                    payment_intent = %payment_intent,
                    "payment failed for unknown session"
                ),
            }
        }
        PaymentEvent::SessionExpired { session_token } => {
            mark_failed(state, &session_token, "checkout.session.expired")
        }
        PaymentEvent::AsyncPaymentFailed { session_token } => {
            mark_failed(state, &session_token, "checkout.session.async_payment_failed")
        }
        PaymentEvent::Ignored { kind } => {
            tracing::debug!(event_type = %kind, "ignoring payment event");
        }
    }
}

fn handle_completed(state: &Arc<AppState>, checkout: &CompletedCheckout) {
    let token = checkout.session_token.as_str();
    let outcome = {
        let mut db = state.db();
        apply_checkout_completed(&mut db, checkout)
    };

    match outcome {
        Ok(Outcome::Confirmed(notice)) => {
            tracing::info!(
                session_id = %token,
                reservation_id = %notice.reservation_id,
                amount_cents = notice.total_cents,
                "reservation confirmed"
            );
            let state = Arc::clone(state);
            tokio::spawn(async move {
                notifications::send_confirmation(&state, &notice).await;
            });
        }
        Ok(Outcome::AlreadyConfirmed { reservation_id }) => {
            tracing::info!(
                session_id = %token,
                reservation_id = %reservation_id,
                "duplicate checkout completion ignored"
            );
        }
        Ok(Outcome::Skipped {
            reservation_id,
            status,
        }) => {
            tracing::warn!(
                session_id = %token,
                reservation_id = %reservation_id,
                status = status.as_str(),
                "checkout completed for a reservation that cannot be confirmed"
            );
        }
        Ok(Outcome::AwaitingPayment) => {
            tracing::info!(session_id = %token, "checkout completed without captured payment, leaving pending");
        }
        Err(ReconcileError::Malformed(e)) => {
            tracing::warn!(session_id = %token, error = %e, "dropping malformed checkout event");
        }
        Err(e @ ReconcileError::Storage(_)) => {
            tracing::error!(session_id = %token, error = %e, "failed to reconcile checkout");
        }
    }
}

fn mark_failed(state: &AppState, session_token: &str, event_type: &str) {
    let result = {
        let db = state.db();
        apply_failure(&db, session_token)
    };

    match result {
        Ok(true) => tracing::info!(
            session_id = %session_token,
            event_type = %event_type,
            "reservation marked failed"
        ),
        Ok(false) => tracing::info!(
            session_id = %session_token,
            event_type = %event_type,
            "no pending reservation to fail"
        ),
        Err(e) => tracing::error!(
            session_id = %session_token,
            event_type = %event_type,
            error = %e,
            "failed to mark reservation failed"
        ),
    }
}
