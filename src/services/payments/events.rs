use std::collections::BTreeMap;

use anyhow::Context;
use serde::Deserialize;

/// Payment events the reservation reconciler understands, decoupled from the
/// provider's own event names.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    CheckoutCompleted(CompletedCheckout),
    PaymentFailed {
        payment_intent: String,
        session_hint: Option<String>,
    },
    SessionExpired {
        session_token: String,
    },
    AsyncPaymentFailed {
        session_token: String,
    },
    Ignored {
        kind: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedCheckout {
    pub session_token: String,
    pub metadata: BTreeMap<String, String>,
    pub customer_email: Option<String>,
    pub amount_total_cents: i64,
    pub payment_reference: Option<String>,
    /// False while the provider reports the session as `unpaid`, i.e. an
    /// asynchronous method has not settled yet.
    pub paid: bool,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct SessionObject {
    id: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    customer_email: Option<String>,
    customer_details: Option<CustomerDetails>,
    amount_total: Option<i64>,
    payment_intent: Option<Expandable>,
    payment_status: Option<String>,
}

#[derive(Deserialize)]
struct CustomerDetails {
    email: Option<String>,
}

#[derive(Deserialize)]
struct PaymentIntentObject {
    id: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl SessionObject {
    fn customer_email(&self) -> Option<String> {
        self.customer_email
            .clone()
            .or_else(|| self.customer_details.as_ref().and_then(|d| d.email.clone()))
            .filter(|email| !email.trim().is_empty())
    }
}

/// Maps a verified webhook payload onto a [`PaymentEvent`].
pub fn parse_event(payload: &[u8]) -> anyhow::Result<PaymentEvent> {
    let raw: RawEvent = serde_json::from_slice(payload).context("invalid event payload")?;

    let event = match raw.kind.as_str() {
        "checkout.session.completed" => {
            let session: SessionObject = serde_json::from_value(raw.data.object)
                .context("invalid checkout session object")?;
            let customer_email = session.customer_email();
            PaymentEvent::CheckoutCompleted(CompletedCheckout {
                session_token: session.id,
                metadata: session.metadata,
                customer_email,
                amount_total_cents: session.amount_total.unwrap_or(0),
                payment_reference: session.payment_intent.map(Expandable::into_id),
                paid: session.payment_status.as_deref() != Some("unpaid"),
            })
        }
        "payment_intent.payment_failed" => {
            let intent: PaymentIntentObject = serde_json::from_value(raw.data.object)
                .context("invalid payment intent object")?;
            let session_hint = intent
                .metadata
                .get("session_id")
                .filter(|id| !id.is_empty())
                .cloned();
            PaymentEvent::PaymentFailed {
                payment_intent: intent.id,
                session_hint,
            }
        }
        "checkout.session.expired" | "checkout.session.async_payment_failed" => {
            let session: SessionObject = serde_json::from_value(raw.data.object)
                .context("invalid checkout session object")?;
            if raw.kind == "checkout.session.expired" {
                PaymentEvent::SessionExpired {
                    session_token: session.id,
                }
            } else {
                PaymentEvent::AsyncPaymentFailed {
                    session_token: session.id,
                }
            }
        }
        _ => PaymentEvent::Ignored { kind: raw.kind },
    };

    Ok(event)
}
