pub mod events;
pub mod stripe;

use std::collections::BTreeMap;

use async_trait::async_trait;

/// Everything the provider needs to open a hosted checkout page.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub product_name: String,
    pub description: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Unix timestamp after which the provider expires the session.
    pub expires_at: i64,
    /// Flat string metadata echoed back on every event for the session.
    pub metadata: BTreeMap<String, String>,
}

/// Provider-side view of a checkout session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    /// `open`, `complete` or `expired`.
    pub status: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`.
    pub payment_status: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub receipt_url: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> anyhow::Result<CheckoutSession>;

    async fn retrieve_session(&self, session_id: &str) -> anyhow::Result<CheckoutSession>;

    /// Finds the checkout session that created `payment_intent`, if any.
    async fn find_session_for_payment_intent(
        &self,
        payment_intent: &str,
    ) -> anyhow::Result<Option<String>>;
}
