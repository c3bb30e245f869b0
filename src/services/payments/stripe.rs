use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;

use super::{CheckoutSession, CheckoutSessionRequest, PaymentProvider};

pub struct StripeProvider {
    secret_key: String,
    api_base: String,
    client: reqwest::Client,
}

impl StripeProvider {
    pub fn new(secret_key: String, api_base: String) -> Self {
        Self {
            secret_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn read_json(resp: reqwest::Response, what: &str) -> anyhow::Result<Value> {
        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse Stripe {what} response"))?;

        if !status.is_success() {
            let message = data["error"]["message"].as_str().unwrap_or("unknown error");
            anyhow::bail!("Stripe {what} failed ({status}): {message}");
        }
        Ok(data)
    }
}

/// Flattens a session request into Stripe's bracketed form encoding.
fn session_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("payment_method_types[0]".into(), "card".into()),
        ("line_items[0][quantity]".into(), "1".into()),
        ("line_items[0][price_data][currency]".into(), request.currency.clone()),
        (
            "line_items[0][price_data][unit_amount]".into(),
            request.amount_cents.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".into(),
            request.product_name.clone(),
        ),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        ("customer_email".into(), request.customer_email.clone()),
        ("expires_at".into(), request.expires_at.to_string()),
    ];

    if !request.description.is_empty() {
        form.push((
            "line_items[0][price_data][product_data][description]".into(),
            request.description.clone(),
        ));
    }

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
    form
}

fn parse_session(data: &Value) -> anyhow::Result<CheckoutSession> {
    let id = data["id"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("missing id in Stripe session"))?;

    let text = |key: &str| data[key].as_str().map(str::to_string);

    Ok(CheckoutSession {
        id: id.to_string(),
        url: text("url"),
        status: text("status"),
        payment_status: text("payment_status"),
        amount_total: data["amount_total"].as_i64(),
        currency: text("currency"),
        receipt_url: data["payment_intent"]["latest_charge"]["receipt_url"]
            .as_str()
            .map(str::to_string),
    })
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> anyhow::Result<CheckoutSession> {
        let resp = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&session_form(request))
            .send()
            .await
            .context("failed to call Stripe checkout API")?;

        let data = Self::read_json(resp, "session create").await?;
        parse_session(&data)
    }

    async fn retrieve_session(&self, session_id: &str) -> anyhow::Result<CheckoutSession> {
        anyhow::ensure!(
            !session_id.is_empty()
                && session_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
            "invalid checkout session id: {session_id}"
        );

        let resp = self
            .client
            .get(format!("{}/v1/checkout/sessions/{session_id}", self.api_base))
            .bearer_auth(&self.secret_key)
            .query(&[("expand[]", "payment_intent.latest_charge")])
            .send()
            .await
            .context("failed to call Stripe checkout API")?;

        let data = Self::read_json(resp, "session retrieve").await?;
        parse_session(&data)
    }

    async fn find_session_for_payment_intent(
        &self,
        payment_intent: &str,
    ) -> anyhow::Result<Option<String>> {
        let resp = self
            .client
            .get(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .query(&[("payment_intent", payment_intent), ("limit", "1")])
            .send()
            .await
            .context("failed to call Stripe checkout API")?;

        let data = Self::read_json(resp, "session list").await?;
        Ok(data["data"][0]["id"].as_str().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_session_form_encodes_metadata() {
        let mut metadata = BTreeMap::new();
        metadata.insert("carId".to_string(), "12".to_string());
        let request = CheckoutSessionRequest {
            amount_cents: 15050,
            currency: "eur".to_string(),
            product_name: "Car rental - Fiat Panda".to_string(),
            description: String::new(),
            customer_email: "a@example.com".to_string(),
            success_url: "http://x/success".to_string(),
            cancel_url: "http://x/checkout".to_string(),
            expires_at: 1_750_000_000,
            metadata,
        };

        let form = session_form(&request);
        assert!(form.contains(&("line_items[0][price_data][unit_amount]".to_string(), "15050".to_string())));
        assert!(form.contains(&("metadata[carId]".to_string(), "12".to_string())));
        assert!(!form.iter().any(|(k, _)| k.ends_with("[description]")));
    }

    #[test]
    fn test_parse_session_with_expanded_charge() {
        let data = json!({
            "id": "cs_test_1",
            "url": null,
            "status": "complete",
            "payment_status": "paid",
            "amount_total": 13000,
            "currency": "eur",
            "payment_intent": {
                "id": "pi_1",
                "latest_charge": { "receipt_url": "https://pay.example/receipt" }
            }
        });
        let session = parse_session(&data).unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert_eq!(session.url, None);
        assert_eq!(session.payment_status.as_deref(), Some("paid"));
        assert_eq!(session.amount_total, Some(13000));
        assert_eq!(session.receipt_url.as_deref(), Some("https://pay.example/receipt"));
    }

    #[test]
    fn test_parse_session_requires_id() {
        assert!(parse_session(&json!({"status": "open"})).is_err());
    }
}
