use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::EmailProvider;

const RESEND_URL: &str = "https://api.resend.com/emails";

pub struct ResendProvider {
    api_key: String,
    from: String,
    client: reqwest::Client,
}

impl ResendProvider {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            api_key,
            from,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmailProvider for ResendProvider {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            tracing::warn!(to = %to, subject = %subject, "RESEND_API_KEY not set, skipping email");
            return Ok(());
        }

        self.client
            .post(RESEND_URL)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .context("failed to send email via Resend")?
            .error_for_status()
            .context("Resend API returned error")?;

        Ok(())
    }
}
