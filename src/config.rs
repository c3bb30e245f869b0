use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub base_url: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub checkout_currency: String,
    pub checkout_session_ttl_minutes: i64,
    pub webhook_tolerance_secs: i64,
    pub resend_api_key: String,
    pub from_email: String,
    pub owner_email: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "carhire.db".to_string()),
            base_url: env::var("BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            checkout_currency: env::var("CHECKOUT_CURRENCY").unwrap_or_else(|_| "eur".to_string()),
            // The provider refuses sessions that expire in under 30 minutes.
            checkout_session_ttl_minutes: env::var("CHECKOUT_SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30)
                .max(30),
            webhook_tolerance_secs: env::var("WEBHOOK_TOLERANCE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),
            from_email: env::var("FROM_EMAIL").unwrap_or_else(|_| "bookings@localhost".to_string()),
            owner_email: env::var("OWNER_EMAIL").unwrap_or_default(),
        }
    }
}
