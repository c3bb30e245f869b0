use std::sync::{Arc, Mutex};

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use carhire::config::AppConfig;
use carhire::db;
use carhire::handlers;
use carhire::services::email::resend::ResendProvider;
use carhire::services::payments::stripe::StripeProvider;
use carhire::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    anyhow::ensure!(
        !config.stripe_secret_key.is_empty(),
        "STRIPE_SECRET_KEY must be set"
    );
    if config.stripe_webhook_secret.is_empty() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set, payment webhooks will be rejected");
    }
    if config.resend_api_key.is_empty() {
        tracing::warn!("RESEND_API_KEY not set, confirmation emails are disabled");
    }

    let payments = StripeProvider::new(
        config.stripe_secret_key.clone(),
        config.stripe_api_base.clone(),
    );
    let mailer = ResendProvider::new(config.resend_api_key.clone(), config.from_email.clone());

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        payments: Box::new(payments),
        mailer: Box::new(mailer),
    });

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
