use chrono::NaiveDateTime;

use crate::services::pricing::cents_to_amount;
use crate::state::AppState;

/// Snapshot of a freshly confirmed reservation, taken after commit.
#[derive(Debug, Clone)]
pub struct ConfirmationNotice {
    pub reservation_id: String,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub car_name: String,
    pub insurance_title: Option<String>,
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    pub pickup: NaiveDateTime,
    pub dropoff: NaiveDateTime,
    pub total_cents: i64,
}

/// Sends the customer receipt and the owner alert. Failures are logged and
/// never propagated.
pub async fn send_confirmation(state: &AppState, notice: &ConfirmationNotice) {
    let receipt = customer_receipt(notice);
    if let Err(e) = state
        .mailer
        .send_email(
            &notice.customer_email,
            "Your Reservation Confirmation",
            &receipt,
        )
        .await
    {
        tracing::error!(
            error = %e,
            reservation_id = %notice.reservation_id,
            "failed to send customer receipt"
        );
    }

    if state.config.owner_email.is_empty() {
        tracing::warn!("OWNER_EMAIL not configured, skipping owner alert");
        return;
    }

    let alert = owner_alert(notice);
    if let Err(e) = state
        .mailer
        .send_email(&state.config.owner_email, "New Car Rental Booking", &alert)
        .await
    {
        tracing::error!(
            error = %e,
            reservation_id = %notice.reservation_id,
            "failed to send owner alert"
        );
    }
}

fn format_total(cents: i64) -> String {
    format!("€{:.2}", cents_to_amount(cents))
}

fn format_instant(at: &NaiveDateTime) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

pub fn customer_receipt(notice: &ConfirmationNotice) -> String {
    let greeting = match notice.customer_name.as_deref() {
        Some(name) if !name.trim().is_empty() => format!("Hi {},", escape_html(name.trim())),
        _ => "Hi,".to_string(),
    };
    let insurance = notice
        .insurance_title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or("None");

    let mut rows = vec![
        ("Reservation", escape_html(&notice.reservation_id)),
        ("Car", escape_html(&notice.car_name)),
        ("Insurance", escape_html(insurance)),
        ("Pickup", format_instant(&notice.pickup)),
        ("Dropoff", format_instant(&notice.dropoff)),
    ];
    if let Some(location) = notice.pickup_location.as_deref().filter(|l| !l.is_empty()) {
        rows.push(("Pickup location", escape_html(location)));
    }
    if let Some(location) = notice.dropoff_location.as_deref().filter(|l| !l.is_empty()) {
        rows.push(("Dropoff location", escape_html(location)));
    }
    rows.push(("Total paid", format_total(notice.total_cents)));

    format!(
        "<p>{greeting}</p><p>Your car rental is confirmed.</p><table>{}</table><p>Thank you for booking with us.</p>",
        table_rows(&rows)
    )
}

pub fn owner_alert(notice: &ConfirmationNotice) -> String {
    let rows = [
        ("Reservation", escape_html(&notice.reservation_id)),
        ("Customer", escape_html(&notice.customer_email)),
        ("Car", escape_html(&notice.car_name)),
        (
            "Period",
            format!("{} to {}", format_instant(&notice.pickup), format_instant(&notice.dropoff)),
        ),
        ("Total", format_total(notice.total_cents)),
    ];
    format!("<p>New booking received.</p><table>{}</table>", table_rows(&rows))
}

fn table_rows(rows: &[(&str, String)]) -> String {
    rows.iter()
        .map(|(label, value)| format!("<tr><td><strong>{label}</strong></td><td>{value}</td></tr>"))
        .collect()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
