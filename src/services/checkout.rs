use std::collections::BTreeMap;

use chrono::{NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Reservation, ReservationStatus};
use crate::services::availability;
use crate::services::payments::CheckoutSessionRequest;
use crate::services::pricing::{self, IntervalError};
use crate::state::AppState;

const FALLBACK_CAR_NAME: &str = "Car rental";

/// Largest accepted difference between the client's total and the server quote.
const MAX_TOTAL_DRIFT_CENTS: i64 = 1;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[validate(range(min = 0.01))]
    pub total_amount: f64,
    #[validate]
    pub car: CarSummary,
    #[validate]
    pub insurance: Option<InsuranceSummary>,
    #[validate]
    pub criteria: CriteriaSummary,
    #[validate]
    pub driver: DriverDetails,
}

/// Vehicle ids arrive as numbers or numeric strings depending on the page.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CarId {
    Number(i64),
    Text(String),
}

impl CarId {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CarId::Number(n) => Some(*n),
            CarId::Text(s) => s.trim().parse().ok(),
        }
        .filter(|id| *id > 0)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CarSummary {
    pub id: CarId,
    pub make: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
    #[validate(range(min = 0.0))]
    pub total_price: f64,
}

impl CarSummary {
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        let joined = [self.make.as_deref(), self.model.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            FALLBACK_CAR_NAME.to_string()
        } else {
            joined
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceSummary {
    pub id: Option<i64>,
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(range(min = 0.0))]
    pub daily_price: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaSummary {
    #[validate(length(min = 1))]
    pub pickup_location: String,
    #[validate(length(min = 1))]
    pub dropoff_location: String,
    #[validate(length(min = 1))]
    pub pickup_date: String,
    #[validate(length(min = 1))]
    pub dropoff_date: String,
    #[validate(length(min = 1))]
    pub pickup_time: String,
    #[validate(length(min = 1))]
    pub dropoff_time: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DriverDetails {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 3, max = 40))]
    pub phone: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MetadataError {
    #[error("missing metadata field {0}")]
    Missing(&'static str),

    #[error("metadata field {field} is not a valid number: {value:?}")]
    NotNumeric { field: &'static str, value: String },

    #[error("invalid rental period in metadata: {0}")]
    Interval(#[from] IntervalError),

    #[error("invalid customer email: {0:?}")]
    InvalidEmail(String),

    #[error("vehicle {0} from metadata does not exist")]
    UnknownVehicle(i64),
}

/// Booking details carried through the provider's flat string metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingMetadata {
    pub car_id: i64,
    pub car_name: Option<String>,
    pub insurance_id: Option<i64>,
    pub insurance_title: Option<String>,
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    pub pickup: NaiveDateTime,
    pub dropoff: NaiveDateTime,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub driver_email: String,
    pub total_amount: Option<f64>,
}

fn format_time(at: &NaiveDateTime) -> String {
    if at.second() == 0 {
        at.format("%H:%M").to_string()
    } else {
        at.format("%H:%M:%S").to_string()
    }
}

fn optional(map: &BTreeMap<String, String>, key: &str) -> Option<String> {
    map.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required<'a>(map: &'a BTreeMap<String, String>, key: &'static str) -> Result<&'a str, MetadataError> {
    map.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or(MetadataError::Missing(key))
}

fn number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, MetadataError> {
    value.parse().map_err(|_| MetadataError::NotNumeric {
        field,
        value: value.to_string(),
    })
}

impl BookingMetadata {
    pub fn encode(&self) -> BTreeMap<String, String> {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        let mut map = BTreeMap::new();
        map.insert("carId".to_string(), self.car_id.to_string());
        map.insert("carName".to_string(), text(&self.car_name));
        if let Some(id) = self.insurance_id {
            map.insert("insuranceId".to_string(), id.to_string());
        }
        map.insert("insuranceTitle".to_string(), text(&self.insurance_title));
        map.insert("pickupLocation".to_string(), text(&self.pickup_location));
        map.insert("dropoffLocation".to_string(), text(&self.dropoff_location));
        map.insert("pickupDate".to_string(), self.pickup.format("%Y-%m-%d").to_string());
        map.insert("pickupTime".to_string(), format_time(&self.pickup));
        map.insert("dropoffDate".to_string(), self.dropoff.format("%Y-%m-%d").to_string());
        map.insert("dropoffTime".to_string(), format_time(&self.dropoff));
        map.insert("driverName".to_string(), text(&self.driver_name));
        map.insert("driverPhone".to_string(), text(&self.driver_phone));
        map.insert("driverEmail".to_string(), self.driver_email.clone());
        if let Some(total) = self.total_amount {
            map.insert("totalAmount".to_string(), format!("{total:.2}"));
        }
        map
    }

    /// Strict decode: any missing required key or unparsable value rejects the
    /// whole map. The payer email the provider collected takes precedence over
    /// `driverEmail`.
    pub fn decode(
        map: &BTreeMap<String, String>,
        provider_email: Option<&str>,
    ) -> Result<Self, MetadataError> {
        let car_id: i64 = number("carId", required(map, "carId")?)?;
        if car_id <= 0 {
            return Err(MetadataError::NotNumeric {
                field: "carId",
                value: car_id.to_string(),
            });
        }

        let (pickup, dropoff) = pricing::rental_interval(
            required(map, "pickupDate")?,
            required(map, "pickupTime")?,
            required(map, "dropoffDate")?,
            required(map, "dropoffTime")?,
        )?;

        let driver_email = provider_email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .or_else(|| optional(map, "driverEmail"))
            .ok_or(MetadataError::Missing("driverEmail"))?;
        if !driver_email.contains('@') {
            return Err(MetadataError::InvalidEmail(driver_email));
        }

        let insurance_id = optional(map, "insuranceId")
            .map(|v| number("insuranceId", &v))
            .transpose()?;
        let total_amount = optional(map, "totalAmount")
            .map(|v| number("totalAmount", &v))
            .transpose()?;

        Ok(Self {
            car_id,
            car_name: optional(map, "carName"),
            insurance_id,
            insurance_title: optional(map, "insuranceTitle"),
            pickup_location: optional(map, "pickupLocation"),
            dropoff_location: optional(map, "dropoffLocation"),
            pickup,
            dropoff,
            driver_name: optional(map, "driverName"),
            driver_phone: optional(map, "driverPhone"),
            driver_email,
            total_amount,
        })
    }
}

struct PricedCheckout {
    total_cents: i64,
    insurance_id: Option<i64>,
    insurance_title: Option<String>,
}

/// Re-checks availability and recomputes the total from current prices.
fn price_checkout(
    state: &AppState,
    car_id: i64,
    pickup: &NaiveDateTime,
    dropoff: &NaiveDateTime,
    insurance: Option<&InsuranceSummary>,
    driver_email: &str,
) -> Result<PricedCheckout, AppError> {
    let db = state.db();
    let vehicle = availability::ensure_bookable(&db, car_id, pickup, dropoff, driver_email)?;
    let table = queries::get_pricing_table(&db, &vehicle)?;
    let quote = pricing::price_range(&table, pickup, dropoff)?;

    let (insurance_id, insurance_title, insurance_daily_cents) = match insurance {
        None => (None, None, 0),
        Some(summary) => match summary.id {
            Some(id) => {
                let plan = queries::get_insurance_plan(&db, id)?
                    .filter(|plan| plan.active)
                    .ok_or_else(|| AppError::Validation(format!("unknown insurance plan {id}")))?;
                (Some(plan.id), Some(plan.title), plan.daily_price_cents)
            }
            None => (
                None,
                Some(summary.title.trim().to_string()),
                pricing::amount_to_cents(summary.daily_price),
            ),
        },
    };

    Ok(PricedCheckout {
        total_cents: quote.total_cents + insurance_daily_cents * quote.days,
        insurance_id,
        insurance_title,
    })
}

/// Opens a hosted checkout session for a booking and records it as pending.
pub async fn create_checkout(
    state: &AppState,
    request: CheckoutRequest,
) -> Result<CheckoutResponse, AppError> {
    request.validate()?;

    let car_id = request
        .car
        .id
        .as_i64()
        .ok_or_else(|| AppError::Validation("car id must be a positive integer".to_string()))?;
    let criteria = &request.criteria;
    let (pickup, dropoff) = pricing::rental_interval(
        &criteria.pickup_date,
        &criteria.pickup_time,
        &criteria.dropoff_date,
        &criteria.dropoff_time,
    )?;

    let driver_email = request.driver.email.trim();
    let priced = price_checkout(
        state,
        car_id,
        &pickup,
        &dropoff,
        request.insurance.as_ref(),
        driver_email,
    )?;
    let amount_cents = pricing::amount_to_cents(request.total_amount);
    if (amount_cents - priced.total_cents).abs() > MAX_TOTAL_DRIFT_CENTS {
        tracing::warn!(
            vehicle_id = car_id,
            requested = amount_cents,
            expected = priced.total_cents,
            "checkout total does not match quote"
        );
        return Err(AppError::Validation(format!(
            "totalAmount {:.2} does not match the current price {:.2}",
            request.total_amount,
            pricing::cents_to_amount(priced.total_cents)
        )));
    }

    let car_name = request.car.display_name();
    let driver = &request.driver;
    let metadata = BookingMetadata {
        car_id,
        car_name: Some(car_name.clone()),
        insurance_id: priced.insurance_id,
        insurance_title: priced.insurance_title.clone(),
        pickup_location: Some(criteria.pickup_location.trim().to_string()),
        dropoff_location: Some(criteria.dropoff_location.trim().to_string()),
        pickup,
        dropoff,
        driver_name: Some(driver.name.trim().to_string()),
        driver_phone: Some(driver.phone.trim().to_string()),
        driver_email: driver_email.to_string(),
        total_amount: Some(pricing::cents_to_amount(priced.total_cents)),
    };

    let config = &state.config;
    let session_request = CheckoutSessionRequest {
        amount_cents: priced.total_cents,
        currency: config.checkout_currency.clone(),
        product_name: format!("Car rental - {car_name}"),
        description: format!(
            "{} → {}",
            criteria.pickup_location.trim(),
            criteria.dropoff_location.trim()
        ),
        customer_email: metadata.driver_email.clone(),
        success_url: format!("{}/success?session_id={{CHECKOUT_SESSION_ID}}", config.base_url),
        cancel_url: format!("{}/checkout?canceled=1", config.base_url),
        expires_at: Utc::now().timestamp() + config.checkout_session_ttl_minutes * 60,
        metadata: metadata.encode(),
    };

    let session = state
        .payments
        .create_checkout_session(&session_request)
        .await
        .map_err(|e| AppError::Provider(e.to_string()))?;
    let url = session
        .url
        .clone()
        .ok_or_else(|| AppError::Provider("checkout session has no redirect url".to_string()))?;

    tracing::info!(
        session_id = %session.id,
        vehicle_id = car_id,
        amount_cents = priced.total_cents,
        "checkout session created"
    );

    if let Err(e) = store_pending(state, &session.id, &metadata, priced.total_cents) {
        tracing::error!(error = %e, session_id = %session.id, "failed to store pending reservation");
    }

    Ok(CheckoutResponse {
        url,
        session_id: session.id,
    })
}

fn store_pending(
    state: &AppState,
    session_token: &str,
    metadata: &BookingMetadata,
    total_cents: i64,
) -> anyhow::Result<()> {
    let db = state.db();
    let user = queries::upsert_user(
        &db,
        &metadata.driver_email,
        metadata.driver_name.as_deref(),
        metadata.driver_phone.as_deref(),
    )?;

    let now = Utc::now().naive_utc();
    let inserted = queries::insert_reservation(
        &db,
        &Reservation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id,
            vehicle_id: metadata.car_id,
            insurance_plan_id: metadata.insurance_id,
            start_at: metadata.pickup,
            end_at: metadata.dropoff,
            total_cost_cents: total_cents,
            session_token: session_token.to_string(),
            status: ReservationStatus::Pending,
            created_at: now,
            updated_at: now,
        },
    )?;
    if !inserted {
        tracing::warn!(session_id = %session_token, "reservation already exists for session");
    }

    // A retry after a cancelled checkout supersedes the driver's earlier hold.
    let released = queries::release_pending_holds(
        &db,
        &metadata.driver_email,
        metadata.car_id,
        &metadata.pickup,
        &metadata.dropoff,
        session_token,
    )?;
    if released > 0 {
        tracing::info!(
            session_id = %session_token,
            released,
            "released earlier pending holds for the same driver"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn metadata() -> BookingMetadata {
        BookingMetadata {
            car_id: 3,
            car_name: Some("Seat Ibiza".to_string()),
            insurance_id: Some(2),
            insurance_title: Some("Full cover".to_string()),
            pickup_location: Some("Airport".to_string()),
            dropoff_location: Some("Harbour".to_string()),
            pickup: dt("2025-06-01 10:00"),
            dropoff: dt("2025-06-03 14:30"),
            driver_name: Some("Ana".to_string()),
            driver_phone: Some("+3851234567".to_string()),
            driver_email: "ana@example.com".to_string(),
            total_amount: Some(150.0),
        }
    }

    #[test]
    fn test_encoded_keys_are_flat_strings() {
        let map = metadata().encode();
        assert_eq!(map["carId"], "3");
        assert_eq!(map["insuranceId"], "2");
        assert_eq!(map["pickupDate"], "2025-06-01");
        assert_eq!(map["pickupTime"], "10:00");
        assert_eq!(map["dropoffTime"], "14:30");
        assert_eq!(map["totalAmount"], "150.00");
        assert_eq!(BookingMetadata::decode(&map, None).unwrap(), metadata());
    }

    #[test]
    fn test_decode_rejects_missing_and_garbage() {
        let mut map = metadata().encode();
        map.remove("pickupDate");
        assert_eq!(
            BookingMetadata::decode(&map, None),
            Err(MetadataError::Missing("pickupDate"))
        );

        let mut map = metadata().encode();
        map.insert("carId".to_string(), "abc".to_string());
        assert!(matches!(
            BookingMetadata::decode(&map, None),
            Err(MetadataError::NotNumeric { field: "carId", .. })
        ));

        let mut map = metadata().encode();
        map.insert("insuranceId".to_string(), "gold".to_string());
        assert!(matches!(
            BookingMetadata::decode(&map, None),
            Err(MetadataError::NotNumeric { field: "insuranceId", .. })
        ));

        let mut map = metadata().encode();
        map.insert("dropoffDate".to_string(), "2025-05-01".to_string());
        assert_eq!(
            BookingMetadata::decode(&map, None),
            Err(MetadataError::Interval(IntervalError::DropoffNotAfterPickup))
        );
    }

    #[test]
    fn test_decode_email_precedence() {
        let map = metadata().encode();
        let decoded = BookingMetadata::decode(&map, Some("payer@example.com")).unwrap();
        assert_eq!(decoded.driver_email, "payer@example.com");
        let decoded = BookingMetadata::decode(&map, Some("  ")).unwrap();
        assert_eq!(decoded.driver_email, "ana@example.com");

        let mut map = metadata().encode();
        map.insert("driverEmail".to_string(), String::new());
        assert_eq!(
            BookingMetadata::decode(&map, None),
            Err(MetadataError::Missing("driverEmail"))
        );
        let decoded = BookingMetadata::decode(&map, Some("payer@example.com")).unwrap();
        assert_eq!(decoded.driver_email, "payer@example.com");

        map.insert("driverEmail".to_string(), "not-an-email".to_string());
        assert!(matches!(
            BookingMetadata::decode(&map, None),
            Err(MetadataError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_optional_fields_may_be_empty() {
        let mut map = metadata().encode();
        map.insert("insuranceTitle".to_string(), String::new());
        map.remove("insuranceId");
        map.remove("totalAmount");
        let decoded = BookingMetadata::decode(&map, None).unwrap();
        assert_eq!(decoded.insurance_title, None);
        assert_eq!(decoded.insurance_id, None);
        assert_eq!(decoded.total_amount, None);
    }

    #[test]
    fn test_car_id_and_display_name() {
        let car: CarSummary = serde_json::from_value(serde_json::json!({
            "id": "12", "make": "Seat", "model": " Ibiza ", "totalPrice": 100.0
        }))
        .unwrap();
        assert_eq!(car.id.as_i64(), Some(12));
        assert_eq!(car.display_name(), "Seat Ibiza");

        let car: CarSummary = serde_json::from_value(serde_json::json!({
            "id": 0, "name": "", "totalPrice": 100.0
        }))
        .unwrap();
        assert_eq!(car.id.as_i64(), None);
        assert_eq!(car.display_name(), FALLBACK_CAR_NAME);
    }
}
