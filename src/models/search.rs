use serde::{Deserialize, Serialize};

/// Raw search request body. Every field is optional at the serde level so
/// that a missing field surfaces as a validation error, not a rejected body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    pub pickup_date: Option<String>,
    pub dropoff_date: Option<String>,
    pub pickup_time: Option<String>,
    pub dropoff_time: Option<String>,
    pub pickup_location: Option<String>,
    pub dropoff_location: Option<String>,
    pub seats: Option<i64>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchFilters {
    /// Minimum number of seats.
    pub seats: Option<i64>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownItem {
    pub date: String,
    pub price: f64,
    pub source: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: i64,
    pub make: String,
    pub model: String,
    pub category: Option<String>,
    pub seats: i64,
    pub fuel_type: String,
    pub transmission: String,
    pub image: String,
    pub price_per_day: f64,
    pub total_price: f64,
    pub days: i64,
    pub discount: f64,
    pub breakdown: Vec<BreakdownItem>,
}
