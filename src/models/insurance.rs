use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsurancePlan {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub daily_price_cents: i64,
    pub excess_amount_cents: Option<i64>,
    pub currency: String,
    pub includes_wind_screen: bool,
    pub includes_theft_cover: bool,
    pub roadside_assistance: bool,
    pub active: bool,
}
