use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Operator-set price for one exact date. Highest pricing priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarPrice {
    pub vehicle_id: i64,
    pub date: NaiveDate,
    pub price_cents: i64,
}

/// Operator-set price for an inclusive date range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialPrice {
    pub vehicle_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price_cents: i64,
}

impl SpecialPrice {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// Everything needed to price one vehicle: its base rate plus both override tiers.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    pub base_cents: i64,
    pub calendar: Vec<CalendarPrice>,
    pub special: Vec<SpecialPrice>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Calendar,
    Special,
    Base,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Calendar => "calendar",
            PriceSource::Special => "special",
            PriceSource::Base => "base",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayPrice {
    pub date: NaiveDate,
    pub price_cents: i64,
    pub source: PriceSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub days: i64,
    pub total_cents: i64,
    pub breakdown: Vec<DayPrice>,
}
