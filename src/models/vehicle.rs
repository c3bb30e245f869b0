use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub make: String,
    pub model: String,
    pub seats: i64,
    pub fuel_type: String,
    pub transmission: String,
    pub category_id: Option<i64>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub daily_price_cents: i64,
    pub available: bool,
    pub status: VehicleStatus,
}

impl Vehicle {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.make, self.model).trim().to_string()
    }
}

/// Operational status managed by the fleet team. Only `AVAILABLE` vehicles
/// are offered to customers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VehicleStatus {
    Available,
    Other(String),
}

impl VehicleStatus {
    pub fn as_str(&self) -> &str {
        match self {
            VehicleStatus::Available => "AVAILABLE",
            VehicleStatus::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "AVAILABLE" => VehicleStatus::Available,
            other => VehicleStatus::Other(other.to_string()),
        }
    }
}
