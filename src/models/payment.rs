use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const METHOD_CARD: &str = "card";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub reservation_id: String,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    pub method: String,
    pub transaction_ref: Option<String>,
    pub paid_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "paid" => PaymentStatus::Paid,
            _ => PaymentStatus::Failed,
        }
    }
}
