use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::InsurancePlan;
use crate::services::pricing::cents_to_amount;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsurancePlanView {
    id: i64,
    title: String,
    slug: String,
    description: String,
    daily_price: f64,
    excess_amount: Option<f64>,
    currency: String,
    includes_wind_screen: bool,
    includes_theft_cover: bool,
    roadside_assistance: bool,
}

impl From<InsurancePlan> for InsurancePlanView {
    fn from(plan: InsurancePlan) -> Self {
        Self {
            id: plan.id,
            title: plan.title,
            slug: plan.slug,
            description: plan.description,
            daily_price: cents_to_amount(plan.daily_price_cents),
            excess_amount: plan.excess_amount_cents.map(cents_to_amount),
            currency: plan.currency,
            includes_wind_screen: plan.includes_wind_screen,
            includes_theft_cover: plan.includes_theft_cover,
            roadside_assistance: plan.roadside_assistance,
        }
    }
}

// GET /insurance/plans
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<InsurancePlanView>>, AppError> {
    let plans = {
        let db = state.db();
        queries::list_active_insurance_plans(&db)?
    };
    Ok(Json(plans.into_iter().map(InsurancePlanView::from).collect()))
}
