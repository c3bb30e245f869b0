use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::errors::AppError;
use crate::models::{SearchCriteria, SearchResult};
use crate::services::search;
use crate::state::AppState;

// POST /cars/search
pub async fn search(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchCriteria>, JsonRejection>,
) -> Result<Json<Vec<SearchResult>>, AppError> {
    let Json(criteria) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let results = {
        let db = state.db();
        search::search(&db, &criteria)?
    };

    tracing::info!(results = results.len(), "car search");
    Ok(Json(results))
}
