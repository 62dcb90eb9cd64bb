//! Dashboard statistics endpoint.

use axum::{extract::State, Json};
use tutora_core::{Dashboard, SchoolStore, StatsService};

use crate::{error::ApiError, state::AppState};

/// GET /api/stats/dashboard
///
/// Loads the current state and recomputes the aggregates with the shared
/// statistics engine; nothing here is cached.
pub async fn dashboard(State(state): State<AppState>) -> Result<Json<Dashboard>, ApiError> {
    let school = state.store.load_school()?;
    Ok(Json(StatsService::dashboard(&school, state.clock.today())))
}
