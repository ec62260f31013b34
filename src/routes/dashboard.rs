use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{
    error::AppResult, middleware::auth::Actor, policy::CommitteeScope,
    services::dashboard::DashboardService, AppState,
};

pub async fn statistics(State(state): State<AppState>, Actor(actor): Actor) -> AppResult<Json<Value>> {
    let counts = DashboardService::counts(&state.db, CommitteeScope::of(&actor).committee_id()).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Statistics retrieved successfully",
        "data": counts.labelled(),
    })))
}
