//! Cross-platform correlation handlers

use axum::{
    extract::{Extension, State},
    response::Json,
    routing::{get, post, Router},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use shadowai_connectors::TimeRange;
use shadowai_core::TenantContext;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/latest", get(latest))
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

async fn analyze(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    body: Option<Json<AnalyzeRequest>>,
) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let time_range = match (body.since, body.until) {
        (Some(since), Some(until)) => Some(TimeRange { since, until }),
        _ => None,
    };

    let result = state.correlation.execute_correlation_analysis(tenant.tenant_id, time_range).await?;
    Ok(Json(json!({ "result": result })))
}

async fn latest(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, ApiError> {
    match state.correlation.last_result(tenant.tenant_id) {
        Some(result) => Ok(Json(json!({ "result": result }))),
        None => Ok(Json(json!({ "result": null }))),
    }
}
