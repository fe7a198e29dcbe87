//! Analyst feedback handlers: label detector output, read back precision/recall.

use axum::{
    extract::{Extension, Query, State},
    response::Json,
    routing::{get, post, Router},
};
use serde::Deserialize;
use serde_json::{json, Value};
use shadowai_core::TenantContext;
use shadowai_learning::{DetectionFeedback, FeedbackLabel};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_feedback))
        .route("/metrics", get(feedback_metrics))
}

#[derive(Debug, Deserialize)]
pub struct SubmitFeedbackRequest {
    pub detector: String,
    pub label: FeedbackLabel,
    pub automation_id: Option<Uuid>,
    pub notes: Option<String>,
}

async fn submit_feedback(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<SubmitFeedbackRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut feedback = DetectionFeedback::new(tenant.tenant_id, body.detector, body.label);
    if let Some(automation_id) = body.automation_id {
        feedback = feedback.with_automation(automation_id);
    }
    if let Some(notes) = body.notes {
        feedback.notes = Some(notes);
    }

    state.feedback.submit(feedback).await?;
    Ok(Json(json!({ "status": "recorded" })))
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub detector: String,
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

fn default_window_days() -> u32 {
    30
}

async fn feedback_metrics(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<Value>, ApiError> {
    let (metrics, sample_size) = state
        .feedback
        .metrics_for_window(tenant.tenant_id, &query.detector, query.window_days)
        .await?;

    Ok(Json(json!({
        "true_positives": metrics.true_positives,
        "false_positives": metrics.false_positives,
        "false_negatives": metrics.false_negatives,
        "precision": metrics.precision(),
        "recall": metrics.recall(),
        "sample_size": sample_size,
    })))
}
