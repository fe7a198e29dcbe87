//! Discovery and discovered-automation handlers

use axum::{
    extract::{Extension, State},
    response::Json,
    routing::{get, post, Router},
};
use serde_json::{json, Value};
use shadowai_core::TenantContext;
use shadowai_discovery::DiscoveryConfig;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/automations", get(list_automations))
        .route("/run", post(run_discovery))
}

async fn list_automations(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, ApiError> {
    let automations = state.automations.list_by_tenant(tenant.tenant_id).await?;
    Ok(Json(json!({ "automations": automations })))
}

async fn run_discovery(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, ApiError> {
    let config = DiscoveryConfig {
        fan_out_concurrency: state.config.discovery.fan_out_concurrency,
    };
    let summary = state.discovery.run_discovery_for_tenant(tenant.tenant_id, &config).await?;
    Ok(Json(json!({
        "summary": {
            "connections_attempted": summary.connections_attempted,
            "connections_succeeded": summary.connections_succeeded,
            "connections_failed": summary.connections_failed,
            "automations_found": summary.automations_found,
        }
    })))
}
