//! Platform connection handlers
//!
//! CRUD over a tenant's `PlatformConnection` rows plus the credential
//! lifecycle (store on create, revoke on delete, health on demand).

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, Router},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use shadowai_connectors::types::{ConnectionId, ConnectionStatus, Platform, PlatformConnection};
use shadowai_core::TenantContext;
use shadowai_credentials::OAuthCredentials;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_connections).post(create_connection))
        .route("/:id", get(get_connection).delete(revoke_connection))
        .route("/:id/health", get(connection_health))
}

#[derive(Debug, Deserialize)]
pub struct CreateConnectionRequest {
    pub platform: Platform,
    pub platform_user_id: String,
    pub platform_workspace_id: Option<String>,
    pub display_name: String,
    pub scopes_granted: Vec<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

async fn list_connections(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Value>, ApiError> {
    let connections = state.connections.list_active_by_tenant(tenant.tenant_id).await?;
    Ok(Json(json!({ "connections": connections })))
}

async fn create_connection(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<CreateConnectionRequest>,
) -> Result<Json<Value>, ApiError> {
    let connection = PlatformConnection {
        connection_id: ConnectionId::new(),
        tenant_id: tenant.tenant_id.0,
        platform: body.platform,
        platform_user_id: body.platform_user_id,
        platform_workspace_id: body.platform_workspace_id,
        display_name: body.display_name,
        status: ConnectionStatus::Active,
        scopes_granted: body.scopes_granted,
        expires_at: body.expires_at,
        metadata: Default::default(),
        last_error: None,
    };

    state.connections.upsert(&connection).await?;

    state
        .credentials
        .store(
            connection.connection_id,
            connection.platform,
            OAuthCredentials {
                access_token: body.access_token,
                refresh_token: body.refresh_token,
                expires_at: body.expires_at,
            },
        )
        .await?;

    Ok(Json(json!({ "connection": connection })))
}

async fn get_connection(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Value>, ApiError> {
    match state.connections.get(ConnectionId(id)).await? {
        Some(connection) => Ok(Json(json!({ "connection": connection }))),
        None => Err(shadowai_core::Error::not_found("connection not found").into()),
    }
}

async fn revoke_connection(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let connection_id = ConnectionId(id);
    state.credentials.revoke(connection_id).await?;
    state.connections.delete(connection_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn connection_health(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Value>, ApiError> {
    let health = state.credentials.validate(ConnectionId(id)).await?;
    Ok(Json(json!({ "health": health })))
}
