//! Quota-enforcement middleware
//!
//! Layered globally after tenant-context extraction. Rejects a
//! connector-bound request with 429 when the targeted connection's
//! per-platform daily call budget (C11) is exhausted. Connector-bound
//! routes are recognized by path shape (`/api/v1/connections/<uuid>/...`)
//! rather than via a `Path` extractor, since this middleware wraps the
//! whole router and runs before route matching resolves path params.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shadowai_connectors::types::ConnectionId;
use uuid::Uuid;

use crate::state::AppState;

fn connection_id_from_path(path: &str) -> Option<ConnectionId> {
    let mut segments = path.trim_start_matches('/').split('/');
    loop {
        match segments.next() {
            Some("connections") => {
                let id = segments.next()?;
                return Uuid::parse_str(id).ok().map(ConnectionId);
            }
            Some(_) => continue,
            None => return None,
        }
    }
}

pub async fn quota_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(connection_id) = connection_id_from_path(req.uri().path()) else {
        return next.run(req).await;
    };

    let platform = match state.connections.get(connection_id).await {
        Ok(Some(connection)) => connection.platform,
        _ => return next.run(req).await,
    };

    let status = state.quota.get(platform, connection_id).await;
    if status.remaining == 0 {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "quota exceeded",
                "message": format!("{} API quota exhausted for today ({}/{})", platform, status.used, status.limit),
            })),
        )
            .into_response();
    }

    next.run(req).await
}
