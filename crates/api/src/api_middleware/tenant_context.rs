//! Tenant context middleware
//!
//! Establishes the tenant a request belongs to from a verified gateway
//! bearer token. Unlike the old subdomain/header-sniffing approach, the
//! tenant id is never trusted from client-supplied headers: it comes only
//! from the `org_id` claim of a token that passed `JwtService::verify_gateway_token`.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shadowai_core::{TenantContext, TenantId};
use tracing::{error, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Verifies the `Authorization: Bearer` token and, when present and valid,
/// inserts a [`TenantContext`] into the request extensions. Requests
/// without a token or with an invalid one proceed without tenant context;
/// handlers that require one should sit behind [`require_tenant_context`].
pub async fn tenant_context_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) => match state.jwt.verify_gateway_token(token) {
            Ok(claims) => match Uuid::parse_str(&claims.org_id) {
                Ok(tenant_id) => {
                    req.extensions_mut()
                        .insert(TenantContext::new(TenantId(tenant_id)));
                    next.run(req).await
                }
                Err(_) => {
                    warn!(org_id = %claims.org_id, "gateway token carried a non-uuid org_id claim");
                    next.run(req).await
                }
            },
            Err(e) => {
                warn!(error = %e, "rejected invalid bearer token");
                next.run(req).await
            }
        },
        None => next.run(req).await,
    }
}

/// Middleware that rejects requests lacking a tenant context with 401.
pub async fn require_tenant_context(req: Request, next: Next) -> Response {
    if req.extensions().get::<TenantContext>().is_none() {
        error!("request missing required tenant context");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "missing tenant context",
                "message": "This endpoint requires a valid bearer token."
            })),
        )
            .into_response();
    }

    next.run(req).await
}

/// Extract the tenant context a prior middleware stage inserted.
pub fn extract_tenant_context(req: &Request) -> Option<TenantContext> {
    req.extensions().get::<TenantContext>().cloned()
}
