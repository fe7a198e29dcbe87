//! HTTP handlers for the discovery API, nested under `/api/v1`.

pub mod connections;
pub mod correlation;
pub mod discovery;
pub mod feedback;

use axum::Router;

use crate::api_middleware::tenant_context::require_tenant_context;
use crate::state::AppState;

/// Every authenticated route. All of these require a verified tenant
/// context, so the whole tree sits behind `require_tenant_context`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/connections", connections::routes())
        .nest("/discovery", discovery::routes())
        .nest("/correlation", correlation::routes())
        .nest("/feedback", feedback::routes())
        .layer(axum::middleware::from_fn(require_tenant_context))
}
