use crate::types::{AuditEntry, PermissionValidation, Platform, PlatformEvent, RawAutomation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use shadowai_core::error::Result;

/// A time window, inclusive start / exclusive end.
#[derive(Debug, Clone, Copy)]
pub struct TimeRange {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

/// Uniform capability over a SaaS platform. Every method
/// may fail with `Error::unauthorized` (AuthError), `Error::rate_limited`,
/// or `Error::transient` — callers (the Discovery Orchestrator) branch on
/// `ErrorCode::category()` rather than downcasting.
///
/// A connector is constructed once per `(platform, connection)` pair by
/// the `ConnectorRegistry` and is otherwise stateless between calls; any
/// credentials it needs are passed in via `authenticate`, not held across
/// calls by reference to the Credential Store.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    fn platform(&self) -> Platform;

    /// Declared per-minute call budget; used by the orchestrator and the
    /// quota layer (C11) to reason about this connector generically.
    fn rate_limit_per_minute(&self) -> u32;

    async fn authenticate(&self, access_token: &str) -> Result<()>;

    async fn discover_automations(&self) -> Result<Vec<RawAutomation>>;

    async fn get_audit_logs(&self, since: DateTime<Utc>) -> Result<Vec<AuditEntry>>;

    async fn validate_permissions(&self) -> Result<PermissionValidation>;

    async fn get_correlation_events(&self, range: TimeRange) -> Result<Vec<PlatformEvent>>;

    /// A lazy, restartable, cancellable sequence of events. The contract
    /// only requires eventual delivery; poll interval is an
    /// implementation detail.
    fn subscribe_real_time(&self) -> BoxStream<'static, PlatformEvent>;

    async fn is_connected(&self) -> bool;
}

/// Sleeps between per-resource iterations inside a connector's discovery
/// loop. Spec.md §4.1 caps this at 200ms; connectors should call this
/// rather than hand-rolling `tokio::time::sleep` so the cap stays in one
/// place.
pub async fn rate_limit_pause() {
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
}
