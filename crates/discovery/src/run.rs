//! `DiscoveryRun` lifecycle: the audit
//! trail of one `discoverConnection` invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shadowai_connectors::types::ConnectionId;
use shadowai_core::types::TenantId;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRun {
    pub run_id: Uuid,
    pub tenant_id: TenantId,
    pub connection_id: ConnectionId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub automations_found: u32,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl DiscoveryRun {
    pub fn start(tenant_id: TenantId, connection_id: ConnectionId) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            tenant_id,
            connection_id,
            status: RunStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            automations_found: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Closes the run with `status=completed|failed` depending on whether
    /// an authentication failure occurred;
    /// non-fatal per-call errors accumulated in `errors` do not by
    /// themselves fail the run.
    pub fn close(&mut self, failed: bool) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
        self.status = if failed { RunStatus::Failed } else { RunStatus::Completed };
    }
}
