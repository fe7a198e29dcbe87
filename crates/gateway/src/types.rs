//! Connected-client state for the realtime gateway.

use serde::{Deserialize, Serialize};
use shadowai_core::types::TenantId;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// `userRole` from the `authenticate` handshake payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Ciso,
    Executive,
    Analyst,
    SecurityAnalyst,
    Admin,
    #[serde(other)]
    Other,
}

/// One channel of the gateway's event vocabulary a client may be
/// subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionFlag {
    AnalysisProgress,
    ChainDetection,
    RiskAlerts,
    ExecutiveUpdates,
    PerformanceMetrics,
}

/// Computed once at connect time from `userRole` and stored alongside the
/// socket handle.
#[derive(Debug, Clone)]
pub struct SubscriptionPreference {
    pub flags: HashSet<SubscriptionFlag>,
    /// Optional per-subscriber risk-score alert floor
    /// (`SubscriptionPreference.AlertThresholds.riskScore`); `None` means
    /// the client relies on the engine-side tenant default.
    pub risk_score_threshold: Option<f64>,
}

/// Default subscription set for a role.
pub fn default_subscriptions(role: UserRole) -> SubscriptionPreference {
    use SubscriptionFlag::*;
    let flags = match role {
        UserRole::Ciso | UserRole::Executive => HashSet::from([ChainDetection, RiskAlerts, ExecutiveUpdates]),
        UserRole::Analyst | UserRole::SecurityAnalyst => {
            HashSet::from([AnalysisProgress, ChainDetection, RiskAlerts, PerformanceMetrics])
        }
        UserRole::Admin => HashSet::from([AnalysisProgress, ChainDetection, RiskAlerts, ExecutiveUpdates, PerformanceMetrics]),
        UserRole::Other => HashSet::from([AnalysisProgress, ChainDetection]),
    };
    SubscriptionPreference { flags, risk_score_threshold: None }
}

/// One connected, authenticated dashboard socket.
pub struct ConnectedClient {
    pub session_id: SessionId,
    pub user_id: String,
    pub tenant_id: TenantId,
    pub subscriptions: SubscriptionPreference,
    pub sender: tokio::sync::mpsc::Sender<axum::extract::ws::Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ciso_gets_executive_subscriptions() {
        let prefs = default_subscriptions(UserRole::Ciso);
        assert!(prefs.flags.contains(&SubscriptionFlag::ExecutiveUpdates));
        assert!(!prefs.flags.contains(&SubscriptionFlag::AnalysisProgress));
    }

    #[test]
    fn admin_gets_every_flag() {
        let prefs = default_subscriptions(UserRole::Admin);
        assert_eq!(prefs.flags.len(), 5);
    }

    #[test]
    fn unrecognized_role_gets_minimal_default() {
        let prefs = default_subscriptions(UserRole::Other);
        assert_eq!(prefs.flags.len(), 2);
    }
}
