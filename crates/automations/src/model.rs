use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shadowai_connectors::types::{AutomationType, ConnectionId, RawAutomation};
use shadowai_core::types::TenantId;
use shadowai_detection::DetectionMetadata;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AutomationId(pub Uuid);

impl AutomationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AutomationId {
    fn default() -> Self {
        Self::new()
    }
}

/// Created/modified/triggered/first-seen/last-seen timestamps. `first_seen` is monotone non-increasing and `last_seen` monotone
/// non-decreasing across re-discovery runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationTimestamps {
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub last_triggered: Option<DateTime<Utc>>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// One entry in an automation's append-only risk-score history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScoreHistoryEntry {
    pub ts: DateTime<Utc>,
    pub score: f64,
    pub level: RiskLevel,
    pub factors: Vec<String>,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Maps a 0-100 score to a level per the documented thresholds
/// (>=85 critical, >=70 high, >=40 medium, else low).
pub fn risk_level_for(score: f64) -> RiskLevel {
    if score >= 85.0 {
        RiskLevel::Critical
    } else if score >= 70.0 {
        RiskLevel::High
    } else if score >= 40.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// The shared entity discovered by connectors and read by the
/// Detection Engine, Risk Assessor, Discovery Orchestrator and
/// Correlation Engine. Upsert key is
/// `(connection_id, external_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredAutomation {
    pub automation_id: AutomationId,
    pub connection_id: ConnectionId,
    pub tenant_id: TenantId,
    pub external_id: String,
    pub name: String,
    pub automation_type: AutomationType,
    pub status: String,
    pub trigger: Option<String>,
    pub actions: Vec<String>,
    pub permissions_required: Vec<String>,
    pub owner_info: HashMap<String, serde_json::Value>,
    pub timestamps: AutomationTimestamps,
    pub metadata: HashMap<String, serde_json::Value>,
    pub is_active: bool,
    pub detection_metadata: DetectionMetadata,
    pub risk_score_history: Vec<RiskScoreHistoryEntry>,
}

impl DiscoveredAutomation {
    /// Builds a brand-new row from a connector's raw report, seen for the
    /// first time.
    pub fn from_raw(
        tenant_id: TenantId,
        connection_id: ConnectionId,
        raw: RawAutomation,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            automation_id: AutomationId::new(),
            connection_id,
            tenant_id,
            external_id: raw.external_id,
            name: raw.name,
            automation_type: raw.automation_type,
            status: raw.status,
            trigger: raw.trigger,
            actions: raw.actions,
            permissions_required: raw.permissions_required,
            owner_info: raw.owner_info,
            timestamps: AutomationTimestamps {
                created: raw.created_at.unwrap_or(now),
                last_modified: raw.last_modified.unwrap_or(now),
                last_triggered: raw.last_triggered,
                first_seen: now,
                last_seen: now,
            },
            metadata: raw.metadata,
            is_active: true,
            detection_metadata: DetectionMetadata::empty(),
            risk_score_history: Vec::new(),
        }
    }

    /// Re-discovery refresh: only `Name/Status/Metadata/lastSeen` change
    ///;
    /// `first_seen` never moves forward and `last_seen` never moves back.
    pub fn refresh_from_raw(&mut self, raw: RawAutomation, now: DateTime<Utc>) {
        self.name = raw.name;
        self.status = raw.status;
        self.metadata = raw.metadata;
        self.is_active = true;
        if raw.last_triggered.is_some() {
            self.timestamps.last_triggered = raw.last_triggered;
        }
        self.timestamps.first_seen = self.timestamps.first_seen.min(now);
        self.timestamps.last_seen = self.timestamps.last_seen.max(now);
    }

    pub fn mark_inactive(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.timestamps.last_modified = now;
    }

    pub fn append_risk_history(&mut self, entry: RiskScoreHistoryEntry) {
        self.risk_score_history.push(entry);
    }
}

/// Output of the Risk Assessor, kept alongside
/// `DiscoveredAutomation` rather than embedded in it so assessments can
/// be queried/paginated independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub automation_id: AutomationId,
    pub tenant_id: TenantId,
    pub level: RiskLevel,
    pub score: f64,
    pub components: RiskComponents,
    pub risk_factors: Vec<String>,
    pub compliance_issues: Vec<String>,
    pub security_concerns: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence_level: f64,
    pub assessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskComponents {
    pub permission: f64,
    pub data_access: f64,
    pub activity: f64,
    pub ownership: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str) -> RawAutomation {
        RawAutomation {
            external_id: "ext-1".to_string(),
            name: name.to_string(),
            automation_type: AutomationType::Integration,
            status: "active".to_string(),
            trigger: Some("oauth".to_string()),
            actions: Vec::new(),
            permissions_required: vec!["drive.readonly".to_string()],
            owner_info: HashMap::new(),
            created_at: None,
            last_modified: None,
            last_triggered: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn refresh_advances_last_seen_and_preserves_first_seen() {
        let t0 = Utc::now();
        let mut automation =
            DiscoveredAutomation::from_raw(TenantId(Uuid::new_v4()), ConnectionId::new(), raw("ChatGPT"), t0);
        let first_seen = automation.timestamps.first_seen;

        let t1 = t0 + chrono::Duration::hours(1);
        automation.refresh_from_raw(raw("ChatGPT for Google"), t1);

        assert_eq!(automation.timestamps.first_seen, first_seen);
        assert_eq!(automation.timestamps.last_seen, t1);
        assert_eq!(automation.name, "ChatGPT for Google");
        assert!(automation.is_active);
    }

    #[test]
    fn risk_level_thresholds_match_spec_boundaries() {
        assert_eq!(risk_level_for(84.9), RiskLevel::Medium);
        assert_eq!(risk_level_for(85.0), RiskLevel::Critical);
        assert_eq!(risk_level_for(70.0), RiskLevel::High);
        assert_eq!(risk_level_for(39.9), RiskLevel::Low);
        assert_eq!(risk_level_for(40.0), RiskLevel::Medium);
    }
}
