use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Velocity,
    BatchOperation,
    OffHours,
    RegularInterval,
    PermissionChange,
    ApiUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Confidence -> severity map, shared by every detector.
/// Total and monotone: higher confidence never maps to a lower severity.
pub fn confidence_to_severity(confidence: f64) -> Severity {
    if confidence >= 90.0 {
        Severity::Critical
    } else if confidence >= 60.0 {
        Severity::High
    } else if confidence >= 30.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMetadata {
    pub actor: String,
    pub resource_type: Option<String>,
    pub action_type: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub description: String,
    pub data_points: HashMap<String, serde_json::Value>,
    pub supporting_events: Vec<String>,
}

/// One typed, evidence-bearing observation produced by a detector
///.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPattern {
    pub pattern_id: Uuid,
    pub pattern_type: PatternType,
    pub detected_at: DateTime<Utc>,
    pub confidence: f64,
    pub metadata: PatternMetadata,
    pub evidence: Evidence,
}

impl ActivityPattern {
    pub fn severity(&self) -> Severity {
        confidence_to_severity(self.confidence)
    }
}

/// The canonical AI-provider signal attached to `DetectionMetadata`
///.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiProviderDetection {
    pub provider: String,
    pub confidence: f64,
    pub detection_methods: Vec<String>,
    pub evidence: String,
    pub model: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// One pattern as folded into `DetectionMetadata` by the Detection Engine
///.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionPattern {
    pub pattern_type: String,
    pub confidence: f64,
    pub severity: Severity,
    pub evidence: Evidence,
    pub detected_at: DateTime<Utc>,
    pub metadata: PatternMetadata,
}

/// Folded output persisted onto a `DiscoveredAutomation` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionMetadata {
    pub ai_provider: Option<AiProviderDetection>,
    pub detection_patterns: Vec<DetectionPattern>,
    pub last_updated: DateTime<Utc>,
}

impl DetectionMetadata {
    pub fn empty() -> Self {
        Self {
            ai_provider: None,
            detection_patterns: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

/// Maps a detector's raw `PatternType` to the `DetectionPattern.pattern_type`
/// tag the Detection Engine emits.
pub fn detection_pattern_type_for(pattern_type: PatternType) -> &'static str {
    match pattern_type {
        PatternType::Velocity => "velocity",
        PatternType::BatchOperation => "batch_operation",
        PatternType::OffHours => "off_hours",
        PatternType::RegularInterval => "timing_variance",
        PatternType::PermissionChange => "permission_escalation",
        PatternType::ApiUsage => "ai_provider",
    }
}

/// Business-hours configuration consumed by the off-hours detector.
#[derive(Debug, Clone)]
pub struct BusinessHours {
    /// Hour (0-23, UTC-normalized by the caller) the business day starts.
    pub start_hour: u32,
    /// Hour (0-23) the business day ends.
    pub end_hour: u32,
    /// Weekdays (0 = Sunday .. 6 = Saturday) considered business days.
    pub business_weekdays: Vec<u32>,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            business_weekdays: vec![1, 2, 3, 4, 5],
        }
    }
}

impl BusinessHours {
    pub fn is_off_hours(&self, timestamp: DateTime<Utc>) -> bool {
        use chrono::Datelike;
        use chrono::Timelike;
        let weekday = timestamp.weekday().num_days_from_sunday();
        if !self.business_weekdays.contains(&weekday) {
            return true;
        }
        let hour = timestamp.hour();
        hour < self.start_hour || hour >= self.end_hour
    }
}

/// Per-detector thresholds, adjustable per tenant by the
/// RL Threshold Service (`shadowai-learning`).
#[derive(Debug, Clone)]
pub struct DetectorThresholds {
    /// Velocity detector: events/sec that triggers a flag.
    pub velocity_events_per_second: f64,
    /// Batch detector: K identical actions within `batch_window_secs`.
    pub batch_min_actions: u32,
    pub batch_window_secs: i64,
    /// Off-hours detector: minimum off-hours events before flagging an actor.
    pub off_hours_min_events: u32,
    /// Timing-variance detector: coefficient-of-variation ceiling.
    pub timing_variance_cov_threshold: f64,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            velocity_events_per_second: 5.0,
            batch_min_actions: 5,
            batch_window_secs: 60,
            off_hours_min_events: 3,
            timing_variance_cov_threshold: 0.15,
        }
    }
}
