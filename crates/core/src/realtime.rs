//! Shared vocabulary for the realtime events the correlation engine emits
//! and the realtime gateway schema-validates and broadcasts.
//!
//! Defined here, rather than in `shadowai-gateway`, so `shadowai-correlation`
//! can depend on the event vocabulary without depending on the gateway
//! itself: the engine emits onto channels, the orchestrator and gateway
//! subscribe, and no component holds a back-reference to its consumers.
//! Heavier payloads (a correlation result, a workflow chain) travel as
//! `serde_json::Value` rather than a concrete type, since the gateway's
//! contract is schema validation on the wire, not a shared Rust type
//! between crates.

use crate::types::TenantId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service: String,
    pub status: HealthStatus,
}

/// Every event the gateway broadcasts,
/// tagged by wire `type` so the gateway can schema-validate before
/// fan-out. `organization_id` is `None` only for the untenanted
/// `system:*` streams; every tenant-scoped variant carries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    #[serde(rename = "correlation:started")]
    CorrelationStarted { organization_id: TenantId, analysis_id: Uuid, timestamp: DateTime<Utc> },
    #[serde(rename = "correlation:progress")]
    CorrelationProgress {
        organization_id: TenantId,
        analysis_id: Uuid,
        stage: String,
        percent: u8,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "correlation:completed")]
    CorrelationCompleted {
        organization_id: TenantId,
        result: Value,
        processing_time_ms: u64,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "correlation:error")]
    CorrelationError { organization_id: TenantId, analysis_id: Uuid, reason: String, timestamp: DateTime<Utc> },
    #[serde(rename = "chain:detected")]
    ChainDetected { organization_id: TenantId, chain: Value, timestamp: DateTime<Utc> },
    #[serde(rename = "chain:high_risk_alert")]
    ChainHighRiskAlert { organization_id: TenantId, chain: Value, alert_level: AlertLevel, timestamp: DateTime<Utc> },
    #[serde(rename = "risk:assessment_update")]
    RiskAssessmentUpdate { organization_id: TenantId, assessment: Value, timestamp: DateTime<Utc> },
    #[serde(rename = "risk:threshold_exceeded")]
    RiskThresholdExceeded {
        organization_id: TenantId,
        metric: String,
        value: f64,
        threshold: f64,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "executive:report_ready")]
    ExecutiveReportReady { organization_id: TenantId, summary: Value, timestamp: DateTime<Utc> },
    #[serde(rename = "system:performance_update")]
    SystemPerformanceUpdate { latency: f64, accuracy: f64, throughput: f64, timestamp: DateTime<Utc> },
    #[serde(rename = "system:health_check")]
    SystemHealthCheck { services: Vec<ServiceHealth>, overall: HealthStatus, timestamp: DateTime<Utc> },
    #[serde(rename = "system:notification")]
    SystemNotification { level: NotificationLevel, message: String, timestamp: DateTime<Utc> },
}

impl GatewayEvent {
    /// The wire `type` tag, e.g. `"correlation:completed"`.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::CorrelationStarted { .. } => "correlation:started",
            Self::CorrelationProgress { .. } => "correlation:progress",
            Self::CorrelationCompleted { .. } => "correlation:completed",
            Self::CorrelationError { .. } => "correlation:error",
            Self::ChainDetected { .. } => "chain:detected",
            Self::ChainHighRiskAlert { .. } => "chain:high_risk_alert",
            Self::RiskAssessmentUpdate { .. } => "risk:assessment_update",
            Self::RiskThresholdExceeded { .. } => "risk:threshold_exceeded",
            Self::ExecutiveReportReady { .. } => "executive:report_ready",
            Self::SystemPerformanceUpdate { .. } => "system:performance_update",
            Self::SystemHealthCheck { .. } => "system:health_check",
            Self::SystemNotification { .. } => "system:notification",
        }
    }

    /// `None` only for the untenanted `system:*` streams.
    pub fn organization_id(&self) -> Option<TenantId> {
        match self {
            Self::CorrelationStarted { organization_id, .. }
            | Self::CorrelationProgress { organization_id, .. }
            | Self::CorrelationCompleted { organization_id, .. }
            | Self::CorrelationError { organization_id, .. }
            | Self::ChainDetected { organization_id, .. }
            | Self::ChainHighRiskAlert { organization_id, .. }
            | Self::RiskAssessmentUpdate { organization_id, .. }
            | Self::RiskThresholdExceeded { organization_id, .. }
            | Self::ExecutiveReportReady { organization_id, .. } => Some(*organization_id),
            Self::SystemPerformanceUpdate { .. }
            | Self::SystemHealthCheck { .. }
            | Self::SystemNotification { .. } => None,
        }
    }
}

/// Sink a long-running component publishes `GatewayEvent`s onto, without
/// holding a reference back to its consumer. Delivery is best-effort: a
/// full subscriber buffer MAY drop a message rather than block the
/// publisher.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: GatewayEvent);
}

/// Discards every event. Used by components run without a gateway wired
/// up (unit tests, or a correlation pass invoked before the gateway task
/// has started).
#[derive(Debug, Default)]
pub struct NullEventPublisher;

#[async_trait]
impl EventPublisher for NullEventPublisher {
    async fn publish(&self, _event: GatewayEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_name_matches_wire_tag() {
        let event = GatewayEvent::SystemNotification {
            level: NotificationLevel::Error,
            message: "bad payload".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_name(), "system:notification");
        assert_eq!(event.organization_id(), None);
    }

    #[test]
    fn tenant_scoped_event_carries_organization_id() {
        let tenant_id = TenantId(Uuid::new_v4());
        let event = GatewayEvent::CorrelationStarted {
            organization_id: tenant_id,
            analysis_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.organization_id(), Some(tenant_id));
    }

    #[tokio::test]
    async fn null_publisher_accepts_every_event_without_panicking() {
        let publisher = NullEventPublisher;
        publisher
            .publish(GatewayEvent::SystemPerformanceUpdate {
                latency: 10.0,
                accuracy: 0.9,
                throughput: 100.0,
                timestamp: Utc::now(),
            })
            .await;
    }
}
