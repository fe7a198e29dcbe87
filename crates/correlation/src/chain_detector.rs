//! The "external cross-platform correlation capability" stage 2 delegates
//! to. `ChainDetector` is that
//! interface; [`HeuristicChainDetector`] is a deterministic baseline
//! implementation, not a trained model, standing in for it.

use crate::types::{AutomationWorkflowChain, ChainId, ComplianceImpact, ChainRiskAssessment, DataProcessingStage, Workflow, WorkflowStage};
use async_trait::async_trait;
use shadowai_automations::RiskLevel;
use shadowai_connectors::types::{Platform, PlatformEvent};
use shadowai_core::error::Result;
use shadowai_core::types::TenantId;
use std::collections::HashMap;

#[async_trait]
pub trait ChainDetector: Send + Sync {
    async fn detect_chains(&self, tenant_id: TenantId, events: &[PlatformEvent]) -> Result<Vec<AutomationWorkflowChain>>;
}

/// Groups one batch's events by actor; any actor whose events span two or
/// more platforms is reported as one cross-platform workflow chain. Risk
/// escalates with platform spread and the presence of an AI-inference
/// stage; a data-export stage is flagged as a possible GDPR exposure.
#[derive(Debug, Default)]
pub struct HeuristicChainDetector;

#[async_trait]
impl ChainDetector for HeuristicChainDetector {
    async fn detect_chains(&self, _tenant_id: TenantId, events: &[PlatformEvent]) -> Result<Vec<AutomationWorkflowChain>> {
        Ok(detect_chains(events))
    }
}

pub fn detect_chains(events: &[PlatformEvent]) -> Vec<AutomationWorkflowChain> {
    let mut by_actor: HashMap<&str, Vec<&PlatformEvent>> = HashMap::new();
    for event in events {
        by_actor.entry(event.user_id.as_str()).or_default().push(event);
    }

    let mut chains = Vec::new();
    for actor_events in by_actor.values() {
        let mut platforms: Vec<Platform> = actor_events.iter().map(|e| e.platform).collect();
        platforms.sort_by_key(platform_rank);
        platforms.dedup();
        if platforms.len() < 2 {
            continue;
        }

        let stages: Vec<WorkflowStage> = actor_events
            .iter()
            .map(|e| WorkflowStage { data_processing: DataProcessingStage { transformation_type: transformation_type_for(&e.event_type) } })
            .collect();
        let has_ai_stage = stages.iter().any(|s| s.data_processing.transformation_type.starts_with("ai_"));
        let has_export_stage = stages.iter().any(|s| s.data_processing.transformation_type == "data_export");

        let risk_level = if has_ai_stage || platforms.len() >= 3 {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        };
        let gdpr_violations = if has_export_stage {
            vec!["cross-platform data export without a documented transfer safeguard".to_string()]
        } else {
            Vec::new()
        };

        chains.push(AutomationWorkflowChain {
            chain_id: ChainId::new(),
            platforms,
            workflow: Workflow { stages },
            risk_level,
            risk_assessment: ChainRiskAssessment {
                overall_risk: crate::types::risk_level_score(risk_level),
                compliance_impact: ComplianceImpact { gdpr_violations },
            },
        });
    }
    chains
}

fn platform_rank(platform: &Platform) -> u8 {
    match platform {
        Platform::Slack => 0,
        Platform::Google => 1,
        Platform::Microsoft => 2,
    }
}

fn transformation_type_for(event_type: &str) -> String {
    let lowered = event_type.to_lowercase();
    if lowered.contains("ai") || lowered.contains("gpt") || lowered.contains("completion") {
        "ai_inference".to_string()
    } else if lowered.contains("export") || lowered.contains("download") {
        "data_export".to_string()
    } else {
        "passthrough".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shadowai_connectors::types::{ActionDetails, CorrelationMetadata};

    fn event(platform: Platform, user_id: &str, event_type: &str) -> PlatformEvent {
        PlatformEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            platform,
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            user_email: None,
            event_type: event_type.to_string(),
            resource_id: None,
            resource_type: None,
            action_details: ActionDetails { action: event_type.to_string(), resource_name: None, additional_metadata: Default::default() },
            ip_address: None,
            correlation_metadata: CorrelationMetadata::default(),
        }
    }

    #[test]
    fn single_platform_actor_yields_no_chain() {
        let events = vec![event(Platform::Slack, "u1", "message_post"), event(Platform::Slack, "u1", "file_share")];
        assert!(detect_chains(&events).is_empty());
    }

    #[test]
    fn cross_platform_actor_with_ai_stage_is_high_risk() {
        let events = vec![
            event(Platform::Slack, "u1", "message_post"),
            event(Platform::Google, "u1", "gpt_completion_request"),
        ];
        let chains = detect_chains(&events);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].risk_level, RiskLevel::High);
        assert_eq!(chains[0].platforms.len(), 2);
    }

    #[test]
    fn export_stage_flags_gdpr_violation() {
        let events = vec![
            event(Platform::Slack, "u1", "file_create"),
            event(Platform::Google, "u1", "drive_export_download"),
        ];
        let chains = detect_chains(&events);
        assert_eq!(chains.len(), 1);
        assert!(!chains[0].risk_assessment.compliance_impact.gdpr_violations.is_empty());
    }
}
