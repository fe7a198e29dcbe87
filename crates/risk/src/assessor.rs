//! C7 Risk Assessor: turns one automation's `DetectionOutput` into a
//! scored `RiskAssessment` and appends the result to the automation's
//! append-only risk-score history.

use crate::formulas::{activity_risk, data_access_risk, ownership_risk, overall_score, permission_risk, RiskComponentScores};
use chrono::Utc;
use shadowai_automations::{
    risk_level_for, AutomationService, DiscoveredAutomation, RiskAssessment, RiskComponents, RiskLevel,
    RiskScoreHistoryEntry,
};
use shadowai_core::error::Result;
use shadowai_detection::DetectionOutput;
use std::sync::Arc;
use tracing::debug;

/// Feedback rows past which the assessor's confidence in its own score
/// saturates at 1.0; mirrors the RL service's saturation constant
/// (`shadowai-learning`'s `CONFIDENCE_SATURATION`) since both measure
/// confidence as "evidence accumulated so far".
const CONFIDENCE_SATURATION_PATTERNS: f64 = 10.0;

pub struct RiskAssessor {
    automations: Arc<AutomationService>,
}

impl RiskAssessor {
    pub fn new(automations: Arc<AutomationService>) -> Self {
        Self { automations }
    }

    /// Scores `automation` against one `DetectionOutput` and persists the
    /// result onto its risk-score history. Returns the updated automation alongside the
    /// assessment so callers can re-use the refreshed history without a
    /// second read.
    pub async fn assess(
        &self,
        automation: DiscoveredAutomation,
        detection: &DetectionOutput,
    ) -> Result<(DiscoveredAutomation, RiskAssessment)> {
        let assessment = Self::score(&automation, detection);
        let entry = RiskScoreHistoryEntry {
            ts: assessment.assessed_at,
            score: assessment.score,
            level: assessment.level,
            factors: assessment.risk_factors.clone(),
            source: "risk_assessor".to_string(),
        };
        debug!(
            automation_id = %automation.automation_id.0,
            score = assessment.score,
            level = ?assessment.level,
            "assessed automation risk"
        );
        let automation = self.automations.append_risk_history(automation, entry).await?;
        Ok((automation, assessment))
    }

    /// Pure scoring function,
    /// split out from [`Self::assess`] so it can be exercised without a
    /// repository.
    pub fn score(automation: &DiscoveredAutomation, detection: &DetectionOutput) -> RiskAssessment {
        let activity = activity_risk(&detection.patterns);
        let permission = permission_risk(&detection.indicators);
        let data_access = data_access_risk(&detection.patterns);
        let ownership = ownership_risk(&automation.owner_info);

        let score = overall_score(RiskComponentScores { activity, permission, data_access, ownership });
        let level = risk_level_for(score);

        let has_ai_provider = detection.detection_metadata.ai_provider.is_some();
        let pattern_count = detection.patterns.len() as f64;
        let confidence_level = (pattern_count / CONFIDENCE_SATURATION_PATTERNS * 100.0).min(100.0);

        RiskAssessment {
            automation_id: automation.automation_id,
            tenant_id: automation.tenant_id,
            level,
            score,
            components: RiskComponents { permission, data_access, activity, ownership },
            risk_factors: risk_factors(activity, permission, data_access, ownership, &automation.owner_info),
            compliance_issues: compliance_issues(data_access, has_ai_provider),
            security_concerns: security_concerns(permission, has_ai_provider),
            recommendations: recommendations(level),
            confidence_level,
            assessed_at: Utc::now(),
        }
    }
}

fn risk_factors(
    activity: f64,
    permission: f64,
    data_access: f64,
    ownership: f64,
    owner_info: &std::collections::HashMap<String, serde_json::Value>,
) -> Vec<String> {
    let mut factors = Vec::new();
    if activity >= 60.0 {
        factors.push("Elevated activity velocity or burst pattern volume".to_string());
    }
    if permission >= 60.0 {
        factors.push("Permission scopes escalated or at high severity".to_string());
    }
    if data_access >= 60.0 {
        factors.push("High-confidence data-access or transfer activity".to_string());
    }
    if owner_info.is_empty() {
        factors.push("No recorded owner for this automation".to_string());
    } else if ownership >= 60.0 {
        factors.push("Owned by a service account rather than an identified individual".to_string());
    }
    factors
}

fn compliance_issues(data_access: f64, has_ai_provider: bool) -> Vec<String> {
    let mut issues = Vec::new();
    if data_access >= 70.0 {
        issues.push("Elevated data-access activity may require data protection review (GDPR/CCPA)".to_string());
    }
    if has_ai_provider && data_access >= 40.0 {
        issues.push("Data shared with an external AI provider may require a data-processing agreement".to_string());
    }
    issues
}

fn security_concerns(permission: f64, has_ai_provider: bool) -> Vec<String> {
    let mut concerns = Vec::new();
    if permission >= 75.0 {
        concerns.push("Recent permission escalation detected; review granted scopes".to_string());
    }
    if has_ai_provider {
        concerns.push("Automation communicates with an external AI provider".to_string());
    }
    concerns
}

fn recommendations(level: RiskLevel) -> Vec<String> {
    match level {
        RiskLevel::Critical => vec![
            "Immediately review this automation's permissions and consider revocation".to_string(),
            "Notify the security team for incident triage".to_string(),
        ],
        RiskLevel::High => vec![
            "Review this automation's granted scopes within 24 hours".to_string(),
            "Confirm the automation's owner and business justification".to_string(),
        ],
        RiskLevel::Medium => vec!["Schedule this automation for the next periodic access review".to_string()],
        RiskLevel::Low => vec!["No action required; continue routine monitoring".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shadowai_automations::InMemoryAutomationRepository;
    use shadowai_connectors::types::{AutomationType, ConnectionId, RawAutomation};
    use shadowai_core::types::TenantId;
    use shadowai_detection::{ActivityPattern, DetectionMetadata, Evidence, PatternMetadata, PatternType};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn automation() -> DiscoveredAutomation {
        let raw = RawAutomation {
            external_id: "abc123".to_string(),
            name: "ChatGPT for Google".to_string(),
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
        };
        DiscoveredAutomation::from_raw(TenantId(Uuid::new_v4()), ConnectionId::new(), raw, Utc::now())
    }

    fn pattern(pattern_type: PatternType, confidence: f64, description: &str) -> ActivityPattern {
        ActivityPattern {
            pattern_id: Uuid::new_v4(),
            pattern_type,
            detected_at: Utc::now(),
            confidence,
            metadata: PatternMetadata {
                actor: "u1".to_string(),
                resource_type: None,
                action_type: None,
                timestamp: Utc::now(),
            },
            evidence: Evidence {
                description: description.to_string(),
                data_points: Default::default(),
                supporting_events: Vec::new(),
            },
        }
    }

    fn detection_output(patterns: Vec<ActivityPattern>, indicators: Vec<ActivityPattern>) -> DetectionOutput {
        DetectionOutput { patterns, indicators, detection_metadata: DetectionMetadata::empty() }
    }

    #[test]
    fn velocity_example_yields_activity_risk_at_least_52() {
        let automation = automation();
        let output = detection_output(vec![pattern(PatternType::Velocity, 75.0, "30 events in 3s")], Vec::new());
        let assessment = RiskAssessor::score(&automation, &output);
        assert!(assessment.components.activity >= 52.0);
    }

    #[test]
    fn unknown_owner_and_no_patterns_yields_low_risk_with_factor() {
        let automation = automation();
        let output = detection_output(Vec::new(), Vec::new());
        let assessment = RiskAssessor::score(&automation, &output);
        assert_eq!(assessment.level, RiskLevel::Low);
        assert!(assessment.risk_factors.iter().any(|f| f.contains("No recorded owner")));
    }

    #[test]
    fn high_permission_indicator_adds_security_concern_and_recommendation() {
        let automation = automation();
        let escalation = pattern(PatternType::PermissionChange, 95.0, "scope elevated to admin");
        let output = detection_output(vec![escalation.clone()], vec![escalation]);
        let assessment = RiskAssessor::score(&automation, &output);
        assert!(assessment.components.permission >= 75.0);
        assert!(assessment
            .security_concerns
            .iter()
            .any(|c| c.contains("permission escalation")));
        assert!(!assessment.recommendations.is_empty());
    }

    #[tokio::test]
    async fn assess_persists_entry_onto_risk_score_history() {
        let automations = Arc::new(AutomationService::new(Arc::new(InMemoryAutomationRepository::default())));
        let assessor = RiskAssessor::new(Arc::clone(&automations));
        let automation = automation();
        let output = detection_output(vec![pattern(PatternType::Velocity, 80.0, "burst")], Vec::new());

        let (updated, assessment) = assessor.assess(automation, &output).await.unwrap();
        assert_eq!(updated.risk_score_history.len(), 1);
        assert_eq!(updated.risk_score_history[0].score, assessment.score);
    }
}
