//! Types produced by one correlation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shadowai_automations::RiskLevel;
use shadowai_connectors::types::Platform;
use shadowai_core::types::TenantId;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub Uuid);

impl ChainId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataProcessingStage {
    pub transformation_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStage {
    pub data_processing: DataProcessingStage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub stages: Vec<WorkflowStage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplianceImpact {
    pub gdpr_violations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainRiskAssessment {
    pub overall_risk: f64,
    pub compliance_impact: ComplianceImpact,
}

/// One detected cross-platform automation workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationWorkflowChain {
    pub chain_id: ChainId,
    pub platforms: Vec<Platform>,
    pub workflow: Workflow,
    pub risk_level: RiskLevel,
    pub risk_assessment: ChainRiskAssessment,
}

/// `risk -> score` used both to roll chain-level risk into the run's
/// `overallRiskScore` and to report a single tenant-wide risk figure
///.
pub fn risk_level_score(level: RiskLevel) -> f64 {
    match level {
        RiskLevel::Low => 25.0,
        RiskLevel::Medium => 50.0,
        RiskLevel::High => 75.0,
        RiskLevel::Critical => 100.0,
    }
}

/// Stage-3 output: carries what stage 4 and the gateway's
/// `risk:assessment_update` payload need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiPlatformRiskAssessment {
    pub overall_risk_score: f64,
    pub overall_risk_level: RiskLevel,
    pub high_risk_chain_count: usize,
    pub compliance_violation_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationSummary {
    pub total_automation_chains: usize,
    pub cross_platform_workflows: usize,
    pub ai_integrations_detected: usize,
    pub compliance_violations: usize,
    pub overall_risk_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recommendations {
    pub immediate: Vec<String>,
    pub short_term: Vec<String>,
    pub long_term: Vec<String>,
}

/// Full output of `execute_correlation_analysis`, cached as
/// `lastAnalysisResult` and served over `correlation:completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationAnalysisResult {
    pub analysis_id: Uuid,
    pub tenant_id: TenantId,
    pub analysis_date: DateTime<Utc>,
    pub platforms: Vec<Platform>,
    pub summary: CorrelationSummary,
    pub workflows: Vec<AutomationWorkflowChain>,
    pub risk_assessment: MultiPlatformRiskAssessment,
    pub executive_summary: String,
    pub recommendations: Recommendations,
}
