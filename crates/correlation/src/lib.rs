//! Correlation Engine: single-flight-per-tenant, four-stage
//! cross-platform workflow chain detection and risk roll-up, publishing
//! progress onto the shared [`shadowai_core::realtime::GatewayEvent`]
//! vocabulary.

pub mod chain_detector;
pub mod engine;
pub mod types;

pub use chain_detector::{detect_chains, ChainDetector, HeuristicChainDetector};
pub use engine::CorrelationEngine;
pub use types::{
    AutomationWorkflowChain, ChainId, ChainRiskAssessment, ComplianceImpact, CorrelationAnalysisResult,
    CorrelationSummary, DataProcessingStage, MultiPlatformRiskAssessment, Recommendations, Workflow, WorkflowStage,
    risk_level_score,
};
