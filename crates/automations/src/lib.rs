//! The `DiscoveredAutomation` entity store: not a numbered
//! component of its own, but the shared table read and written by the
//! Detection Engine, Risk Assessor, Discovery Orchestrator and
//! Correlation Engine.

pub mod model;
pub mod repository;
pub mod service;

pub use model::{
    risk_level_for, AutomationId, AutomationTimestamps, DiscoveredAutomation, RiskAssessment,
    RiskComponents, RiskLevel, RiskScoreHistoryEntry,
};
pub use repository::{AutomationRepository, InMemoryAutomationRepository, PostgresAutomationRepository};
pub use service::AutomationService;
