//! C4 Detector Suite and C6 Detection Engine: seven
//! pure, stateless-per-call detectors that transform raw platform events
//! into typed `ActivityPattern`s, fanned out and folded into
//! `DetectionMetadata` by `DetectionEngine::analyze`.

pub mod ai_provider;
pub mod batch;
pub mod data_volume;
pub mod engine;
pub mod off_hours;
pub mod permission_escalation;
pub mod timing_variance;
pub mod types;
pub mod velocity;

pub use engine::{DetectionEngine, DetectionOutput};
pub use types::{
    confidence_to_severity, ActivityPattern, AiProviderDetection, BusinessHours, DetectionMetadata, DetectionPattern,
    DetectorThresholds, Evidence, PatternMetadata, PatternType, Severity,
};
