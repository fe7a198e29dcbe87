//! RL Threshold Service and Feedback Store:
//! learns per-tenant detector sensitivity from analyst-submitted
//! true/false-positive labels, with a periodic safety rollback.

pub mod feedback;
pub mod rollback;
pub mod thresholds;

pub use feedback::{
    DetectionFeedback, FeedbackLabel, FeedbackMetrics, FeedbackRepository, FeedbackStore,
    InMemoryFeedbackRepository, PostgresFeedbackRepository,
};
pub use rollback::{RollbackDecision, RollbackMonitor};
pub use thresholds::{OptimizedThresholds, RlThresholdService, TUNABLE_DETECTORS};
