//! C3 Hybrid Storage and C11 API Metrics & Quota.

pub mod hybrid;
pub mod quota;

pub use hybrid::{DurableWriter, HybridRepository, NaturalKey, WriteOutcome};
pub use quota::{QuotaStatus, QuotaTracker};
