//! Discovery Orchestrator: per-connection discovery,
//! tenant-wide fan-out, and the per-tenant periodic scheduler.

pub mod connection;
pub mod orchestrator;
pub mod run;
pub mod scheduler;

pub use connection::{ConnectionRepository, InMemoryConnectionRepository, PostgresConnectionRepository};
pub use orchestrator::{DiscoveryConfig, DiscoveryOrchestrator, FanOutSummary};
pub use run::{DiscoveryRun, RunStatus};
pub use scheduler::DiscoveryScheduler;
