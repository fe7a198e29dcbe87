//! C1 Platform Connector: a uniform capability over each
//! SaaS platform (Slack, Google Workspace, Microsoft 365), plus the
//! AI-fingerprint table and the process-wide connector registry.

pub mod connector;
pub mod fingerprint;
pub mod google;
pub mod microsoft;
pub mod registry;
pub mod slack;
pub mod types;

pub use connector::{rate_limit_pause, PlatformConnector, TimeRange};
pub use fingerprint::{match_ai_provider, AiFingerprint, AI_FINGERPRINTS};
pub use google::GoogleConnector;
pub use microsoft::MicrosoftConnector;
pub use registry::ConnectorRegistry;
pub use slack::SlackConnector;
