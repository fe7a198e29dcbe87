pub mod audit;
pub mod config;
pub mod database;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod realtime;
pub mod security;
pub mod types;
pub mod utils;

pub use audit::{AuditEvent, AuditLogger, AuditRepository};
pub use config::{
    Config, CorsConfig, DiscoveryConfig, CorrelationConfig, GatewayConfig, OAuthClientConfig, OAuthConfig, RlConfig,
    QuotaConfig, RetentionConfig,
};
pub use database::DatabasePool;
pub use error::{Error, ErrorCode, ErrorContext, ErrorMetrics, Result};
pub use jobs::{JobExecutor, JobQueue, RedisJobQueue, SerializableJob};
pub use metrics::{MetricsRegistry, MetricsService, PlatformMetrics};
pub use realtime::{AlertLevel, EventPublisher, GatewayEvent, HealthStatus, NotificationLevel, NullEventPublisher, ServiceHealth};
pub use types::*;

#[cfg(test)]
mod tests;

// Re-export commonly used types from dependencies
pub use uuid::Uuid;
pub use chrono::{DateTime, Utc};