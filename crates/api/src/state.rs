use redis::aio::ConnectionManager;
use shadowai_automations::AutomationService;
use shadowai_connectors::registry::ConnectorRegistry;
use shadowai_connectors::{GoogleConnector, MicrosoftConnector, SlackConnector};
use shadowai_core::metrics::MetricsService;
use shadowai_core::security::JwtService;
use shadowai_core::{Config, DatabasePool};
use shadowai_correlation::CorrelationEngine;
use shadowai_credentials::CredentialStore;
use shadowai_discovery::{ConnectionRepository, DiscoveryOrchestrator, DiscoveryScheduler};
use shadowai_gateway::GatewayServer;
use shadowai_learning::{FeedbackStore, RlThresholdService, RollbackMonitor};
use shadowai_risk::RiskAssessor;
use shadowai_storage::QuotaTracker;
use std::sync::Arc;

/// Every long-lived service this process hosts, assembled once in
/// `main.rs` and shared across handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: DatabasePool,
    pub redis: ConnectionManager,
    pub connectors: ConnectorRegistry,
    pub connections: Arc<dyn ConnectionRepository>,
    pub credentials: Arc<CredentialStore>,
    pub automations: Arc<AutomationService>,
    pub discovery: Arc<DiscoveryOrchestrator>,
    pub scheduler: Arc<DiscoveryScheduler>,
    pub risk: Arc<RiskAssessor>,
    pub feedback: Arc<FeedbackStore>,
    pub rl_thresholds: Arc<RlThresholdService>,
    pub rollback: Arc<RollbackMonitor>,
    pub quota: Arc<QuotaTracker>,
    pub correlation: Arc<CorrelationEngine>,
    pub gateway: Arc<GatewayServer>,
    pub jwt: JwtService,
    pub metrics: Arc<MetricsService>,
}

/// Registers the three platform connectors against a shared HTTP client.
/// Connectors are stateless between calls, so one instance per platform
/// is reused across every tenant connection.
pub fn register_connectors(http: reqwest::Client) -> ConnectorRegistry {
    let registry = ConnectorRegistry::new();
    registry.register(Arc::new(SlackConnector::new(http.clone())));
    registry.register(Arc::new(GoogleConnector::new(http.clone())));
    registry.register(Arc::new(MicrosoftConnector::new(http)));
    registry
}
