//! Discovery Orchestrator: the single-connection
//! discovery contract and its per-tenant fan-out, generalized from
//! `shadowai_core::jobs::executor`'s semaphore-bounded concurrency
//! model from arbitrary job execution to a typed connection fan-out.

use crate::connection::ConnectionRepository;
use crate::run::DiscoveryRun;
use shadowai_automations::AutomationService;
use shadowai_connectors::connector::TimeRange;
use shadowai_connectors::registry::ConnectorRegistry;
use shadowai_connectors::types::{ConnectionId, ConnectionStatus, Platform, PlatformConnection};
use shadowai_core::error::{ErrorCode, Result};
use shadowai_core::types::TenantId;
use shadowai_credentials::CredentialStore;
use shadowai_detection::{BusinessHours, DetectionEngine, DetectorThresholds};
use shadowai_learning::RlThresholdService;
use shadowai_risk::RiskAssessor;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub fan_out_concurrency: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { fan_out_concurrency: 8 }
    }
}

/// Aggregate result of a tenant-wide fan-out.
#[derive(Debug, Default, Clone)]
pub struct FanOutSummary {
    pub connections_attempted: u32,
    pub connections_succeeded: u32,
    pub connections_failed: u32,
    pub automations_found: u32,
}

pub struct DiscoveryOrchestrator {
    connections: Arc<dyn ConnectionRepository>,
    connectors: ConnectorRegistry,
    credentials: Arc<CredentialStore>,
    automations: Arc<AutomationService>,
    risk: Arc<RiskAssessor>,
    rl_thresholds: Arc<RlThresholdService>,
}

impl DiscoveryOrchestrator {
    pub fn new(
        connections: Arc<dyn ConnectionRepository>,
        connectors: ConnectorRegistry,
        credentials: Arc<CredentialStore>,
        automations: Arc<AutomationService>,
        risk: Arc<RiskAssessor>,
        rl_thresholds: Arc<RlThresholdService>,
    ) -> Self {
        Self { connections, connectors, credentials, automations, risk, rl_thresholds }
    }

    /// The single-discovery contract.
    pub async fn discover_connection(&self, conn: &PlatformConnection) -> Result<DiscoveryRun> {
        let tenant_id = TenantId(conn.tenant_id);
        let mut run = DiscoveryRun::start(tenant_id, conn.connection_id);

        let connector = match self.connectors.get(conn.platform) {
            Ok(connector) => connector,
            Err(error) => {
                run.errors.push(error.to_string());
                run.close(true);
                return Ok(run);
            }
        };

        let credentials = match self.credentials.get(conn.connection_id).await? {
            Some(credentials) => credentials,
            None => {
                self.connections
                    .mark_error(conn.connection_id, "no credentials stored for connection".to_string())
                    .await?;
                run.errors.push("no credentials stored for connection".to_string());
                run.close(true);
                return Ok(run);
            }
        };

        if let Err(error) = connector.authenticate(&credentials.access_token).await {
            if matches!(error.code, ErrorCode::AuthenticationFailed | ErrorCode::InvalidCredentials | ErrorCode::TokenExpired | ErrorCode::TokenInvalid) {
                self.connections.mark_error(conn.connection_id, error.to_string()).await?;
                run.errors.push(error.to_string());
                run.close(true);
                return Ok(run);
            }
            // A non-auth failure at this step is treated the same as any
            // other per-call failure below: captured, not fatal.
            run.errors.push(error.to_string());
        }

        let discovered = match connector.discover_automations().await {
            Ok(automations) => automations,
            Err(error) => {
                run.errors.push(error.to_string());
                Vec::new()
            }
        };

        let since = chrono::Utc::now() - chrono::Duration::days(30);
        if let Err(error) = connector.get_audit_logs(since).await {
            run.errors.push(error.to_string());
        }

        if let Err(error) = connector.validate_permissions().await {
            run.warnings.push(error.to_string());
        }

        let events = match connector.get_correlation_events(TimeRange { since, until: chrono::Utc::now() }).await {
            Ok(events) => events,
            Err(error) => {
                run.warnings.push(error.to_string());
                Vec::new()
            }
        };

        let thresholds = self.rl_thresholds.effective_thresholds(tenant_id, &DetectorThresholds::default());
        let detection = DetectionEngine::analyze(events, BusinessHours::default(), thresholds).await;

        let mut seen_external_ids = Vec::with_capacity(discovered.len());
        for raw in discovered {
            seen_external_ids.push(raw.external_id.clone());
            match self.automations.upsert_discovered(tenant_id, conn.connection_id, raw).await {
                Ok(automation) => {
                    run.automations_found += 1;
                    if let Err(error) = self.risk.assess(automation, &detection).await {
                        run.warnings.push(error.to_string());
                    }
                }
                Err(error) => run.errors.push(error.to_string()),
            }
        }

        if let Err(error) = self.automations.deactivate_missing(conn.connection_id, &seen_external_ids).await {
            run.warnings.push(error.to_string());
        }

        run.close(false);
        Ok(run)
    }

    /// Fan-out `runDiscovery`: runs every active
    /// connection (or a caller-specified subset) concurrently, bounded
    /// by `fan_out_concurrency`. One connection's failure never aborts
    /// its peers.
    pub async fn run_discovery(
        &self,
        connections: Vec<PlatformConnection>,
        config: &DiscoveryConfig,
    ) -> Result<FanOutSummary> {
        let semaphore = Arc::new(Semaphore::new(config.fan_out_concurrency.max(1)));
        let mut tasks = Vec::with_capacity(connections.len());

        for conn in connections {
            let semaphore = Arc::clone(&semaphore);
            let orchestrator = self.self_handle();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                orchestrator.discover_connection(&conn).await
            }));
        }

        let mut summary = FanOutSummary::default();
        for task in tasks {
            summary.connections_attempted += 1;
            match task.await {
                Ok(Ok(run)) => {
                    summary.automations_found += run.automations_found;
                    match run.status {
                        crate::run::RunStatus::Failed => summary.connections_failed += 1,
                        _ => summary.connections_succeeded += 1,
                    }
                }
                Ok(Err(error)) => {
                    error!(%error, "discovery run errored before producing a result");
                    summary.connections_failed += 1;
                }
                Err(join_error) => {
                    error!(%join_error, "discovery task panicked");
                    summary.connections_failed += 1;
                }
            }
        }

        info!(
            attempted = summary.connections_attempted,
            succeeded = summary.connections_succeeded,
            failed = summary.connections_failed,
            automations_found = summary.automations_found,
            "discovery fan-out complete"
        );
        Ok(summary)
    }

    /// Runs discovery for every active connection belonging to one tenant.
    pub async fn run_discovery_for_tenant(
        &self,
        tenant_id: TenantId,
        config: &DiscoveryConfig,
    ) -> Result<FanOutSummary> {
        let connections = self.connections.list_active_by_tenant(tenant_id).await?;
        self.run_discovery(connections, config).await
    }

    /// A cheap `Arc`-free clone of the handles this orchestrator needs
    /// inside a spawned task, since `Self` itself holds only `Arc`s and
    /// `Clone`-able registry handles.
    fn self_handle(&self) -> Arc<Self> {
        Arc::new(Self {
            connections: Arc::clone(&self.connections),
            connectors: self.connectors.clone(),
            credentials: Arc::clone(&self.credentials),
            automations: Arc::clone(&self.automations),
            risk: Arc::clone(&self.risk),
            rl_thresholds: Arc::clone(&self.rl_thresholds),
        })
    }
}

/// Used by callers constructing a connection in `pending` status before
/// its first credential exchange completes.
pub fn is_ready_for_discovery(conn: &PlatformConnection) -> bool {
    matches!(conn.status, ConnectionStatus::Active) && conn.is_valid()
}

pub fn platform_label(platform: Platform) -> &'static str {
    match platform {
        Platform::Slack => "slack",
        Platform::Google => "google",
        Platform::Microsoft => "microsoft",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::InMemoryConnectionRepository;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use futures::stream::BoxStream;
    use shadowai_automations::InMemoryAutomationRepository;
    use shadowai_connectors::connector::{PlatformConnector, TimeRange};
    use shadowai_connectors::types::{AuditEntry, AutomationType, PermissionValidation, PlatformEvent, RawAutomation};
    use shadowai_core::config::SecurityConfig;
    use shadowai_core::security::EncryptionService;
    use shadowai_credentials::store::TokenIssuer;
    use shadowai_credentials::{CredentialRepository, EncryptedCredential, CredentialKind, OAuthCredentials};
    use shadowai_learning::{FeedbackStore, InMemoryFeedbackRepository, RlThresholdService};
    use shadowai_risk::RiskAssessor;
    use std::collections::HashMap;
    use tokio::sync::Mutex as TokioMutex;
    use uuid::Uuid;

    struct StubConnector;

    #[async_trait]
    impl PlatformConnector for StubConnector {
        fn platform(&self) -> Platform {
            Platform::Slack
        }

        fn rate_limit_per_minute(&self) -> u32 {
            60
        }

        async fn authenticate(&self, _access_token: &str) -> Result<()> {
            Ok(())
        }

        async fn discover_automations(&self) -> Result<Vec<RawAutomation>> {
            Ok(vec![RawAutomation {
                external_id: "bot-1".to_string(),
                name: "Standup Bot".to_string(),
                automation_type: AutomationType::Bot,
                status: "active".to_string(),
                trigger: None,
                actions: Vec::new(),
                permissions_required: Vec::new(),
                owner_info: HashMap::new(),
                created_at: None,
                last_modified: None,
                last_triggered: None,
                metadata: HashMap::new(),
            }])
        }

        async fn get_audit_logs(&self, _since: DateTime<Utc>) -> Result<Vec<AuditEntry>> {
            Ok(Vec::new())
        }

        async fn validate_permissions(&self) -> Result<PermissionValidation> {
            Ok(PermissionValidation { valid: true, ..Default::default() })
        }

        async fn get_correlation_events(&self, _range: TimeRange) -> Result<Vec<PlatformEvent>> {
            Ok(Vec::new())
        }

        fn subscribe_real_time(&self) -> BoxStream<'static, PlatformEvent> {
            Box::pin(futures::stream::empty())
        }

        async fn is_connected(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct InMemoryCredRepo {
        rows: TokioMutex<Vec<EncryptedCredential>>,
    }

    #[async_trait]
    impl CredentialRepository for InMemoryCredRepo {
        async fn upsert(&self, credential: &EncryptedCredential) -> Result<()> {
            self.rows.lock().await.push(credential.clone());
            Ok(())
        }
        async fn get(&self, connection_id: ConnectionId, kind: CredentialKind) -> Result<Option<EncryptedCredential>> {
            Ok(self.rows.lock().await.iter().find(|r| r.connection_id == connection_id && r.kind == kind).cloned())
        }
        async fn delete_all(&self, connection_id: ConnectionId) -> Result<()> {
            self.rows.lock().await.retain(|r| r.connection_id != connection_id);
            Ok(())
        }
    }

    struct NoopIssuer;

    #[async_trait]
    impl TokenIssuer for NoopIssuer {
        async fn refresh(&self, _platform: Platform, _refresh_token: &str) -> Result<OAuthCredentials> {
            unreachable!("test connection never nears expiry")
        }
        async fn revoke(&self, _platform: Platform, _access_token: &str) -> Result<()> {
            Ok(())
        }
    }

    fn connection(tenant_id: Uuid, connection_id: ConnectionId) -> PlatformConnection {
        PlatformConnection {
            connection_id,
            tenant_id,
            platform: Platform::Slack,
            platform_user_id: "U1".to_string(),
            platform_workspace_id: Some("W1".to_string()),
            display_name: "Acme Slack".to_string(),
            status: ConnectionStatus::Active,
            scopes_granted: vec!["channels:read".to_string()],
            expires_at: None,
            metadata: HashMap::new(),
            last_error: None,
        }
    }

    #[tokio::test]
    async fn discover_connection_upserts_automations_and_completes() {
        let connectors = ConnectorRegistry::new();
        connectors.register(Arc::new(StubConnector));

        let encryption = Arc::new(
            EncryptionService::new(&SecurityConfig { aes_encryption_key: "0".repeat(32) }).unwrap(),
        );
        let credentials = Arc::new(CredentialStore::new(
            Arc::new(InMemoryCredRepo::default()),
            encryption,
            Arc::new(NoopIssuer),
            connectors.clone(),
        ));
        let automations = Arc::new(AutomationService::new(Arc::new(InMemoryAutomationRepository::default())));
        let connection_repo: Arc<dyn ConnectionRepository> = Arc::new(InMemoryConnectionRepository::default());
        let risk = Arc::new(RiskAssessor::new(automations.clone()));
        let rl_thresholds = Arc::new(RlThresholdService::new(
            FeedbackStore::new(Arc::new(InMemoryFeedbackRepository::default())),
            30,
        ));

        let tenant_id = Uuid::new_v4();
        let connection_id = ConnectionId::new();
        let conn = connection(tenant_id, connection_id);
        connection_repo.upsert(&conn).await.unwrap();
        credentials
            .store(connection_id, Platform::Slack, OAuthCredentials {
                access_token: "token".to_string(),
                refresh_token: None,
                expires_at: None,
            })
            .await
            .unwrap();

        let orchestrator =
            DiscoveryOrchestrator::new(connection_repo, connectors, credentials, automations.clone(), risk, rl_thresholds);
        let run = orchestrator.discover_connection(&conn).await.unwrap();

        assert_eq!(run.status, crate::run::RunStatus::Completed);
        assert_eq!(run.automations_found, 1);
        let stored = automations.list_by_connection(connection_id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].risk_score_history.len(), 1);
    }

    #[tokio::test]
    async fn discover_connection_without_credentials_marks_connection_error() {
        let connectors = ConnectorRegistry::new();
        connectors.register(Arc::new(StubConnector));

        let encryption = Arc::new(
            EncryptionService::new(&SecurityConfig { aes_encryption_key: "0".repeat(32) }).unwrap(),
        );
        let credentials = Arc::new(CredentialStore::new(
            Arc::new(InMemoryCredRepo::default()),
            encryption,
            Arc::new(NoopIssuer),
            connectors.clone(),
        ));
        let automations = Arc::new(AutomationService::new(Arc::new(InMemoryAutomationRepository::default())));
        let connection_repo: Arc<dyn ConnectionRepository> = Arc::new(InMemoryConnectionRepository::default());
        let risk = Arc::new(RiskAssessor::new(automations.clone()));
        let rl_thresholds = Arc::new(RlThresholdService::new(
            FeedbackStore::new(Arc::new(InMemoryFeedbackRepository::default())),
            30,
        ));

        let tenant_id = Uuid::new_v4();
        let connection_id = ConnectionId::new();
        let conn = connection(tenant_id, connection_id);
        connection_repo.upsert(&conn).await.unwrap();

        let orchestrator =
            DiscoveryOrchestrator::new(connection_repo.clone(), connectors, credentials, automations, risk, rl_thresholds);
        let run = orchestrator.discover_connection(&conn).await.unwrap();

        assert_eq!(run.status, crate::run::RunStatus::Failed);
        let stored = connection_repo.get(connection_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Error);
    }
}
