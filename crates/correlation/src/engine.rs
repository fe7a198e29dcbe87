//! C9 Correlation Engine: single-flight-per-tenant,
//! four-stage cross-platform correlation pipeline with a reader-writer
//! `lastAnalysisResult` cache.

use crate::chain_detector::ChainDetector;
use crate::types::{
    risk_level_score, CorrelationAnalysisResult, CorrelationSummary, MultiPlatformRiskAssessment, Recommendations,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shadowai_automations::RiskLevel;
use shadowai_connectors::{ConnectorRegistry, TimeRange};
use shadowai_core::error::{Error, Result};
use shadowai_core::realtime::{AlertLevel, EventPublisher, GatewayEvent};
use shadowai_core::types::TenantId;
use shadowai_discovery::ConnectionRepository;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::warn;
use uuid::Uuid;

/// Tenant whose threshold (as a fraction of the `riskScore` SubscriptionPreference
/// field a client registers) the engine checks against the run's
/// `overallRiskScore` before emitting `risk:threshold_exceeded`. Per-subscriber
/// filtering on top of this tenant-wide check happens in the gateway,
/// which holds the `SubscriptionPreference` map this engine does not;
/// this constant is the engine's own floor, documented as a decision in
/// DESIGN.md.
const DEFAULT_RISK_ALERT_THRESHOLD: f64 = 70.0;

pub struct CorrelationEngine {
    connectors: ConnectorRegistry,
    connections: Arc<dyn ConnectionRepository>,
    chain_detector: Arc<dyn ChainDetector>,
    publisher: Arc<dyn EventPublisher>,
    config: shadowai_core::config::CorrelationConfig,
    in_flight: DashMap<TenantId, ()>,
    last_result: Arc<RwLock<HashMap<TenantId, CorrelationAnalysisResult>>>,
    risk_alert_threshold: f64,
}

impl CorrelationEngine {
    pub fn new(
        connectors: ConnectorRegistry,
        connections: Arc<dyn ConnectionRepository>,
        chain_detector: Arc<dyn ChainDetector>,
        publisher: Arc<dyn EventPublisher>,
        config: shadowai_core::config::CorrelationConfig,
    ) -> Self {
        Self {
            connectors,
            connections,
            chain_detector,
            publisher,
            config,
            in_flight: DashMap::new(),
            last_result: Arc::new(RwLock::new(HashMap::new())),
            risk_alert_threshold: DEFAULT_RISK_ALERT_THRESHOLD,
        }
    }

    /// Returns the cached result of the most recent completed run for a
    /// tenant, if any.
    pub fn last_result(&self, tenant_id: TenantId) -> Option<CorrelationAnalysisResult> {
        self.last_result.read().unwrap().get(&tenant_id).cloned()
    }

    /// Runs one correlation pass for `tenant_id`. At most
    /// one run per tenant may be inflight; a concurrent second call
    /// returns `AlreadyInProgress` immediately rather than queuing.
    pub async fn execute_correlation_analysis(
        &self,
        tenant_id: TenantId,
        time_range: Option<TimeRange>,
    ) -> Result<CorrelationAnalysisResult> {
        let _guard = self.claim_single_flight(tenant_id)?;
        let started_at = std::time::Instant::now();
        let analysis_id = Uuid::new_v4();

        self.publisher
            .publish(GatewayEvent::CorrelationStarted { organization_id: tenant_id, analysis_id, timestamp: Utc::now() })
            .await;

        let range = time_range.unwrap_or_else(default_time_range);
        let (events, platforms) = self.collect(tenant_id, range).await;
        self.emit_progress(tenant_id, analysis_id, "collect", 20).await;

        let chains = self.chain_detector.detect_chains(tenant_id, &events).await?;
        for chain in &chains {
            self.publisher
                .publish(GatewayEvent::ChainDetected {
                    organization_id: tenant_id,
                    chain: serde_json::to_value(chain).unwrap_or_default(),
                    timestamp: Utc::now(),
                })
                .await;
            if matches!(chain.risk_level, RiskLevel::High | RiskLevel::Critical) {
                let alert_level = if chain.risk_level == RiskLevel::Critical { AlertLevel::Critical } else { AlertLevel::High };
                self.publisher
                    .publish(GatewayEvent::ChainHighRiskAlert {
                        organization_id: tenant_id,
                        chain: serde_json::to_value(chain).unwrap_or_default(),
                        alert_level,
                        timestamp: Utc::now(),
                    })
                    .await;
            }
        }
        self.emit_progress(tenant_id, analysis_id, "chain_detection", 60).await;

        let risk_assessment = assess_multi_platform_risk(&chains);
        self.publisher
            .publish(GatewayEvent::RiskAssessmentUpdate {
                organization_id: tenant_id,
                assessment: serde_json::to_value(&risk_assessment).unwrap_or_default(),
                timestamp: Utc::now(),
            })
            .await;
        if risk_assessment.overall_risk_score >= self.risk_alert_threshold {
            self.publisher
                .publish(GatewayEvent::RiskThresholdExceeded {
                    organization_id: tenant_id,
                    metric: "overall_risk_score".to_string(),
                    value: risk_assessment.overall_risk_score,
                    threshold: self.risk_alert_threshold,
                    timestamp: Utc::now(),
                })
                .await;
        }
        self.emit_progress(tenant_id, analysis_id, "risk_assessment", 80).await;

        let result = compile_result(analysis_id, tenant_id, platforms, chains, risk_assessment);
        validate_structural_shape(&result)?;
        self.last_result.write().unwrap().insert(tenant_id, result.clone());

        let processing_time_ms = started_at.elapsed().as_millis() as u64;
        if processing_time_ms > self.config.max_latency_ms {
            warn!(tenant_id = %tenant_id.0, processing_time_ms, "correlation run exceeded soft latency budget");
        }
        self.publisher
            .publish(GatewayEvent::CorrelationCompleted {
                organization_id: tenant_id,
                result: serde_json::to_value(&result).unwrap_or_default(),
                processing_time_ms,
                timestamp: Utc::now(),
            })
            .await;

        Ok(result)
    }

    fn claim_single_flight(&self, tenant_id: TenantId) -> Result<SingleFlightGuard<'_>> {
        match self.in_flight.entry(tenant_id) {
            Entry::Occupied(_) => Err(Error::already_in_progress(format!(
                "a correlation analysis is already running for tenant {tenant_id}"
            ))),
            Entry::Vacant(entry) => {
                entry.insert(());
                Ok(SingleFlightGuard { in_flight: &self.in_flight, tenant_id })
            }
        }
    }

    async fn emit_progress(&self, tenant_id: TenantId, analysis_id: Uuid, stage: &str, percent: u8) {
        self.publisher
            .publish(GatewayEvent::CorrelationProgress {
                organization_id: tenant_id,
                analysis_id,
                stage: stage.to_string(),
                percent,
                timestamp: Utc::now(),
            })
            .await;
    }

    /// Stage 1: pulls correlation events
    /// from every platform the tenant has an active connection to.
    /// Per-connector failures are isolated; the batch is truncated at
    /// `maxEventsPerBatch` with a logged warning rather than blocking.
    async fn collect(
        &self,
        tenant_id: TenantId,
        range: TimeRange,
    ) -> (Vec<shadowai_connectors::types::PlatformEvent>, Vec<shadowai_connectors::types::Platform>) {
        let connections = self.connections.list_active_by_tenant(tenant_id).await.unwrap_or_default();
        let mut platforms: Vec<shadowai_connectors::types::Platform> = connections.iter().map(|c| c.platform).collect();
        platforms.sort_by_key(|p| format!("{p:?}"));
        platforms.dedup();

        let mut events = Vec::new();
        for platform in &platforms {
            let connector = match self.connectors.get(*platform) {
                Ok(connector) => connector,
                Err(error) => {
                    warn!(%platform, %error, "no connector registered, skipping in correlation collect");
                    continue;
                }
            };
            if !connector.is_connected().await {
                continue;
            }
            match connector.get_correlation_events(range).await {
                Ok(platform_events) => events.extend(platform_events),
                Err(error) => warn!(%platform, %error, "failed to collect correlation events, isolating failure"),
            }
        }

        if events.len() > self.config.max_events_per_batch {
            warn!(
                tenant_id = %tenant_id.0,
                collected = events.len(),
                cap = self.config.max_events_per_batch,
                "correlation batch exceeded maxEventsPerBatch, truncating"
            );
            events.truncate(self.config.max_events_per_batch);
        }

        (events, platforms)
    }
}

/// Releases a tenant's single-flight claim on drop, so every early
/// return (including `?`) still frees the slot.
struct SingleFlightGuard<'a> {
    in_flight: &'a DashMap<TenantId, ()>,
    tenant_id: TenantId,
}

impl Drop for SingleFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.tenant_id);
    }
}

fn default_time_range() -> TimeRange {
    let until = Utc::now();
    TimeRange { since: until - chrono::Duration::hours(24), until }
}

/// Stage 3: folds every chain's
/// risk into one tenant-wide figure.
fn assess_multi_platform_risk(chains: &[crate::types::AutomationWorkflowChain]) -> MultiPlatformRiskAssessment {
    let overall_risk_score = overall_score(chains);
    let overall_risk_level = shadowai_automations::risk_level_for(overall_risk_score);
    let high_risk_chain_count = chains
        .iter()
        .filter(|c| matches!(c.risk_level, RiskLevel::High | RiskLevel::Critical))
        .count();
    let compliance_violation_count = chains.iter().map(|c| c.risk_assessment.compliance_impact.gdpr_violations.len()).sum();

    MultiPlatformRiskAssessment { overall_risk_score, overall_risk_level, high_risk_chain_count, compliance_violation_count }
}

/// Mean of `risk_level_score` over every chain, rounded; zero when no
/// chains were detected.
fn overall_score(chains: &[crate::types::AutomationWorkflowChain]) -> f64 {
    if chains.is_empty() {
        return 0.0;
    }
    let sum: f64 = chains.iter().map(|c| risk_level_score(c.risk_level)).sum();
    (sum / chains.len() as f64).round()
}

/// Stage 4.
fn compile_result(
    analysis_id: Uuid,
    tenant_id: TenantId,
    platforms: Vec<shadowai_connectors::types::Platform>,
    workflows: Vec<crate::types::AutomationWorkflowChain>,
    risk_assessment: MultiPlatformRiskAssessment,
) -> CorrelationAnalysisResult {
    let ai_integrations_detected = workflows
        .iter()
        .filter(|c| c.workflow.stages.iter().any(|s| s.data_processing.transformation_type.starts_with("ai_")))
        .count();
    let cross_platform_workflows = workflows.iter().filter(|c| distinct_platform_count(c) > 1).count();
    let compliance_violations = workflows.iter().map(|c| c.risk_assessment.compliance_impact.gdpr_violations.len()).sum();

    let summary = CorrelationSummary {
        total_automation_chains: workflows.len(),
        cross_platform_workflows,
        ai_integrations_detected,
        compliance_violations,
        overall_risk_score: risk_assessment.overall_risk_score,
    };

    let executive_summary = format!(
        "Analyzed {} cross-platform workflow chain(s) across {} platform(s); {} flagged high or critical risk, {} AI-integration stage(s) detected, {} potential compliance issue(s).",
        summary.total_automation_chains,
        platforms.len(),
        risk_assessment.high_risk_chain_count,
        summary.ai_integrations_detected,
        summary.compliance_violations,
    );

    let recommendations = recommendations_for(risk_assessment.overall_risk_level);

    CorrelationAnalysisResult {
        analysis_id,
        tenant_id,
        analysis_date: Utc::now(),
        platforms,
        summary,
        workflows,
        risk_assessment,
        executive_summary,
        recommendations,
    }
}

fn distinct_platform_count(chain: &crate::types::AutomationWorkflowChain) -> usize {
    let set: HashSet<shadowai_connectors::types::Platform> = chain.platforms.iter().copied().collect();
    set.len()
}

fn recommendations_for(level: RiskLevel) -> Recommendations {
    match level {
        RiskLevel::Critical | RiskLevel::High => Recommendations {
            immediate: vec!["Review and, where warranted, suspend the highest-risk cross-platform workflows".to_string()],
            short_term: vec!["Audit OAuth scopes granted to automations participating in flagged chains".to_string()],
            long_term: vec!["Establish a recurring cross-platform automation review cadence".to_string()],
        },
        RiskLevel::Medium => Recommendations {
            immediate: Vec::new(),
            short_term: vec!["Schedule the flagged workflow chains for the next access review".to_string()],
            long_term: vec!["Track cross-platform automation growth over time".to_string()],
        },
        RiskLevel::Low => Recommendations {
            immediate: Vec::new(),
            short_term: Vec::new(),
            long_term: vec!["Continue routine discovery and correlation scans".to_string()],
        },
    }
}

/// Self-check on the record this run is about to cache and broadcast
///.
fn validate_structural_shape(result: &CorrelationAnalysisResult) -> Result<()> {
    if result.summary.total_automation_chains != result.workflows.len() {
        return Err(Error::fatal("correlation summary chain count does not match workflows length"));
    }
    if result.summary.cross_platform_workflows > result.summary.total_automation_chains {
        return Err(Error::fatal("cross-platform workflow count exceeds total chain count"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_detector::HeuristicChainDetector;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use shadowai_connectors::types::{ActionDetails, ConnectionId, ConnectionStatus, CorrelationMetadata, Platform, PlatformConnection};
    use shadowai_connectors::{PlatformConnector, TimeRange as ConnTimeRange};
    use shadowai_discovery::InMemoryConnectionRepository;
    use std::sync::Mutex as StdMutex;

    struct FakeConnector {
        platform: Platform,
        events: Vec<shadowai_connectors::types::PlatformEvent>,
    }

    #[async_trait]
    impl PlatformConnector for FakeConnector {
        fn platform(&self) -> Platform {
            self.platform
        }
        fn rate_limit_per_minute(&self) -> u32 {
            600
        }
        async fn authenticate(&self, _access_token: &str) -> Result<()> {
            Ok(())
        }
        async fn discover_automations(&self) -> Result<Vec<shadowai_connectors::types::RawAutomation>> {
            Ok(Vec::new())
        }
        async fn get_audit_logs(&self, _since: chrono::DateTime<Utc>) -> Result<Vec<shadowai_connectors::types::AuditEntry>> {
            Ok(Vec::new())
        }
        async fn validate_permissions(&self) -> Result<shadowai_connectors::types::PermissionValidation> {
            Ok(Default::default())
        }
        async fn get_correlation_events(&self, _range: ConnTimeRange) -> Result<Vec<shadowai_connectors::types::PlatformEvent>> {
            Ok(self.events.clone())
        }
        fn subscribe_real_time(&self) -> BoxStream<'static, shadowai_connectors::types::PlatformEvent> {
            Box::pin(futures::stream::empty())
        }
        async fn is_connected(&self) -> bool {
            true
        }
    }

    fn event(platform: Platform, user_id: &str, event_type: &str) -> shadowai_connectors::types::PlatformEvent {
        shadowai_connectors::types::PlatformEvent {
            event_id: Uuid::new_v4().to_string(),
            platform,
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            user_email: None,
            event_type: event_type.to_string(),
            resource_id: None,
            resource_type: None,
            action_details: ActionDetails { action: event_type.to_string(), resource_name: None, additional_metadata: Default::default() },
            ip_address: None,
            correlation_metadata: CorrelationMetadata::default(),
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        events: StdMutex<Vec<GatewayEvent>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: GatewayEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    async fn engine_with_events(
        events: Vec<shadowai_connectors::types::PlatformEvent>,
        publisher: Arc<RecordingPublisher>,
    ) -> (CorrelationEngine, TenantId) {
        let tenant_id = TenantId(Uuid::new_v4());
        let connections: Arc<dyn ConnectionRepository> = Arc::new(InMemoryConnectionRepository::default());
        connections
            .upsert(&PlatformConnection {
                connection_id: ConnectionId::new(),
                tenant_id: tenant_id.0,
                platform: Platform::Slack,
                platform_user_id: "u1".to_string(),
                platform_workspace_id: None,
                display_name: "workspace".to_string(),
                status: ConnectionStatus::Active,
                scopes_granted: Vec::new(),
                expires_at: None,
                metadata: Default::default(),
                last_error: None,
            })
            .await
            .unwrap();
        connections
            .upsert(&PlatformConnection {
                connection_id: ConnectionId::new(),
                tenant_id: tenant_id.0,
                platform: Platform::Google,
                platform_user_id: "u1".to_string(),
                platform_workspace_id: None,
                display_name: "workspace".to_string(),
                status: ConnectionStatus::Active,
                scopes_granted: Vec::new(),
                expires_at: None,
                metadata: Default::default(),
                last_error: None,
            })
            .await
            .unwrap();

        let slack_events: Vec<_> = events.iter().filter(|e| e.platform == Platform::Slack).cloned().collect();
        let google_events: Vec<_> = events.iter().filter(|e| e.platform == Platform::Google).cloned().collect();
        let registry = ConnectorRegistry::new();
        registry.register(Arc::new(FakeConnector { platform: Platform::Slack, events: slack_events }));
        registry.register(Arc::new(FakeConnector { platform: Platform::Google, events: google_events }));

        let config = shadowai_core::config::CorrelationConfig {
            correlation_interval_ms: 300_000,
            max_events_per_batch: 10_000,
            max_latency_ms: 2_000,
            enable_real_time_processing: true,
        };
        let engine = CorrelationEngine::new(registry, connections, Arc::new(HeuristicChainDetector), publisher, config);
        (engine, tenant_id)
    }

    #[tokio::test]
    async fn completes_and_emits_events_in_stage_order() {
        let publisher = Arc::new(RecordingPublisher::default());
        let events = vec![event(Platform::Slack, "u1", "message_post"), event(Platform::Google, "u1", "gpt_completion_request")];
        let (engine, tenant_id) = engine_with_events(events, Arc::clone(&publisher)).await;

        let result = engine.execute_correlation_analysis(tenant_id, None).await.unwrap();
        assert_eq!(result.summary.total_automation_chains, 1);
        assert_eq!(result.summary.ai_integrations_detected, 1);

        let recorded = publisher.events.lock().unwrap();
        let index_of = |name: &str| recorded.iter().position(|e| e.event_name() == name).unwrap();
        assert!(index_of("correlation:started") < index_of("chain:detected"));
        assert!(index_of("chain:detected") < index_of("risk:assessment_update"));
        assert!(index_of("risk:assessment_update") < index_of("correlation:completed"));
        assert_eq!(recorded.iter().filter(|e| e.event_name() == "correlation:completed").count(), 1);
    }

    #[tokio::test]
    async fn concurrent_calls_for_same_tenant_reject_the_second() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (engine, tenant_id) = engine_with_events(Vec::new(), publisher).await;
        let engine = Arc::new(engine);

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.execute_correlation_analysis(tenant_id, None).await })
        };
        // Give the first call a chance to claim the single-flight slot.
        tokio::task::yield_now().await;
        let second = engine.execute_correlation_analysis(tenant_id, None).await;

        assert!(second.is_err());
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn batch_truncates_at_max_events_per_batch() {
        let publisher = Arc::new(RecordingPublisher::default());
        let mut events = Vec::new();
        for i in 0..11 {
            events.push(event(Platform::Slack, &format!("u{i}"), "message_post"));
        }
        let (mut engine, tenant_id) = engine_with_events(events, publisher).await;
        engine.config.max_events_per_batch = 10;

        let (collected, _) = engine.collect(tenant_id, default_time_range()).await;
        assert_eq!(collected.len(), 10);
    }

    #[test]
    fn overall_score_is_zero_with_no_chains() {
        assert_eq!(overall_score(&[]), 0.0);
    }
}
