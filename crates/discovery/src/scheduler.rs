//! Per-tenant discovery scheduler: a
//! long-lived tokio task with a monotonic `tokio::time::interval`
//! ticker per tenant, registered/unregistered as tenants appear or
//! disappear from the durable connection store.
//!
//! The distillation's orchestrator assumes a fixed tenant set; a real
//! deployment must react to tenant churn, so a lightweight tenant-list
//! poll adds/removes tickers for tenants discovered at startup and
//! afterwards.

use crate::connection::ConnectionRepository;
use crate::orchestrator::{DiscoveryConfig, DiscoveryOrchestrator};
use dashmap::DashMap;
use shadowai_core::types::TenantId;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How often the scheduler re-polls the connection store for tenants
/// that have appeared or disappeared since the last poll.
const TENANT_POLL_INTERVAL: Duration = Duration::from_secs(60);

pub struct DiscoveryScheduler {
    orchestrator: Arc<DiscoveryOrchestrator>,
    connections: Arc<dyn ConnectionRepository>,
    interval: Duration,
    fan_out_concurrency: usize,
    tickers: Arc<DashMap<TenantId, JoinHandle<()>>>,
}

impl DiscoveryScheduler {
    pub fn new(
        orchestrator: Arc<DiscoveryOrchestrator>,
        connections: Arc<dyn ConnectionRepository>,
        interval_hours: u32,
        fan_out_concurrency: usize,
    ) -> Self {
        Self {
            orchestrator,
            connections,
            interval: Duration::from_secs(u64::from(interval_hours) * 3600),
            fan_out_concurrency,
            tickers: Arc::new(DashMap::new()),
        }
    }

    /// Spawns the tenant-registry poll loop. The returned handle governs
    /// the poll loop itself; individual per-tenant tickers are tracked
    /// internally and abort when a tenant disappears.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TENANT_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(error) = self.reconcile_tenants().await {
                    error!(%error, "failed to reconcile tenant discovery tickers");
                }
            }
        })
    }

    async fn reconcile_tenants(&self) -> shadowai_core::error::Result<()> {
        let tenants = self.connections.list_tenants().await?;
        let current: std::collections::HashSet<TenantId> = tenants.iter().copied().collect();

        for tenant_id in &tenants {
            if !self.tickers.contains_key(tenant_id) {
                info!(tenant_id = %tenant_id.0, "registering discovery ticker for newly seen tenant");
                let handle = self.spawn_tenant_ticker(*tenant_id);
                self.tickers.insert(*tenant_id, handle);
            }
        }

        let stale: Vec<TenantId> = self
            .tickers
            .iter()
            .map(|entry| *entry.key())
            .filter(|tenant_id| !current.contains(tenant_id))
            .collect();
        for tenant_id in stale {
            if let Some((_, handle)) = self.tickers.remove(&tenant_id) {
                warn!(tenant_id = %tenant_id.0, "tenant no longer has any connections, stopping discovery ticker");
                handle.abort();
            }
        }

        Ok(())
    }

    fn spawn_tenant_ticker(&self, tenant_id: TenantId) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let interval = self.interval;
        let config = DiscoveryConfig { fan_out_concurrency: self.fan_out_concurrency };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match orchestrator.run_discovery_for_tenant(tenant_id, &config).await {
                    Ok(summary) => info!(
                        tenant_id = %tenant_id.0,
                        attempted = summary.connections_attempted,
                        succeeded = summary.connections_succeeded,
                        "scheduled discovery run completed"
                    ),
                    Err(error) => error!(tenant_id = %tenant_id.0, %error, "scheduled discovery run failed"),
                }
            }
        })
    }
}
