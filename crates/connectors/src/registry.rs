use crate::connector::PlatformConnector;
use crate::types::Platform;
use dashmap::DashMap;
use shadowai_core::error::{Error, Result};
use std::sync::Arc;

/// Process-wide `Platform -> Arc<dyn PlatformConnector>` map, constructed
/// once at process start. Connectors are stateless between calls
/// (credentials are passed per-call, not held), so one instance per
/// platform is shared across every tenant/connection.
///
/// Grounded on `shadowai_core::database::DatabasePool`'s cached-pool
/// pattern, generalized from a tenant-keyed `DashMap` to a
/// platform-keyed one.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: Arc<DashMap<Platform, Arc<dyn PlatformConnector>>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: Arc::new(DashMap::new()),
        }
    }

    pub fn register(&self, connector: Arc<dyn PlatformConnector>) {
        self.connectors.insert(connector.platform(), connector);
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn PlatformConnector>> {
        self.connectors
            .get(&platform)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::not_found(format!("no connector registered for {platform}")))
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.connectors.iter().map(|entry| *entry.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::TimeRange;
    use crate::types::{AuditEntry, PermissionValidation, PlatformEvent, RawAutomation};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use futures::stream::BoxStream;

    struct StubConnector(Platform);

    #[async_trait]
    impl PlatformConnector for StubConnector {
        fn platform(&self) -> Platform {
            self.0
        }

        fn rate_limit_per_minute(&self) -> u32 {
            60
        }

        async fn authenticate(&self, _access_token: &str) -> Result<()> {
            Ok(())
        }

        async fn discover_automations(&self) -> Result<Vec<RawAutomation>> {
            Ok(Vec::new())
        }

        async fn get_audit_logs(&self, _since: DateTime<Utc>) -> Result<Vec<AuditEntry>> {
            Ok(Vec::new())
        }

        async fn validate_permissions(&self) -> Result<PermissionValidation> {
            Ok(PermissionValidation::default())
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

    #[test]
    fn registers_and_resolves_by_platform() {
        let registry = ConnectorRegistry::new();
        registry.register(Arc::new(StubConnector(Platform::Slack)));

        assert!(registry.get(Platform::Slack).is_ok());
        assert!(registry.get(Platform::Google).is_err());
    }
}
