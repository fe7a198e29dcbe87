use crate::model::{DiscoveredAutomation, RiskScoreHistoryEntry};
use crate::repository::AutomationRepository;
use chrono::Utc;
use shadowai_connectors::types::{ConnectionId, RawAutomation};
use shadowai_core::error::Result;
use shadowai_core::types::TenantId;
use std::sync::Arc;
use tracing::{debug, info};

/// Orchestrates upsert-by-`(connection_id, external_id)`, last-seen
/// advancement and risk-history appends for `DiscoveredAutomation`
///.
pub struct AutomationService {
    repository: Arc<dyn AutomationRepository>,
}

impl AutomationService {
    pub fn new(repository: Arc<dyn AutomationRepository>) -> Self {
        Self { repository }
    }

    /// Upserts one connector-reported automation. Re-discovery of an
    /// already-known `(connection_id, external_id)` refreshes
    /// `name/status/metadata/lastSeen` only and never regresses
    /// `firstSeen`; a never-before-seen pair inserts a new row
    ///.
    pub async fn upsert_discovered(
        &self,
        tenant_id: TenantId,
        connection_id: ConnectionId,
        raw: RawAutomation,
    ) -> Result<DiscoveredAutomation> {
        let now = Utc::now();
        let mut automation = match self
            .repository
            .find_by_external_id(connection_id, &raw.external_id)
            .await?
        {
            Some(mut existing) => {
                debug!(external_id = %raw.external_id, "refreshing previously discovered automation");
                existing.refresh_from_raw(raw, now);
                existing
            }
            None => {
                info!(external_id = %raw.external_id, "discovered new automation");
                DiscoveredAutomation::from_raw(tenant_id, connection_id, raw, now)
            }
        };
        automation.tenant_id = tenant_id;
        self.repository.upsert(&automation).await?;
        Ok(automation)
    }

    /// Marks every automation under a connection not present in
    /// `seen_external_ids` as inactive, without deleting the row
    ///.
    pub async fn deactivate_missing(
        &self,
        connection_id: ConnectionId,
        seen_external_ids: &[String],
    ) -> Result<u32> {
        let now = Utc::now();
        let mut deactivated = 0;
        for mut automation in self.repository.list_by_connection(connection_id).await? {
            if automation.is_active && !seen_external_ids.contains(&automation.external_id) {
                automation.mark_inactive(now);
                self.repository.upsert(&automation).await?;
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }

    /// Appends a `RiskScoreHistory` entry and persists it.
    pub async fn append_risk_history(
        &self,
        mut automation: DiscoveredAutomation,
        entry: RiskScoreHistoryEntry,
    ) -> Result<DiscoveredAutomation> {
        automation.append_risk_history(entry);
        self.repository.upsert(&automation).await?;
        Ok(automation)
    }

    pub async fn list_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<DiscoveredAutomation>> {
        self.repository.list_by_tenant(tenant_id).await
    }

    pub async fn list_by_connection(&self, connection_id: ConnectionId) -> Result<Vec<DiscoveredAutomation>> {
        self.repository.list_by_connection(connection_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AutomationId;
    use crate::repository::InMemoryAutomationRepository;
    use shadowai_connectors::types::AutomationType;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn raw(external_id: &str, name: &str) -> RawAutomation {
        RawAutomation {
            external_id: external_id.to_string(),
            name: name.to_string(),
            automation_type: AutomationType::Integration,
            status: "active".to_string(),
            trigger: Some("oauth".to_string()),
            actions: Vec::new(),
            permissions_required: Vec::new(),
            owner_info: HashMap::new(),
            created_at: None,
            last_modified: None,
            last_triggered: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn running_discovery_twice_yields_one_row_with_advanced_last_seen() {
        let service = AutomationService::new(Arc::new(InMemoryAutomationRepository::default()));
        let tenant_id = TenantId(Uuid::new_v4());
        let connection_id = ConnectionId::new();

        let first = service
            .upsert_discovered(tenant_id, connection_id, raw("abc123", "ChatGPT"))
            .await
            .unwrap();
        let second = service
            .upsert_discovered(tenant_id, connection_id, raw("abc123", "ChatGPT for Google"))
            .await
            .unwrap();

        assert_eq!(first.automation_id, second.automation_id);
        assert_eq!(second.name, "ChatGPT for Google");
        assert!(second.timestamps.last_seen >= first.timestamps.last_seen);
        assert_eq!(service.list_by_connection(connection_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deactivate_missing_flags_automations_absent_from_latest_run() {
        let repo = Arc::new(InMemoryAutomationRepository::default());
        let service = AutomationService::new(repo);
        let tenant_id = TenantId(Uuid::new_v4());
        let connection_id = ConnectionId::new();

        service.upsert_discovered(tenant_id, connection_id, raw("keep", "Keep")).await.unwrap();
        service.upsert_discovered(tenant_id, connection_id, raw("gone", "Gone")).await.unwrap();

        let deactivated = service.deactivate_missing(connection_id, &["keep".to_string()]).await.unwrap();
        assert_eq!(deactivated, 1);

        let all = service.list_by_connection(connection_id).await.unwrap();
        let gone = all.iter().find(|a| a.external_id == "gone").unwrap();
        assert!(!gone.is_active);
        let keep = all.iter().find(|a| a.external_id == "keep").unwrap();
        assert!(keep.is_active);
    }

    #[test]
    fn automation_id_default_is_unique() {
        assert_ne!(AutomationId::default(), AutomationId::default());
    }
}
