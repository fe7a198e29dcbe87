use crate::model::{AutomationId, AutomationTimestamps, DiscoveredAutomation};
use async_trait::async_trait;
use shadowai_connectors::types::{AutomationType, ConnectionId};
use shadowai_core::database::DatabasePool;
use shadowai_core::error::Result;
use shadowai_core::types::TenantId;
use shadowai_detection::DetectionMetadata;
use uuid::Uuid;

/// Durable persistence for `DiscoveredAutomation` rows, keyed by
/// `(connection_id, external_id)`.
#[async_trait]
pub trait AutomationRepository: Send + Sync {
    async fn upsert(&self, automation: &DiscoveredAutomation) -> Result<()>;
    async fn find_by_external_id(
        &self,
        connection_id: ConnectionId,
        external_id: &str,
    ) -> Result<Option<DiscoveredAutomation>>;
    async fn list_by_connection(&self, connection_id: ConnectionId) -> Result<Vec<DiscoveredAutomation>>;
    async fn list_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<DiscoveredAutomation>>;
    async fn get(&self, automation_id: AutomationId) -> Result<Option<DiscoveredAutomation>>;
}

pub struct PostgresAutomationRepository {
    db: DatabasePool,
}

impl PostgresAutomationRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    fn automation_type_str(t: AutomationType) -> &'static str {
        match t {
            AutomationType::Workflow => "workflow",
            AutomationType::Bot => "bot",
            AutomationType::Integration => "integration",
            AutomationType::Webhook => "webhook",
            AutomationType::ScheduledTask => "scheduled_task",
            AutomationType::Trigger => "trigger",
            AutomationType::Script => "script",
            AutomationType::ServiceAccount => "service_account",
        }
    }

    fn automation_type_from_str(s: &str) -> AutomationType {
        match s {
            "bot" => AutomationType::Bot,
            "integration" => AutomationType::Integration,
            "webhook" => AutomationType::Webhook,
            "scheduled_task" => AutomationType::ScheduledTask,
            "trigger" => AutomationType::Trigger,
            "script" => AutomationType::Script,
            "service_account" => AutomationType::ServiceAccount,
            _ => AutomationType::Workflow,
        }
    }

    fn row_to_automation(row: AutomationRow) -> Result<DiscoveredAutomation> {
        Ok(DiscoveredAutomation {
            automation_id: AutomationId(row.id),
            connection_id: ConnectionId(row.connection_id),
            tenant_id: TenantId(row.tenant_id),
            external_id: row.external_id,
            name: row.name,
            automation_type: Self::automation_type_from_str(&row.automation_type),
            status: row.status,
            trigger: row.trigger,
            actions: serde_json::from_value(row.actions).unwrap_or_default(),
            permissions_required: serde_json::from_value(row.permissions_required).unwrap_or_default(),
            owner_info: serde_json::from_value(row.owner_info).unwrap_or_default(),
            timestamps: AutomationTimestamps {
                created: row.created,
                last_modified: row.last_modified,
                last_triggered: row.last_triggered,
                first_seen: row.first_seen,
                last_seen: row.last_seen,
            },
            metadata: serde_json::from_value(row.metadata).unwrap_or_default(),
            is_active: row.is_active,
            detection_metadata: serde_json::from_value(row.detection_metadata)
                .unwrap_or_else(|_| DetectionMetadata::empty()),
            risk_score_history: serde_json::from_value(row.risk_score_history).unwrap_or_default(),
        })
    }
}

struct AutomationRow {
    id: Uuid,
    connection_id: Uuid,
    tenant_id: Uuid,
    external_id: String,
    name: String,
    automation_type: String,
    status: String,
    trigger: Option<String>,
    actions: serde_json::Value,
    permissions_required: serde_json::Value,
    owner_info: serde_json::Value,
    created: chrono::DateTime<chrono::Utc>,
    last_modified: chrono::DateTime<chrono::Utc>,
    last_triggered: Option<chrono::DateTime<chrono::Utc>>,
    first_seen: chrono::DateTime<chrono::Utc>,
    last_seen: chrono::DateTime<chrono::Utc>,
    metadata: serde_json::Value,
    is_active: bool,
    detection_metadata: serde_json::Value,
    risk_score_history: serde_json::Value,
}

#[async_trait]
impl AutomationRepository for PostgresAutomationRepository {
    async fn upsert(&self, automation: &DiscoveredAutomation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO discovered_automations
                (id, connection_id, tenant_id, external_id, name, automation_type, status, trigger,
                 actions, permissions_required, owner_info, created, last_modified, last_triggered,
                 first_seen, last_seen, metadata, is_active, detection_metadata, risk_score_history)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (connection_id, external_id)
            DO UPDATE SET name = EXCLUDED.name,
                          status = EXCLUDED.status,
                          metadata = EXCLUDED.metadata,
                          last_seen = EXCLUDED.last_seen,
                          first_seen = EXCLUDED.first_seen,
                          last_triggered = EXCLUDED.last_triggered,
                          is_active = EXCLUDED.is_active,
                          detection_metadata = EXCLUDED.detection_metadata,
                          risk_score_history = EXCLUDED.risk_score_history,
                          last_modified = EXCLUDED.last_modified
            "#,
        )
        .bind(automation.automation_id.0)
        .bind(automation.connection_id.0)
        .bind(automation.tenant_id.0)
        .bind(&automation.external_id)
        .bind(&automation.name)
        .bind(Self::automation_type_str(automation.automation_type))
        .bind(&automation.status)
        .bind(&automation.trigger)
        .bind(serde_json::to_value(&automation.actions).unwrap_or_default())
        .bind(serde_json::to_value(&automation.permissions_required).unwrap_or_default())
        .bind(serde_json::to_value(&automation.owner_info).unwrap_or_default())
        .bind(automation.timestamps.created)
        .bind(automation.timestamps.last_modified)
        .bind(automation.timestamps.last_triggered)
        .bind(automation.timestamps.first_seen)
        .bind(automation.timestamps.last_seen)
        .bind(serde_json::to_value(&automation.metadata).unwrap_or_default())
        .bind(automation.is_active)
        .bind(serde_json::to_value(&automation.detection_metadata).unwrap_or_default())
        .bind(serde_json::to_value(&automation.risk_score_history).unwrap_or_default())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn find_by_external_id(
        &self,
        connection_id: ConnectionId,
        external_id: &str,
    ) -> Result<Option<DiscoveredAutomation>> {
        let row: Option<AutomationRowTuple> = sqlx::query_as(
            r#"
            SELECT id, connection_id, tenant_id, external_id, name, automation_type, status, trigger,
                   actions, permissions_required, owner_info, created, last_modified, last_triggered,
                   first_seen, last_seen, metadata, is_active, detection_metadata, risk_score_history
            FROM discovered_automations
            WHERE connection_id = $1 AND external_id = $2
            "#,
        )
        .bind(connection_id.0)
        .bind(external_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|r| Self::row_to_automation(r.into())).transpose()
    }

    async fn list_by_connection(&self, connection_id: ConnectionId) -> Result<Vec<DiscoveredAutomation>> {
        let rows: Vec<AutomationRowTuple> = sqlx::query_as(
            r#"
            SELECT id, connection_id, tenant_id, external_id, name, automation_type, status, trigger,
                   actions, permissions_required, owner_info, created, last_modified, last_triggered,
                   first_seen, last_seen, metadata, is_active, detection_metadata, risk_score_history
            FROM discovered_automations
            WHERE connection_id = $1
            "#,
        )
        .bind(connection_id.0)
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(|r| Self::row_to_automation(r.into())).collect()
    }

    async fn list_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<DiscoveredAutomation>> {
        let rows: Vec<AutomationRowTuple> = sqlx::query_as(
            r#"
            SELECT id, connection_id, tenant_id, external_id, name, automation_type, status, trigger,
                   actions, permissions_required, owner_info, created, last_modified, last_triggered,
                   first_seen, last_seen, metadata, is_active, detection_metadata, risk_score_history
            FROM discovered_automations
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.0)
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter().map(|r| Self::row_to_automation(r.into())).collect()
    }

    async fn get(&self, automation_id: AutomationId) -> Result<Option<DiscoveredAutomation>> {
        let row: Option<AutomationRowTuple> = sqlx::query_as(
            r#"
            SELECT id, connection_id, tenant_id, external_id, name, automation_type, status, trigger,
                   actions, permissions_required, owner_info, created, last_modified, last_triggered,
                   first_seen, last_seen, metadata, is_active, detection_metadata, risk_score_history
            FROM discovered_automations
            WHERE id = $1
            "#,
        )
        .bind(automation_id.0)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(|r| Self::row_to_automation(r.into())).transpose()
    }
}

#[allow(clippy::type_complexity)]
#[derive(sqlx::FromRow)]
struct AutomationRowTuple {
    id: Uuid,
    connection_id: Uuid,
    tenant_id: Uuid,
    external_id: String,
    name: String,
    automation_type: String,
    status: String,
    trigger: Option<String>,
    actions: serde_json::Value,
    permissions_required: serde_json::Value,
    owner_info: serde_json::Value,
    created: chrono::DateTime<chrono::Utc>,
    last_modified: chrono::DateTime<chrono::Utc>,
    last_triggered: Option<chrono::DateTime<chrono::Utc>>,
    first_seen: chrono::DateTime<chrono::Utc>,
    last_seen: chrono::DateTime<chrono::Utc>,
    metadata: serde_json::Value,
    is_active: bool,
    detection_metadata: serde_json::Value,
    risk_score_history: serde_json::Value,
}

impl From<AutomationRowTuple> for AutomationRow {
    fn from(r: AutomationRowTuple) -> Self {
        Self {
            id: r.id,
            connection_id: r.connection_id,
            tenant_id: r.tenant_id,
            external_id: r.external_id,
            name: r.name,
            automation_type: r.automation_type,
            status: r.status,
            trigger: r.trigger,
            actions: r.actions,
            permissions_required: r.permissions_required,
            owner_info: r.owner_info,
            created: r.created,
            last_modified: r.last_modified,
            last_triggered: r.last_triggered,
            first_seen: r.first_seen,
            last_seen: r.last_seen,
            metadata: r.metadata,
            is_active: r.is_active,
            detection_metadata: r.detection_metadata,
            risk_score_history: r.risk_score_history,
        }
    }
}

/// In-memory fake used by `AutomationService` unit tests and by other
/// crates' tests that need an `AutomationRepository` without a database.
#[derive(Default)]
pub struct InMemoryAutomationRepository {
    rows: std::sync::Mutex<Vec<DiscoveredAutomation>>,
}

#[async_trait]
impl AutomationRepository for InMemoryAutomationRepository {
    async fn upsert(&self, automation: &DiscoveredAutomation) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(existing) = rows.iter_mut().find(|a| a.automation_id == automation.automation_id) {
            *existing = automation.clone();
        } else {
            rows.push(automation.clone());
        }
        Ok(())
    }

    async fn find_by_external_id(
        &self,
        connection_id: ConnectionId,
        external_id: &str,
    ) -> Result<Option<DiscoveredAutomation>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.connection_id == connection_id && a.external_id == external_id)
            .cloned())
    }

    async fn list_by_connection(&self, connection_id: ConnectionId) -> Result<Vec<DiscoveredAutomation>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.connection_id == connection_id)
            .cloned()
            .collect())
    }

    async fn list_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<DiscoveredAutomation>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn get(&self, automation_id: AutomationId) -> Result<Option<DiscoveredAutomation>> {
        Ok(self.rows.lock().unwrap().iter().find(|a| a.automation_id == automation_id).cloned())
    }
}
