//! Durable store for `PlatformConnection`: the
//! tenant-scoped registration of one platform workspace to discover
//! automations inside. Not a numbered spec component on its own —
//! load-bearing state the Discovery Orchestrator reads and mutates.

use async_trait::async_trait;
use shadowai_connectors::types::{ConnectionId, ConnectionStatus, Platform, PlatformConnection};
use shadowai_core::database::DatabasePool;
use shadowai_core::error::Result;
use shadowai_core::types::TenantId;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn upsert(&self, connection: &PlatformConnection) -> Result<()>;
    async fn get(&self, connection_id: ConnectionId) -> Result<Option<PlatformConnection>>;
    async fn list_active_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<PlatformConnection>>;
    async fn list_active(&self) -> Result<Vec<PlatformConnection>>;
    async fn list_tenants(&self) -> Result<Vec<TenantId>>;
    async fn delete(&self, connection_id: ConnectionId) -> Result<()>;

    /// Marks `status=error` with `last_error` set, per the single-discovery
    /// contract's authentication-failure step.
    async fn mark_error(&self, connection_id: ConnectionId, message: String) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryConnectionRepository {
    rows: RwLock<HashMap<ConnectionId, PlatformConnection>>,
}

#[async_trait]
impl ConnectionRepository for InMemoryConnectionRepository {
    async fn upsert(&self, connection: &PlatformConnection) -> Result<()> {
        self.rows.write().unwrap().insert(connection.connection_id, connection.clone());
        Ok(())
    }

    async fn get(&self, connection_id: ConnectionId) -> Result<Option<PlatformConnection>> {
        Ok(self.rows.read().unwrap().get(&connection_id).cloned())
    }

    async fn list_active_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<PlatformConnection>> {
        Ok(self
            .rows
            .read()
            .unwrap()
            .values()
            .filter(|c| c.tenant_id == tenant_id.0 && c.status == ConnectionStatus::Active)
            .cloned()
            .collect())
    }

    async fn list_active(&self) -> Result<Vec<PlatformConnection>> {
        Ok(self
            .rows
            .read()
            .unwrap()
            .values()
            .filter(|c| c.status == ConnectionStatus::Active)
            .cloned()
            .collect())
    }

    async fn list_tenants(&self) -> Result<Vec<TenantId>> {
        let mut tenants: Vec<Uuid> = self
            .rows
            .read()
            .unwrap()
            .values()
            .map(|c| c.tenant_id)
            .collect();
        tenants.sort();
        tenants.dedup();
        Ok(tenants.into_iter().map(TenantId).collect())
    }

    async fn delete(&self, connection_id: ConnectionId) -> Result<()> {
        self.rows.write().unwrap().remove(&connection_id);
        Ok(())
    }

    async fn mark_error(&self, connection_id: ConnectionId, message: String) -> Result<()> {
        if let Some(connection) = self.rows.write().unwrap().get_mut(&connection_id) {
            connection.status = ConnectionStatus::Error;
            connection.last_error = Some(message);
        }
        Ok(())
    }
}

pub struct PostgresConnectionRepository {
    db: DatabasePool,
}

impl PostgresConnectionRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    fn status_str(status: ConnectionStatus) -> &'static str {
        match status {
            ConnectionStatus::Active => "active",
            ConnectionStatus::Inactive => "inactive",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Pending => "pending",
        }
    }

    fn status_from_str(s: &str) -> ConnectionStatus {
        match s {
            "inactive" => ConnectionStatus::Inactive,
            "error" => ConnectionStatus::Error,
            "pending" => ConnectionStatus::Pending,
            _ => ConnectionStatus::Active,
        }
    }

    fn platform_str(platform: Platform) -> &'static str {
        match platform {
            Platform::Slack => "slack",
            Platform::Google => "google",
            Platform::Microsoft => "microsoft",
        }
    }

    fn platform_from_str(s: &str) -> Platform {
        match s {
            "google" => Platform::Google,
            "microsoft" => Platform::Microsoft,
            _ => Platform::Slack,
        }
    }

    fn from_row(row: ConnectionRowTuple) -> PlatformConnection {
        let (
            connection_id,
            tenant_id,
            platform,
            platform_user_id,
            platform_workspace_id,
            display_name,
            status,
            scopes_granted,
            expires_at,
            metadata,
            last_error,
        ) = row;
        PlatformConnection {
            connection_id: ConnectionId(connection_id),
            tenant_id,
            platform: Self::platform_from_str(&platform),
            platform_user_id,
            platform_workspace_id,
            display_name,
            status: Self::status_from_str(&status),
            scopes_granted,
            expires_at,
            metadata: metadata.as_object().map(|m| m.clone().into_iter().collect()).unwrap_or_default(),
            last_error,
        }
    }
}

#[allow(clippy::type_complexity)]
type ConnectionRowTuple = (
    Uuid,
    Uuid,
    String,
    String,
    Option<String>,
    String,
    String,
    Vec<String>,
    Option<chrono::DateTime<chrono::Utc>>,
    serde_json::Value,
    Option<String>,
);

#[async_trait]
impl ConnectionRepository for PostgresConnectionRepository {
    async fn upsert(&self, connection: &PlatformConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_connections
                (connection_id, tenant_id, platform, platform_user_id, platform_workspace_id,
                 display_name, status, scopes_granted, expires_at, metadata, last_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (connection_id) DO UPDATE SET
                platform_workspace_id = EXCLUDED.platform_workspace_id,
                display_name = EXCLUDED.display_name,
                status = EXCLUDED.status,
                scopes_granted = EXCLUDED.scopes_granted,
                expires_at = EXCLUDED.expires_at,
                metadata = EXCLUDED.metadata,
                last_error = EXCLUDED.last_error
            "#,
        )
        .bind(connection.connection_id.0)
        .bind(connection.tenant_id)
        .bind(Self::platform_str(connection.platform))
        .bind(&connection.platform_user_id)
        .bind(&connection.platform_workspace_id)
        .bind(&connection.display_name)
        .bind(Self::status_str(connection.status))
        .bind(&connection.scopes_granted)
        .bind(connection.expires_at)
        .bind(serde_json::to_value(&connection.metadata).unwrap_or_default())
        .bind(&connection.last_error)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn get(&self, connection_id: ConnectionId) -> Result<Option<PlatformConnection>> {
        let row: Option<ConnectionRowTuple> = sqlx::query_as(
            r#"
            SELECT connection_id, tenant_id, platform, platform_user_id, platform_workspace_id,
                   display_name, status, scopes_granted, expires_at, metadata, last_error
            FROM platform_connections WHERE connection_id = $1
            "#,
        )
        .bind(connection_id.0)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(Self::from_row))
    }

    async fn list_active_by_tenant(&self, tenant_id: TenantId) -> Result<Vec<PlatformConnection>> {
        let rows: Vec<ConnectionRowTuple> = sqlx::query_as(
            r#"
            SELECT connection_id, tenant_id, platform, platform_user_id, platform_workspace_id,
                   display_name, status, scopes_granted, expires_at, metadata, last_error
            FROM platform_connections WHERE tenant_id = $1 AND status = 'active'
            "#,
        )
        .bind(tenant_id.0)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Self::from_row).collect())
    }

    async fn list_active(&self) -> Result<Vec<PlatformConnection>> {
        let rows: Vec<ConnectionRowTuple> = sqlx::query_as(
            r#"
            SELECT connection_id, tenant_id, platform, platform_user_id, platform_workspace_id,
                   display_name, status, scopes_granted, expires_at, metadata, last_error
            FROM platform_connections WHERE status = 'active'
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Self::from_row).collect())
    }

    async fn list_tenants(&self) -> Result<Vec<TenantId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT DISTINCT tenant_id FROM platform_connections",
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(|(id,)| TenantId(id)).collect())
    }

    async fn delete(&self, connection_id: ConnectionId) -> Result<()> {
        sqlx::query("DELETE FROM platform_connections WHERE connection_id = $1")
            .bind(connection_id.0)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn mark_error(&self, connection_id: ConnectionId, message: String) -> Result<()> {
        sqlx::query(
            "UPDATE platform_connections SET status = 'error', last_error = $2 WHERE connection_id = $1",
        )
        .bind(connection_id.0)
        .bind(message)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}
