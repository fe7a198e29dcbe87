use crate::models::{CredentialKind, EncryptedCredential};
use async_trait::async_trait;
use shadowai_connectors::types::ConnectionId;
use shadowai_core::database::DatabasePool;
use shadowai_core::error::Result;
use uuid::Uuid;

/// Durable persistence for `EncryptedCredential` rows. Upsert key is
/// `(connection_id, kind)`.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn upsert(&self, credential: &EncryptedCredential) -> Result<()>;
    async fn get(
        &self,
        connection_id: ConnectionId,
        kind: CredentialKind,
    ) -> Result<Option<EncryptedCredential>>;
    async fn delete_all(&self, connection_id: ConnectionId) -> Result<()>;
}

pub struct PostgresCredentialRepository {
    db: DatabasePool,
}

impl PostgresCredentialRepository {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    fn kind_str(kind: CredentialKind) -> &'static str {
        match kind {
            CredentialKind::AccessToken => "access_token",
            CredentialKind::RefreshToken => "refresh_token",
        }
    }

    fn kind_from_str(s: &str) -> CredentialKind {
        match s {
            "refresh_token" => CredentialKind::RefreshToken,
            _ => CredentialKind::AccessToken,
        }
    }
}

#[async_trait]
impl CredentialRepository for PostgresCredentialRepository {
    async fn upsert(&self, credential: &EncryptedCredential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO encrypted_credentials (connection_id, kind, ciphertext, key_id, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (connection_id, kind)
            DO UPDATE SET ciphertext = EXCLUDED.ciphertext,
                          key_id = EXCLUDED.key_id,
                          expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(credential.connection_id.0)
        .bind(Self::kind_str(credential.kind))
        .bind(&credential.ciphertext)
        .bind(&credential.key_id)
        .bind(credential.expires_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn get(
        &self,
        connection_id: ConnectionId,
        kind: CredentialKind,
    ) -> Result<Option<EncryptedCredential>> {
        let row: Option<(Uuid, String, Vec<u8>, String, Option<chrono::DateTime<chrono::Utc>>)> =
            sqlx::query_as(
                r#"
                SELECT connection_id, kind, ciphertext, key_id, expires_at
                FROM encrypted_credentials
                WHERE connection_id = $1 AND kind = $2
                "#,
            )
            .bind(connection_id.0)
            .bind(Self::kind_str(kind))
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.map(|(cid, kind, ciphertext, key_id, expires_at)| EncryptedCredential {
            connection_id: ConnectionId(cid),
            kind: Self::kind_from_str(&kind),
            ciphertext,
            key_id,
            expires_at,
        }))
    }

    async fn delete_all(&self, connection_id: ConnectionId) -> Result<()> {
        sqlx::query("DELETE FROM encrypted_credentials WHERE connection_id = $1")
            .bind(connection_id.0)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }
}
