use crate::models::{CredentialHealth, CredentialKind, EncryptedCredential, OAuthCredentials};
use crate::repository::CredentialRepository;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use shadowai_connectors::connector::PlatformConnector;
use shadowai_connectors::registry::ConnectorRegistry;
use shadowai_connectors::types::{ConnectionId, Platform};
use shadowai_core::security::EncryptionService;
use shadowai_core::error::{Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Issuer-side token refresh, injected so the store stays platform-agnostic
///.
#[async_trait::async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn refresh(
        &self,
        platform: Platform,
        refresh_token: &str,
    ) -> Result<OAuthCredentials>;

    /// Best-effort revoke call to the platform's OAuth revoke endpoint.
    async fn revoke(&self, platform: Platform, access_token: &str) -> Result<()>;
}

const REFRESH_SKEW: Duration = Duration::minutes(5);

/// C2 Credential Store: encrypt-at-rest OAuth credential
/// lifecycle with a memory cache layered over a durable repository,
/// generalized from end-user session tokens to per-connection OAuth
/// tokens.
pub struct CredentialStore {
    repository: Arc<dyn CredentialRepository>,
    encryption: Arc<EncryptionService>,
    issuer: Arc<dyn TokenIssuer>,
    connectors: ConnectorRegistry,
    cache: Arc<DashMap<ConnectionId, OAuthCredentials>>,
    /// One mutex per connection guards `refresh_if_needed`: concurrent
    /// callers observe the same refreshed credential rather than racing the issuer.
    refresh_locks: Arc<DashMap<ConnectionId, Arc<Mutex<()>>>>,
    platform_by_connection: Arc<DashMap<ConnectionId, Platform>>,
}

impl CredentialStore {
    pub fn new(
        repository: Arc<dyn CredentialRepository>,
        encryption: Arc<EncryptionService>,
        issuer: Arc<dyn TokenIssuer>,
        connectors: ConnectorRegistry,
    ) -> Self {
        Self {
            repository,
            encryption,
            issuer,
            connectors,
            cache: Arc::new(DashMap::new()),
            refresh_locks: Arc::new(DashMap::new()),
            platform_by_connection: Arc::new(DashMap::new()),
        }
    }

    fn lock_for(&self, connection_id: ConnectionId) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(connection_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Encrypts `credentials` and writes both access and (if present)
    /// refresh token rows to the durable store, then hydrates the cache.
    /// Durable is authoritative; a cache-write failure is logged but not
    /// fatal.
    pub async fn store(
        &self,
        connection_id: ConnectionId,
        platform: Platform,
        credentials: OAuthCredentials,
    ) -> Result<()> {
        self.write_row(connection_id, CredentialKind::AccessToken, &credentials.access_token, credentials.expires_at)
            .await?;
        if let Some(refresh) = &credentials.refresh_token {
            self.write_row(connection_id, CredentialKind::RefreshToken, refresh, None)
                .await?;
        }

        self.platform_by_connection.insert(connection_id, platform);
        self.cache.insert(connection_id, credentials);
        Ok(())
    }

    async fn write_row(
        &self,
        connection_id: ConnectionId,
        kind: CredentialKind,
        plaintext: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let ciphertext = self.encryption.encrypt(plaintext.as_bytes())?;
        self.repository
            .upsert(&EncryptedCredential {
                connection_id,
                kind,
                ciphertext,
                key_id: "primary".to_string(),
                expires_at,
            })
            .await
    }

    /// Cache-then-durable read; on a durable hit the cache is hydrated.
    pub async fn get(&self, connection_id: ConnectionId) -> Result<Option<OAuthCredentials>> {
        if let Some(cached) = self.cache.get(&connection_id) {
            return Ok(Some(cached.clone()));
        }

        let Some(access_row) = self.repository.get(connection_id, CredentialKind::AccessToken).await? else {
            return Ok(None);
        };
        let refresh_row = self.repository.get(connection_id, CredentialKind::RefreshToken).await?;

        let access_token = self.encryption.decrypt(&access_row.ciphertext)?;
        let refresh_token = match refresh_row {
            Some(row) => Some(String::from_utf8(self.encryption.decrypt(&row.ciphertext)?)
                .map_err(|e| Error::new(shadowai_core::error::ErrorCode::DecryptionError, e.to_string()))?),
            None => None,
        };

        let credentials = OAuthCredentials {
            access_token: String::from_utf8(access_token)
                .map_err(|e| Error::new(shadowai_core::error::ErrorCode::DecryptionError, e.to_string()))?,
            refresh_token,
            expires_at: access_row.expires_at,
        };

        self.cache.insert(connection_id, credentials.clone());
        Ok(Some(credentials))
    }

    /// Refreshes when `expires_at - now < 5min`. Rotates the refresh
    /// token if the issuer returns a new one. Persists before returning
    /// `true`. At most one inflight refresh per connection.
    pub async fn refresh_if_needed(&self, connection_id: ConnectionId) -> Result<bool> {
        let lock = self.lock_for(connection_id);
        let _guard = lock.lock().await;

        let Some(current) = self.get(connection_id).await? else {
            return Err(Error::not_found(format!(
                "no credentials stored for connection {connection_id}"
            )));
        };

        let needs_refresh = match current.expires_at {
            Some(expires_at) => expires_at - Utc::now() < REFRESH_SKEW,
            None => false,
        };
        if !needs_refresh {
            return Ok(false);
        }

        let Some(refresh_token) = &current.refresh_token else {
            return Err(Error::unauthorized(format!(
                "connection {connection_id} has no refresh token"
            )));
        };

        let platform = self
            .platform_by_connection
            .get(&connection_id)
            .map(|p| *p)
            .ok_or_else(|| Error::not_found(format!("unknown platform for connection {connection_id}")))?;

        let refreshed = self.issuer.refresh(platform, refresh_token).await?;
        info!(%connection_id, "refreshed oauth credentials");

        let next = OAuthCredentials {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token.or_else(|| current.refresh_token.clone()),
            expires_at: refreshed.expires_at,
        };
        self.store(connection_id, platform, next).await?;
        Ok(true)
    }

    /// Deletes all credential rows, drops the cache entry, and
    /// best-effort notifies the platform's revoke endpoint.
    pub async fn revoke(&self, connection_id: ConnectionId) -> Result<()> {
        let platform = self.platform_by_connection.get(&connection_id).map(|p| *p);
        if let Some(credentials) = self.cache.get(&connection_id) {
            if let Some(platform) = platform {
                if let Err(error) = self.issuer.revoke(platform, &credentials.access_token).await {
                    warn!(%connection_id, %error, "best-effort revoke call failed");
                }
            }
        }

        self.repository.delete_all(connection_id).await?;
        self.cache.remove(&connection_id);
        Ok(())
    }

    /// Validates current credentials against the platform connector,
    /// returning granted scopes and a connector-level health probe.
    pub async fn validate(&self, connection_id: ConnectionId) -> Result<CredentialHealth> {
        let Some(credentials) = self.get(connection_id).await? else {
            return Ok(CredentialHealth::default());
        };
        let Some(platform) = self.platform_by_connection.get(&connection_id).map(|p| *p) else {
            return Ok(CredentialHealth::default());
        };

        let connector = self.connectors.get(platform)?;
        connector.authenticate(&credentials.access_token).await?;
        let validation = connector.validate_permissions().await?;

        Ok(CredentialHealth {
            is_valid: validation.valid,
            scopes: validation.granted,
            api_test_results: serde_json::json!({ "errors": validation.errors }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowai_core::config::SecurityConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Default)]
    struct InMemoryRepo {
        rows: TokioMutex<Vec<EncryptedCredential>>,
    }

    #[async_trait::async_trait]
    impl CredentialRepository for InMemoryRepo {
        async fn upsert(&self, credential: &EncryptedCredential) -> Result<()> {
            let mut rows = self.rows.lock().await;
            rows.retain(|r| !(r.connection_id == credential.connection_id && r.kind == credential.kind));
            rows.push(credential.clone());
            Ok(())
        }

        async fn get(
            &self,
            connection_id: ConnectionId,
            kind: CredentialKind,
        ) -> Result<Option<EncryptedCredential>> {
            let rows = self.rows.lock().await;
            Ok(rows
                .iter()
                .find(|r| r.connection_id == connection_id && r.kind == kind)
                .cloned())
        }

        async fn delete_all(&self, connection_id: ConnectionId) -> Result<()> {
            let mut rows = self.rows.lock().await;
            rows.retain(|r| r.connection_id != connection_id);
            Ok(())
        }
    }

    struct CountingIssuer {
        refresh_calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TokenIssuer for CountingIssuer {
        async fn refresh(&self, _platform: Platform, _refresh_token: &str) -> Result<OAuthCredentials> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            Ok(OAuthCredentials {
                access_token: "new-access".to_string(),
                refresh_token: Some("new-refresh".to_string()),
                expires_at: Some(Utc::now() + Duration::hours(1)),
            })
        }

        async fn revoke(&self, _platform: Platform, _access_token: &str) -> Result<()> {
            Ok(())
        }
    }

    fn encryption() -> Arc<EncryptionService> {
        Arc::new(
            EncryptionService::new(&SecurityConfig {
                aes_encryption_key: "0".repeat(32),
            })
            .unwrap(),
        )
    }

    fn store_with(issuer: Arc<dyn TokenIssuer>) -> CredentialStore {
        CredentialStore::new(
            Arc::new(InMemoryRepo::default()),
            encryption(),
            issuer,
            ConnectorRegistry::new(),
        )
    }

    #[tokio::test]
    async fn store_then_get_round_trips_plaintext() {
        let store = store_with(Arc::new(CountingIssuer { refresh_calls: AtomicUsize::new(0) }));
        let connection_id = ConnectionId::new();
        store
            .store(
                connection_id,
                Platform::Slack,
                OAuthCredentials {
                    access_token: "abc".to_string(),
                    refresh_token: Some("def".to_string()),
                    expires_at: Some(Utc::now() + Duration::hours(1)),
                },
            )
            .await
            .unwrap();

        let fetched = store.get(connection_id).await.unwrap().unwrap();
        assert_eq!(fetched.access_token, "abc");
        assert_eq!(fetched.refresh_token.as_deref(), Some("def"));
    }

    #[tokio::test]
    async fn refresh_if_needed_is_noop_when_far_from_expiry() {
        let store = store_with(Arc::new(CountingIssuer { refresh_calls: AtomicUsize::new(0) }));
        let connection_id = ConnectionId::new();
        store
            .store(
                connection_id,
                Platform::Slack,
                OAuthCredentials {
                    access_token: "abc".to_string(),
                    refresh_token: Some("def".to_string()),
                    expires_at: Some(Utc::now() + Duration::hours(1)),
                },
            )
            .await
            .unwrap();

        assert!(!store.refresh_if_needed(connection_id).await.unwrap());
    }

    #[tokio::test]
    async fn refresh_if_needed_rotates_token_near_expiry() {
        let store = store_with(Arc::new(CountingIssuer { refresh_calls: AtomicUsize::new(0) }));
        let connection_id = ConnectionId::new();
        store
            .store(
                connection_id,
                Platform::Slack,
                OAuthCredentials {
                    access_token: "abc".to_string(),
                    refresh_token: Some("def".to_string()),
                    expires_at: Some(Utc::now() + Duration::minutes(1)),
                },
            )
            .await
            .unwrap();

        assert!(store.refresh_if_needed(connection_id).await.unwrap());
        let fetched = store.get(connection_id).await.unwrap().unwrap();
        assert_eq!(fetched.access_token, "new-access");
    }

    #[tokio::test]
    async fn revoke_removes_cache_and_durable_rows() {
        let store = store_with(Arc::new(CountingIssuer { refresh_calls: AtomicUsize::new(0) }));
        let connection_id = ConnectionId::new();
        store
            .store(
                connection_id,
                Platform::Slack,
                OAuthCredentials {
                    access_token: "abc".to_string(),
                    refresh_token: None,
                    expires_at: None,
                },
            )
            .await
            .unwrap();

        store.revoke(connection_id).await.unwrap();
        assert!(store.get(connection_id).await.unwrap().is_none());
    }
}
