use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shadowai_connectors::types::ConnectionId;

/// The two secrets a connection's OAuth grant can carry.
/// At most one row per `(ConnectionId, CredentialKind)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    AccessToken,
    RefreshToken,
}

/// A row in `encrypted_credentials`. Ciphertext never leaves the store's
/// decrypt boundary as plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedCredential {
    pub connection_id: ConnectionId,
    pub kind: CredentialKind,
    pub ciphertext: Vec<u8>,
    pub key_id: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The plaintext pair handed to a connector's `authenticate` call. Its
/// lifetime is scoped to a single API call; callers must not persist it
/// themselves.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of `CredentialStore::validate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialHealth {
    pub is_valid: bool,
    pub scopes: Vec<String>,
    pub api_test_results: serde_json::Value,
}
