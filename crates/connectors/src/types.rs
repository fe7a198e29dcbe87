use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// The three SaaS platforms this workspace discovers automations inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Slack,
    Google,
    Microsoft,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Slack => write!(f, "slack"),
            Platform::Google => write!(f, "google"),
            Platform::Microsoft => write!(f, "microsoft"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Active,
    Inactive,
    Error,
    Pending,
}

/// A tenant's authorization to pull data from one platform workspace/user.
///
/// Invariant: a tenant has at most one active connection per
/// `(platform, platform_user_id)`; `status == Active` implies `expires_at`
/// is either absent or still in the future.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConnection {
    pub connection_id: ConnectionId,
    pub tenant_id: Uuid,
    pub platform: Platform,
    pub platform_user_id: String,
    pub platform_workspace_id: Option<String>,
    pub display_name: String,
    pub status: ConnectionStatus,
    pub scopes_granted: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub last_error: Option<String>,
}

impl PlatformConnection {
    pub fn is_valid(&self) -> bool {
        match (self.status, self.expires_at) {
            (ConnectionStatus::Active, Some(expires_at)) => expires_at > Utc::now(),
            (ConnectionStatus::Active, None) => true,
            _ => false,
        }
    }
}

/// Normalized event shape used across all three platforms. `event_type` stays a
/// string at the wire layer; detectors switch on it rather than on a
/// closed Rust enum so new platform event types don't require a schema
/// migration across every connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    pub event_id: String,
    pub platform: Platform,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub user_email: Option<String>,
    pub event_type: String,
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub action_details: ActionDetails,
    pub ip_address: Option<String>,
    pub correlation_metadata: CorrelationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDetails {
    pub action: String,
    pub resource_name: Option<String>,
    pub additional_metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationMetadata {
    pub potential_trigger: bool,
    pub potential_action: bool,
    pub external_data_access: bool,
    pub automation_indicators: Vec<String>,
}

/// One automation as reported directly by a connector, before the
/// Discovery Orchestrator upserts it into the `discovered_automations`
/// table (see `shadowai-automations::DiscoveredAutomation`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAutomation {
    pub external_id: String,
    pub name: String,
    pub automation_type: AutomationType,
    pub status: String,
    pub trigger: Option<String>,
    pub actions: Vec<String>,
    pub permissions_required: Vec<String>,
    pub owner_info: HashMap<String, serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub last_triggered: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationType {
    Workflow,
    Bot,
    Integration,
    Webhook,
    ScheduledTask,
    Trigger,
    Script,
    ServiceAccount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_time: DateTime<Utc>,
    pub actor_email: Option<String>,
    pub application_name: Option<String>,
    pub event_name: String,
    pub parameters: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionValidation {
    pub valid: bool,
    pub granted: Vec<String>,
    pub missing: Vec<String>,
    pub errors: Vec<String>,
}
