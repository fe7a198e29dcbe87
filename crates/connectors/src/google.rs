use crate::connector::{rate_limit_pause, PlatformConnector, TimeRange};
use crate::fingerprint::match_ai_provider;
use crate::types::{
    ActionDetails, AuditEntry, AutomationType, CorrelationMetadata, PermissionValidation,
    Platform, PlatformEvent, RawAutomation,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::BoxStream;
use reqwest::Client;
use shadowai_core::error::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;

const GOOGLE_API_BASE: &str = "https://www.googleapis.com";
const SCRIPT_MIME_TYPE: &str = "application/vnd.google-apps.script";
const SERVICE_ACCOUNT_SUFFIX: &str = ".iam.gserviceaccount.com";
const OAUTH_APP_WINDOW_DAYS: i64 = 180;

/// Google Workspace connector. `discover_automations` composes the four
/// sub-discoveries: Apps Script projects,
/// Service Accounts (derived from audit-log token-authorize events),
/// OAuth-authorized applications, and email automations (filters/
/// forwarding).
pub struct GoogleConnector {
    http: Client,
    access_token: RwLock<Option<String>>,
}

impl GoogleConnector {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            access_token: RwLock::new(None),
        }
    }

    fn token(&self) -> Result<String> {
        self.access_token
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::unauthorized("Google connector has no access token"))
    }

    /// Apps Script projects: list files of the script MIME type, then
    /// fetch content for ones we're authorized to read.
    async fn discover_apps_script(&self) -> Result<Vec<RawAutomation>> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!("{GOOGLE_API_BASE}/drive/v3/files"))
            .bearer_auth(&token)
            .query(&[("q", format!("mimeType='{SCRIPT_MIME_TYPE}'"))])
            .send()
            .await
            .map_err(|e| Error::transient(format!("Drive files.list failed: {e}")))?;

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::transient(format!("Drive response decode failed: {e}")))?;

        let files = body
            .get("files")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut automations = Vec::with_capacity(files.len());
        for file in files {
            rate_limit_pause().await;
            let Some(file_id) = file.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            let name = file
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("untitled script")
                .to_string();

            automations.push(RawAutomation {
                external_id: file_id.to_string(),
                name,
                automation_type: AutomationType::Script,
                status: "active".to_string(),
                trigger: Some("scheduled_or_manual".to_string()),
                actions: Vec::new(),
                permissions_required: Vec::new(),
                owner_info: HashMap::new(),
                created_at: None,
                last_modified: None,
                last_triggered: None,
                metadata: HashMap::new(),
            });
        }
        Ok(automations)
    }

    /// Service accounts inferred from audit-log `authorize` events where
    /// the actor's domain matches the service-account suffix.
    async fn discover_service_accounts(&self, audit_entries: &[AuditEntry]) -> Vec<RawAutomation> {
        audit_entries
            .iter()
            .filter(|e| {
                e.actor_email
                    .as_deref()
                    .is_some_and(|email| email.ends_with(SERVICE_ACCOUNT_SUFFIX))
            })
            .map(|e| RawAutomation {
                external_id: e.actor_email.clone().unwrap_or_default(),
                name: e.actor_email.clone().unwrap_or_default(),
                automation_type: AutomationType::ServiceAccount,
                status: "active".to_string(),
                trigger: Some("api_call".to_string()),
                actions: vec![e.event_name.clone()],
                permissions_required: Vec::new(),
                owner_info: HashMap::new(),
                created_at: Some(e.event_time),
                last_modified: Some(e.event_time),
                last_triggered: Some(e.event_time),
                metadata: HashMap::new(),
            })
            .collect()
    }

    /// OAuth-authorized applications, keyed by `client_id`, aggregating
    /// scopes and first/last-seen over a 180-day window of `login`/
    /// `token` audit applications.
    async fn discover_oauth_apps(&self, audit_entries: &[AuditEntry]) -> Vec<RawAutomation> {
        let cutoff = Utc::now() - Duration::days(OAUTH_APP_WINDOW_DAYS);

        struct Aggregate {
            app_name: String,
            scopes: Vec<String>,
            first_seen: DateTime<Utc>,
            last_seen: DateTime<Utc>,
            authorizer: Option<String>,
        }

        let mut by_client_id: HashMap<String, Aggregate> = HashMap::new();

        for entry in audit_entries.iter().filter(|e| e.event_time >= cutoff) {
            if !matches!(entry.event_name.as_str(), "authorize" | "login" | "token") {
                continue;
            }
            let Some(client_id) = entry
                .parameters
                .get("client_id")
                .and_then(|v| v.as_str())
                .map(String::from)
            else {
                continue;
            };
            let app_name = entry
                .parameters
                .get("app_name")
                .and_then(|v| v.as_str())
                .unwrap_or(&client_id)
                .to_string();
            let scopes: Vec<String> = entry
                .parameters
                .get("scopes")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|s| s.as_str().map(String::from)).collect())
                .unwrap_or_default();

            by_client_id
                .entry(client_id)
                .and_modify(|agg| {
                    agg.first_seen = agg.first_seen.min(entry.event_time);
                    agg.last_seen = agg.last_seen.max(entry.event_time);
                    for scope in &scopes {
                        if !agg.scopes.contains(scope) {
                            agg.scopes.push(scope.clone());
                        }
                    }
                })
                .or_insert(Aggregate {
                    app_name,
                    scopes,
                    first_seen: entry.event_time,
                    last_seen: entry.event_time,
                    authorizer: entry.actor_email.clone(),
                });
        }

        by_client_id
            .into_iter()
            .map(|(client_id, agg)| {
                let mut metadata = HashMap::new();
                metadata.insert(
                    "scopesGranted".to_string(),
                    serde_json::Value::Array(
                        agg.scopes.iter().cloned().map(serde_json::Value::String).collect(),
                    ),
                );
                if let Some(provider) = match_ai_provider(&agg.app_name).or_else(|| match_ai_provider(&client_id)) {
                    metadata.insert("isAIPlatform".to_string(), serde_json::Value::Bool(true));
                    metadata.insert(
                        "platformName".to_string(),
                        serde_json::Value::String(provider.to_string()),
                    );
                }
                let mut owner_info = HashMap::new();
                if let Some(authorizer) = agg.authorizer {
                    owner_info.insert("authorizedBy".to_string(), serde_json::Value::String(authorizer));
                }

                RawAutomation {
                    external_id: client_id,
                    name: agg.app_name,
                    automation_type: AutomationType::Integration,
                    status: "active".to_string(),
                    trigger: Some("oauth".to_string()),
                    actions: Vec::new(),
                    permissions_required: agg.scopes,
                    owner_info,
                    created_at: Some(agg.first_seen),
                    last_modified: Some(agg.last_seen),
                    last_triggered: Some(agg.last_seen),
                    metadata,
                }
            })
            .collect()
    }

    /// Email automations: filters and forwarding rules on the Gmail
    /// account in scope.
    async fn discover_email_automations(&self) -> Result<Vec<RawAutomation>> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!("{GOOGLE_API_BASE}/gmail/v1/users/me/settings/filters"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::transient(format!("Gmail filters.list failed: {e}")))?;

        let body: serde_json::Value = resp
            .json()
            .await
            .unwrap_or_else(|_| serde_json::json!({}));

        let filters = body
            .get("filter")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(filters
            .into_iter()
            .filter_map(|filter| {
                let id = filter.get("id").and_then(|v| v.as_str())?.to_string();
                Some(RawAutomation {
                    external_id: id,
                    name: "Gmail filter".to_string(),
                    automation_type: AutomationType::Webhook,
                    status: "active".to_string(),
                    trigger: Some("email_received".to_string()),
                    actions: Vec::new(),
                    permissions_required: Vec::new(),
                    owner_info: HashMap::new(),
                    created_at: None,
                    last_modified: None,
                    last_triggered: None,
                    metadata: HashMap::new(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl PlatformConnector for GoogleConnector {
    fn platform(&self) -> Platform {
        Platform::Google
    }

    fn rate_limit_per_minute(&self) -> u32 {
        100
    }

    async fn authenticate(&self, access_token: &str) -> Result<()> {
        let resp = self
            .http
            .get("https://www.googleapis.com/oauth2/v3/tokeninfo")
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| Error::transient(format!("Google tokeninfo failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::unauthorized("Google access token rejected"));
        }

        *self.access_token.write().unwrap() = Some(access_token.to_string());
        Ok(())
    }

    async fn discover_automations(&self) -> Result<Vec<RawAutomation>> {
        let audit_entries = self.get_audit_logs(Utc::now() - Duration::days(OAUTH_APP_WINDOW_DAYS)).await?;

        let mut automations = self.discover_apps_script().await?;
        automations.extend(self.discover_service_accounts(&audit_entries).await);
        automations.extend(self.discover_oauth_apps(&audit_entries).await);
        automations.extend(self.discover_email_automations().await?);

        Ok(automations)
    }

    async fn get_audit_logs(&self, since: DateTime<Utc>) -> Result<Vec<AuditEntry>> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!(
                "{GOOGLE_API_BASE}/admin/reports/v1/activity/users/all/applications/token"
            ))
            .bearer_auth(&token)
            .query(&[("startTime", since.to_rfc3339())])
            .send()
            .await
            .map_err(|e| Error::transient(format!("Admin Reports API failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::rate_limited("Google Admin Reports API rate limited"));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::transient(format!("Admin Reports decode failed: {e}")))?;

        let items = body
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut entries = Vec::new();
        for item in items {
            let Some(event_time) = item
                .get("id")
                .and_then(|id| id.get("time"))
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
            else {
                continue;
            };
            let actor_email = item
                .get("actor")
                .and_then(|a| a.get("email"))
                .and_then(|v| v.as_str())
                .map(String::from);

            for event in item.get("events").and_then(|v| v.as_array()).cloned().unwrap_or_default() {
                let event_name = event
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                let mut parameters = HashMap::new();
                for param in event.get("parameters").and_then(|v| v.as_array()).cloned().unwrap_or_default() {
                    let Some(name) = param.get("name").and_then(|v| v.as_str()) else {
                        continue;
                    };
                    if let Some(value) = param.get("value") {
                        parameters.insert(name.to_string(), value.clone());
                    } else if let Some(values) = param.get("multiValue") {
                        parameters.insert(name.to_string(), values.clone());
                    }
                }

                entries.push(AuditEntry {
                    event_time,
                    actor_email: actor_email.clone(),
                    application_name: parameters
                        .get("app_name")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    event_name,
                    parameters,
                });
            }
        }

        Ok(entries)
    }

    async fn validate_permissions(&self) -> Result<PermissionValidation> {
        let token = self.token()?;
        let resp = self
            .http
            .get("https://www.googleapis.com/oauth2/v3/tokeninfo")
            .query(&[("access_token", token.as_str())])
            .send()
            .await
            .map_err(|e| Error::transient(format!("Google tokeninfo failed: {e}")))?;

        let body: serde_json::Value = resp.json().await.unwrap_or_else(|_| serde_json::json!({}));
        let granted: Vec<String> = body
            .get("scope")
            .and_then(|v| v.as_str())
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        Ok(PermissionValidation {
            valid: !granted.is_empty(),
            granted,
            missing: Vec::new(),
            errors: Vec::new(),
        })
    }

    async fn get_correlation_events(&self, range: TimeRange) -> Result<Vec<PlatformEvent>> {
        let audit_entries = self.get_audit_logs(range.since).await?;

        Ok(audit_entries
            .into_iter()
            .filter(|e| e.event_time <= range.until)
            .map(|entry| PlatformEvent {
                event_id: format!("{}:{}", entry.event_name, entry.event_time.timestamp()),
                platform: Platform::Google,
                timestamp: entry.event_time,
                user_id: entry.actor_email.clone().unwrap_or_default(),
                user_email: entry.actor_email.clone(),
                event_type: entry.event_name.clone(),
                resource_id: None,
                resource_type: None,
                action_details: ActionDetails {
                    action: entry.event_name,
                    resource_name: entry.application_name,
                    additional_metadata: entry.parameters,
                },
                ip_address: None,
                correlation_metadata: CorrelationMetadata::default(),
            })
            .collect())
    }

    fn subscribe_real_time(&self) -> BoxStream<'static, PlatformEvent> {
        Box::pin(futures::stream::empty())
    }

    async fn is_connected(&self) -> bool {
        self.access_token.read().unwrap().is_some()
    }
}
