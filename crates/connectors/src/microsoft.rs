use crate::connector::{rate_limit_pause, PlatformConnector, TimeRange};
use crate::fingerprint::match_ai_provider;
use crate::types::{
    ActionDetails, AuditEntry, AutomationType, CorrelationMetadata, PermissionValidation, Platform, PlatformEvent,
    RawAutomation,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::BoxStream;
use reqwest::Client;
use shadowai_core::error::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const SERVICE_PRINCIPAL_WINDOW_DAYS: i64 = 180;

/// Microsoft 365 connector: enumerates third-party-owned service
/// principals (OAuth-consented applications) via Microsoft Graph and
/// folds in directory-audit activity for the same window Google's
/// OAuth-app discovery uses.
pub struct MicrosoftConnector {
    http: Client,
    access_token: RwLock<Option<String>>,
}

impl MicrosoftConnector {
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
            .ok_or_else(|| Error::unauthorized("Microsoft connector has no access token"))
    }

    /// Third-party service principals: Graph's first-party Microsoft
    /// apps are filtered out by `appOwnerOrganizationId` since those
    /// aren't automations a tenant admin installed.
    async fn discover_service_principals(&self) -> Result<Vec<RawAutomation>> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!("{GRAPH_BASE}/servicePrincipals"))
            .bearer_auth(&token)
            .query(&[("$filter", "servicePrincipalType eq 'Application'"), ("$top", "200")])
            .send()
            .await
            .map_err(|e| Error::transient(format!("Graph servicePrincipals failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::rate_limited("Microsoft Graph rate limit hit listing service principals"));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::transient(format!("Graph response decode failed: {e}")))?;

        let entries = body.get("value").and_then(|v| v.as_array()).cloned().unwrap_or_default();

        let mut automations = Vec::with_capacity(entries.len());
        for entry in entries {
            rate_limit_pause().await;
            let Some(app_id) = entry.get("appId").and_then(|v| v.as_str()) else {
                continue;
            };
            let display_name = entry
                .get("displayName")
                .and_then(|v| v.as_str())
                .unwrap_or(app_id)
                .to_string();
            let scopes: Vec<String> = entry
                .get("oauth2PermissionScopes")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|s| s.get("value").and_then(|v| v.as_str()).map(String::from))
                        .collect()
                })
                .unwrap_or_default();

            let mut metadata = HashMap::new();
            if let Some(provider) = match_ai_provider(&display_name).or_else(|| match_ai_provider(app_id)) {
                metadata.insert("isAIPlatform".to_string(), serde_json::Value::Bool(true));
                metadata.insert("platformName".to_string(), serde_json::Value::String(provider.to_string()));
            }

            automations.push(RawAutomation {
                external_id: app_id.to_string(),
                name: display_name,
                automation_type: AutomationType::Integration,
                status: "active".to_string(),
                trigger: Some("oauth".to_string()),
                actions: Vec::new(),
                permissions_required: scopes,
                owner_info: HashMap::new(),
                created_at: None,
                last_modified: None,
                last_triggered: None,
                metadata,
            });
        }
        Ok(automations)
    }

    /// Non-interactive sign-ins (app-only auth) surfaced as service
    /// accounts, mirroring Google's actor-domain heuristic but keyed on
    /// the sign-in log's `appId` field instead of an email suffix.
    fn discover_service_accounts(&self, audit_entries: &[AuditEntry]) -> Vec<RawAutomation> {
        audit_entries
            .iter()
            .filter(|e| e.event_name == "appOnlySignIn")
            .map(|e| RawAutomation {
                external_id: e.application_name.clone().unwrap_or_default(),
                name: e.application_name.clone().unwrap_or_default(),
                automation_type: AutomationType::ServiceAccount,
                status: "active".to_string(),
                trigger: Some("app_only_auth".to_string()),
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
}

#[async_trait]
impl PlatformConnector for MicrosoftConnector {
    fn platform(&self) -> Platform {
        Platform::Microsoft
    }

    fn rate_limit_per_minute(&self) -> u32 {
        120
    }

    async fn authenticate(&self, access_token: &str) -> Result<()> {
        let resp = self
            .http
            .get(format!("{GRAPH_BASE}/organization"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::transient(format!("Graph organization lookup failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::unauthorized("Microsoft access token rejected"));
        }

        *self.access_token.write().unwrap() = Some(access_token.to_string());
        Ok(())
    }

    async fn discover_automations(&self) -> Result<Vec<RawAutomation>> {
        let since = Utc::now() - Duration::days(SERVICE_PRINCIPAL_WINDOW_DAYS);
        let audit_entries = self.get_audit_logs(since).await?;

        let mut automations = self.discover_service_principals().await?;
        automations.extend(self.discover_service_accounts(&audit_entries));
        Ok(automations)
    }

    async fn get_audit_logs(&self, since: DateTime<Utc>) -> Result<Vec<AuditEntry>> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!("{GRAPH_BASE}/auditLogs/signIns"))
            .bearer_auth(&token)
            .query(&[("$filter", format!("createdDateTime ge {}", since.to_rfc3339()))])
            .send()
            .await
            .map_err(|e| Error::transient(format!("Graph auditLogs/signIns failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::rate_limited("Microsoft Graph rate limited fetching sign-in logs"));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::transient(format!("Graph sign-in log decode failed: {e}")))?;

        let items = body.get("value").and_then(|v| v.as_array()).cloned().unwrap_or_default();

        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let Some(event_time) = item
                .get("createdDateTime")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
            else {
                continue;
            };
            let is_app_only = item
                .get("isInteractive")
                .and_then(|v| v.as_bool())
                .map(|interactive| !interactive)
                .unwrap_or(false);
            let app_name = item.get("appDisplayName").and_then(|v| v.as_str()).map(String::from);
            let user_principal = item.get("userPrincipalName").and_then(|v| v.as_str()).map(String::from);

            let mut parameters = HashMap::new();
            if let Some(app_id) = item.get("appId").and_then(|v| v.as_str()) {
                parameters.insert("client_id".to_string(), serde_json::Value::String(app_id.to_string()));
            }
            if let Some(scopes) = item.get("resourceDisplayName") {
                parameters.insert("resource_display_name".to_string(), scopes.clone());
            }

            entries.push(AuditEntry {
                event_time,
                actor_email: user_principal,
                application_name: app_name,
                event_name: if is_app_only { "appOnlySignIn".to_string() } else { "interactiveSignIn".to_string() },
                parameters,
            });
        }
        Ok(entries)
    }

    async fn validate_permissions(&self) -> Result<PermissionValidation> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!("{GRAPH_BASE}/organization"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::transient(format!("Graph organization lookup failed: {e}")))?;

        Ok(PermissionValidation {
            valid: resp.status().is_success(),
            granted: Vec::new(),
            missing: Vec::new(),
            errors: if resp.status().is_success() { Vec::new() } else { vec!["Graph token rejected".to_string()] },
        })
    }

    async fn get_correlation_events(&self, range: TimeRange) -> Result<Vec<PlatformEvent>> {
        let audit_entries = self.get_audit_logs(range.since).await?;

        Ok(audit_entries
            .into_iter()
            .filter(|e| e.event_time <= range.until)
            .map(|entry| PlatformEvent {
                event_id: format!("{}:{}", entry.event_name, entry.event_time.timestamp()),
                platform: Platform::Microsoft,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_without_authenticate() {
        let connector = MicrosoftConnector::new(Client::new());
        assert!(connector.token().is_err());
    }
}
