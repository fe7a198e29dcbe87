use crate::connector::{rate_limit_pause, PlatformConnector, TimeRange};
use crate::fingerprint::match_ai_provider;
use crate::types::{
    ActionDetails, AuditEntry, AutomationType, CorrelationMetadata, PermissionValidation,
    Platform, PlatformEvent, RawAutomation,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use reqwest::Client;
use shadowai_core::error::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Slack connector: enumerates channels, pulls history per channel, and
/// folds in workflow/app events. Rate limited to Slack's
/// tier-3 budget of 50 requests/minute by default.
pub struct SlackConnector {
    http: Client,
    access_token: RwLock<Option<String>>,
}

impl SlackConnector {
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
            .ok_or_else(|| Error::unauthorized("Slack connector has no access token"))
    }

    async fn list_channels(&self) -> Result<Vec<serde_json::Value>> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!("{SLACK_API_BASE}/conversations.list"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::transient(format!("Slack conversations.list failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::rate_limited("Slack rate limit hit listing channels"));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::transient(format!("Slack response decode failed: {e}")))?;

        Ok(body
            .get("channels")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl PlatformConnector for SlackConnector {
    fn platform(&self) -> Platform {
        Platform::Slack
    }

    fn rate_limit_per_minute(&self) -> u32 {
        50
    }

    async fn authenticate(&self, access_token: &str) -> Result<()> {
        let resp = self
            .http
            .get(format!("{SLACK_API_BASE}/auth.test"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::transient(format!("Slack auth.test failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::unauthorized("Slack token rejected by auth.test"));
        }

        *self.access_token.write().unwrap() = Some(access_token.to_string());
        Ok(())
    }

    async fn discover_automations(&self) -> Result<Vec<RawAutomation>> {
        let channels = self.list_channels().await?;
        let mut automations = Vec::new();

        for channel in channels {
            rate_limit_pause().await;

            let Some(name) = channel.get("name").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(is_bot_channel) = channel.get("is_bot").and_then(|v| v.as_bool()) else {
                continue;
            };
            if !is_bot_channel {
                continue;
            }
            let external_id = channel
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or(name)
                .to_string();

            let mut metadata = HashMap::new();
            if let Some(provider) = match_ai_provider(name) {
                metadata.insert(
                    "isAIPlatform".to_string(),
                    serde_json::Value::Bool(true),
                );
                metadata.insert(
                    "platformName".to_string(),
                    serde_json::Value::String(provider.to_string()),
                );
            }

            automations.push(RawAutomation {
                external_id,
                name: name.to_string(),
                automation_type: AutomationType::Bot,
                status: "active".to_string(),
                trigger: Some("workflow".to_string()),
                actions: Vec::new(),
                permissions_required: Vec::new(),
                owner_info: HashMap::new(),
                created_at: None,
                last_modified: None,
                last_triggered: None,
                metadata,
            });
        }

        Ok(automations)
    }

    async fn get_audit_logs(&self, since: DateTime<Utc>) -> Result<Vec<AuditEntry>> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!("{SLACK_API_BASE}/team.accessLogs"))
            .bearer_auth(&token)
            .query(&[("before", since.timestamp().to_string())])
            .send()
            .await
            .map_err(|e| Error::transient(format!("Slack accessLogs failed: {e}")))?;

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::transient(format!("Slack response decode failed: {e}")))?;

        let entries = body
            .get("logins")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                let event_time = entry
                    .get("date_first")
                    .and_then(|v| v.as_i64())
                    .and_then(|ts| DateTime::from_timestamp(ts, 0))?;
                Some(AuditEntry {
                    event_time,
                    actor_email: entry
                        .get("username")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    application_name: None,
                    event_name: "login".to_string(),
                    parameters: HashMap::new(),
                })
            })
            .collect();

        Ok(entries)
    }

    async fn validate_permissions(&self) -> Result<PermissionValidation> {
        let token = self.token()?;
        let resp = self
            .http
            .get(format!("{SLACK_API_BASE}/apps.permissions.info"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::transient(format!("Slack permissions check failed: {e}")))?;

        let body: serde_json::Value = resp
            .json()
            .await
            .unwrap_or_else(|_| serde_json::json!({}));

        let granted = body
            .get("info")
            .and_then(|i| i.get("scopes"))
            .and_then(|s| s.get("app_home"))
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(PermissionValidation {
            valid: true,
            granted,
            missing: Vec::new(),
            errors: Vec::new(),
        })
    }

    async fn get_correlation_events(&self, range: TimeRange) -> Result<Vec<PlatformEvent>> {
        let channels = self.list_channels().await?;
        let mut events = Vec::new();

        for channel in channels {
            rate_limit_pause().await;
            let Some(channel_id) = channel.get("id").and_then(|v| v.as_str()) else {
                continue;
            };

            let token = self.token()?;
            let resp = self
                .http
                .get(format!("{SLACK_API_BASE}/conversations.history"))
                .bearer_auth(&token)
                .query(&[
                    ("channel", channel_id),
                    ("oldest", &range.since.timestamp().to_string()),
                    ("latest", &range.until.timestamp().to_string()),
                ])
                .send()
                .await;

            let Ok(resp) = resp else {
                tracing::warn!(channel_id, "Slack history fetch failed, skipping channel");
                continue;
            };

            let body: serde_json::Value = resp.json().await.unwrap_or_else(|_| serde_json::json!({}));
            let messages = body
                .get("messages")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            for message in messages {
                let Some(ts) = message.get("ts").and_then(|v| v.as_str()) else {
                    continue;
                };
                let Ok(unix_secs) = ts.split('.').next().unwrap_or("0").parse::<i64>() else {
                    continue;
                };
                let Some(timestamp) = DateTime::from_timestamp(unix_secs, 0) else {
                    continue;
                };
                let user_id = message
                    .get("user")
                    .or_else(|| message.get("bot_id"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                let text = message.get("text").and_then(|v| v.as_str()).unwrap_or("");

                events.push(PlatformEvent {
                    event_id: format!("{channel_id}:{ts}"),
                    platform: Platform::Slack,
                    timestamp,
                    user_id,
                    user_email: None,
                    event_type: "message".to_string(),
                    resource_id: Some(channel_id.to_string()),
                    resource_type: Some("channel".to_string()),
                    action_details: ActionDetails {
                        action: "post_message".to_string(),
                        resource_name: channel.get("name").and_then(|v| v.as_str()).map(String::from),
                        additional_metadata: HashMap::new(),
                    },
                    ip_address: None,
                    correlation_metadata: CorrelationMetadata {
                        potential_trigger: message.get("bot_id").is_some(),
                        potential_action: false,
                        external_data_access: false,
                        automation_indicators: match_ai_provider(text)
                            .map(|p| vec![p.to_string()])
                            .unwrap_or_default(),
                    },
                });
            }
        }

        Ok(events)
    }

    fn subscribe_real_time(&self) -> BoxStream<'static, PlatformEvent> {
        Box::pin(futures::stream::empty())
    }

    async fn is_connected(&self) -> bool {
        self.access_token.read().unwrap().is_some()
    }
}
