//! Production `TokenIssuer`: trades a stored refresh token for a fresh
//! access token against each platform's own OAuth endpoint.

use crate::models::OAuthCredentials;
use crate::store::TokenIssuer;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use shadowai_connectors::types::Platform;
use shadowai_core::config::{OAuthClientConfig, OAuthConfig};
use shadowai_core::error::{Error, Result};
use tracing::warn;

const SLACK_TOKEN_URL: &str = "https://slack.com/api/oauth.v2.access";
const SLACK_REVOKE_URL: &str = "https://slack.com/api/auth.revoke";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Issues refresh/revoke calls against each platform's real OAuth
/// endpoint, using the per-platform client credentials from `Config`.
pub struct HttpTokenIssuer {
    http: Client,
    oauth: OAuthConfig,
}

impl HttpTokenIssuer {
    pub fn new(http: Client, oauth: OAuthConfig) -> Self {
        Self { http, oauth }
    }

    fn client_for(&self, platform: Platform) -> &OAuthClientConfig {
        match platform {
            Platform::Slack => &self.oauth.slack,
            Platform::Google => &self.oauth.google,
            Platform::Microsoft => &self.oauth.microsoft,
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn refresh(&self, platform: Platform, refresh_token: &str) -> Result<OAuthCredentials> {
        let client = self.client_for(platform);

        let (url, params): (&str, Vec<(&str, &str)>) = match platform {
            Platform::Slack => (
                SLACK_TOKEN_URL,
                vec![
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", &client.client_id),
                    ("client_secret", &client.client_secret),
                ],
            ),
            Platform::Google => (
                GOOGLE_TOKEN_URL,
                vec![
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", &client.client_id),
                    ("client_secret", &client.client_secret),
                ],
            ),
            Platform::Microsoft => (
                MICROSOFT_TOKEN_URL,
                vec![
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", &client.client_id),
                    ("client_secret", &client.client_secret),
                    ("scope", "https://graph.microsoft.com/.default offline_access"),
                ],
            ),
        };

        let resp = self
            .http
            .post(url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::transient(format!("{platform} token refresh request failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::rate_limited(format!("{platform} token endpoint rate limited")));
        }
        if !resp.status().is_success() {
            return Err(Error::unauthorized(format!("{platform} rejected the refresh token")));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::transient(format!("{platform} token response decode failed: {e}")))?;

        if platform == Platform::Slack && body.get("ok").and_then(|v| v.as_bool()) == Some(false) {
            let error = body.get("error").and_then(|v| v.as_str()).unwrap_or("unknown_error");
            return Err(Error::unauthorized(format!("Slack token refresh failed: {error}")));
        }

        let access_token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::transient(format!("{platform} token response missing access_token")))?
            .to_string();
        let new_refresh_token = body.get("refresh_token").and_then(|v| v.as_str()).map(String::from);
        let expires_in = body.get("expires_in").and_then(|v| v.as_i64());

        Ok(OAuthCredentials {
            access_token,
            refresh_token: new_refresh_token,
            expires_at: expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }

    async fn revoke(&self, platform: Platform, access_token: &str) -> Result<()> {
        match platform {
            Platform::Slack => {
                let resp = self
                    .http
                    .post(SLACK_REVOKE_URL)
                    .bearer_auth(access_token)
                    .send()
                    .await
                    .map_err(|e| Error::transient(format!("Slack revoke request failed: {e}")))?;
                if !resp.status().is_success() {
                    warn!(%platform, status = %resp.status(), "platform revoke endpoint returned non-success");
                }
                Ok(())
            }
            Platform::Google => {
                let resp = self
                    .http
                    .post(GOOGLE_REVOKE_URL)
                    .form(&[("token", access_token)])
                    .send()
                    .await
                    .map_err(|e| Error::transient(format!("Google revoke request failed: {e}")))?;
                if !resp.status().is_success() {
                    warn!(%platform, status = %resp.status(), "platform revoke endpoint returned non-success");
                }
                Ok(())
            }
            Platform::Microsoft => {
                // Azure AD v2 has no generic per-token revoke endpoint; the
                // access token simply expires. Best-effort is a no-op.
                Ok(())
            }
        }
    }
}
