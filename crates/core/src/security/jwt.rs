use crate::{config::JwtConfig, error::Result, Error};
use chrono::Utc;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by a dashboard-client gateway token.
///
/// `sub` identifies the connecting user, `org_id` the tenant the socket is
/// scoped to, `sid` a session identifier used for audit correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayClaims {
    pub sub: String,
    pub org_id: String,
    pub sid: String,
    pub exp: i64,
    pub iat: i64,
}

/// Verifies bearer tokens presented by dashboard clients on the realtime
/// gateway's `authenticate{token, userRole}` handshake.
///
/// In non-production environments a token of the form
/// `test.<userId>.<tenantId>` bypasses signature verification entirely.
#[derive(Clone)]
pub struct JwtService {
    decoding_key: DecodingKey,
    test_mode: bool,
}

impl JwtService {
    pub fn new(config: &JwtConfig, environment: &str) -> Result<Self> {
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Ok(Self {
            decoding_key,
            test_mode: environment != "production",
        })
    }

    /// Verify a gateway token, returning its claims.
    pub fn verify_gateway_token(&self, token: &str) -> Result<GatewayClaims> {
        if self.test_mode {
            if let Some(claims) = Self::parse_test_token(token) {
                return Ok(claims);
            }
        }

        let mut validation = Validation::new(Algorithm::HS512);
        validation.validate_exp = true;

        let token_data = decode::<GatewayClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| Error::new(crate::error::ErrorCode::TokenInvalid, format!("Invalid gateway token: {}", e)))?;

        Ok(token_data.claims)
    }

    /// Parses the `test.<userId>.<tenantId>` test-mode token format.
    fn parse_test_token(token: &str) -> Option<GatewayClaims> {
        let mut parts = token.splitn(3, '.');
        if parts.next()? != "test" {
            return None;
        }
        let user_id = parts.next()?;
        let tenant_id = parts.next()?;
        if user_id.is_empty() || tenant_id.is_empty() {
            return None;
        }

        let now = Utc::now();
        Some(GatewayClaims {
            sub: user_id.to_string(),
            org_id: tenant_id.to_string(),
            sid: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::hours(1)).timestamp(),
        })
    }
}
