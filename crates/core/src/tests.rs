#[cfg(test)]
mod tests {
    use crate::config::*;
    use crate::security::*;
    use crate::TenantId;

    fn test_security_config() -> SecurityConfig {
        SecurityConfig {
            aes_encryption_key: "12345678901234567890123456789012".to_string(),
        }
    }

    fn test_jwt_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 1800,
            refresh_token_expiry: 604800,
        }
    }

    #[test]
    fn test_email_validation() {
        use crate::utils::validate_email;

        assert!(validate_email("user@example.com"));
        assert!(validate_email("test.email+tag@domain.co.uk"));

        assert!(!validate_email("invalid-email"));
        assert!(!validate_email("@domain.com"));
        assert!(!validate_email("user@"));
    }

    #[test]
    fn test_encryption_service_round_trip() {
        let config = test_security_config();
        let service = EncryptionService::new(&config).unwrap();
        let plaintext = "oauth-refresh-token-secret-value";

        let encrypted = service.encrypt_string(plaintext).unwrap();
        assert!(!encrypted.is_empty());
        assert_ne!(encrypted, plaintext);

        let decrypted = service.decrypt_string(&encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_gateway_token_test_mode() {
        let jwt_config = test_jwt_config();
        let service = JwtService::new(&jwt_config, "development").unwrap();

        let token = format!("test.{}.{}", "user-123", "tenant-456");
        let claims = service.verify_gateway_token(&token).unwrap();

        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.org_id, "tenant-456");
    }

    #[test]
    fn test_gateway_token_rejects_malformed_test_token() {
        let jwt_config = test_jwt_config();
        let service = JwtService::new(&jwt_config, "development").unwrap();

        assert!(service.verify_gateway_token("not-a-valid-token").is_err());
        assert!(service.verify_gateway_token("test.onlyuser").is_err());
    }

    #[test]
    fn test_tenant_id_serialization() {
        use serde_json;
        use uuid::Uuid;

        let tenant_id = TenantId(Uuid::new_v4());
        let serialized = serde_json::to_string(&tenant_id).unwrap();
        let deserialized: TenantId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(tenant_id.0, deserialized.0);
    }
}
