use serde::{Deserialize, Serialize};
use std::fmt;

/// Standardized error codes shared by every crate in the workspace.
///
/// Codes are grouped by the error *kinds* named in the platform
/// specification (`AuthError`, `RateLimited`, `Transient`, `NotFound`,
/// `Conflict`, `Validation`, `Fatal`) plus the technical codes needed by
/// the ambient persistence/cache/job layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // General system errors (1000-1999)
    InternalServerError = 1000,
    ConfigurationError = 1001,
    ServiceUnavailable = 1002,
    Timeout = 1003,
    ResourceExhausted = 1004,

    // Database / storage errors (2000-2999)
    DatabaseConnectionError = 2000,
    DatabaseConstraintViolation = 2001,
    DatabaseTransactionError = 2002,
    DatabaseQueryError = 2003,
    DatabaseMigrationError = 2004,
    StorageError = 2005,
    CacheError = 2006,
    CacheMiss = 2007,

    // Network / external collaborator errors (3000-3999)
    NetworkError = 3000,
    NetworkTimeout = 3001,
    NetworkConnectionRefused = 3002,
    ExternalServiceError = 3003,
    SerializationError = 3004,

    // Auth / security errors (4000-4999) — spec kind `AuthError`
    AuthenticationRequired = 4000,
    AuthenticationFailed = 4001,
    InvalidCredentials = 4002,
    TokenExpired = 4003,
    TokenInvalid = 4004,
    AuthorizationFailed = 4005,
    PermissionDenied = 4006,
    OrgMismatch = 4007,
    EncryptionError = 4008,
    DecryptionError = 4009,

    // Validation errors (5000-5999) — spec kind `Validation`
    ValidationFailed = 5000,
    InvalidInput = 5001,
    MissingRequiredField = 5002,
    InvalidFormat = 5003,
    ValueOutOfRange = 5004,
    DuplicateValue = 5005,
    SchemaValidationFailed = 5006,

    // Resource errors (6000-6999) — spec kind `NotFound` / `Conflict`
    ResourceNotFound = 6000,
    ResourceAlreadyExists = 6001,
    ResourceLocked = 6002,
    ResourceInUse = 6003,
    AlreadyInProgress = 6004,
    NotFound = 6005,
    NotImplemented = 6006,
    Conflict = 6007,

    // Rate limiting / quota errors (7000-7999) — spec kind `RateLimited`
    RateLimitExceeded = 7000,
    TooManyRequests = 7001,
    ConcurrencyLimitExceeded = 7002,
    QuotaExceeded = 7003,

    // Transient collaborator errors (8000-8999) — spec kind `Transient`
    TransientFailure = 8000,
    UpstreamUnavailable = 8001,

    // Job / queue errors (9000-9999)
    JobQueueError = 9000,
    JobExecutionFailed = 9001,
    JobTimeout = 9002,
    JobDeserializationError = 9003,

    // Fatal invariant breaches (9900-9999) — spec kind `Fatal`
    InvariantViolation = 9900,
}

impl ErrorCode {
    /// Get the HTTP status code this error maps to.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InternalServerError
            | ErrorCode::ConfigurationError
            | ErrorCode::DatabaseConnectionError
            | ErrorCode::DatabaseTransactionError
            | ErrorCode::DatabaseQueryError
            | ErrorCode::DatabaseMigrationError
            | ErrorCode::StorageError
            | ErrorCode::CacheError
            | ErrorCode::NetworkError
            | ErrorCode::ExternalServiceError
            | ErrorCode::SerializationError
            | ErrorCode::EncryptionError
            | ErrorCode::DecryptionError
            | ErrorCode::JobQueueError
            | ErrorCode::JobExecutionFailed
            | ErrorCode::InvariantViolation => 500,

            ErrorCode::ServiceUnavailable
            | ErrorCode::NetworkConnectionRefused
            | ErrorCode::UpstreamUnavailable
            | ErrorCode::TransientFailure => 503,

            ErrorCode::Timeout | ErrorCode::NetworkTimeout | ErrorCode::JobTimeout => 504,

            ErrorCode::AuthenticationRequired
            | ErrorCode::AuthenticationFailed
            | ErrorCode::InvalidCredentials
            | ErrorCode::TokenExpired
            | ErrorCode::TokenInvalid
            | ErrorCode::OrgMismatch => 401,
            ErrorCode::AuthorizationFailed | ErrorCode::PermissionDenied => 403,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFormat
            | ErrorCode::ValueOutOfRange
            | ErrorCode::SchemaValidationFailed => 400,

            ErrorCode::ResourceNotFound | ErrorCode::NotFound => 404,
            ErrorCode::ResourceAlreadyExists
            | ErrorCode::DuplicateValue
            | ErrorCode::ResourceLocked
            | ErrorCode::ResourceInUse
            | ErrorCode::AlreadyInProgress
            | ErrorCode::Conflict
            | ErrorCode::DatabaseConstraintViolation => 409,

            ErrorCode::RateLimitExceeded
            | ErrorCode::TooManyRequests
            | ErrorCode::ConcurrencyLimitExceeded
            | ErrorCode::QuotaExceeded => 429,

            ErrorCode::ResourceExhausted => 507,
            ErrorCode::NotImplemented => 501,
            ErrorCode::CacheMiss => 404,
            ErrorCode::JobDeserializationError => 422,
        }
    }

    /// Coarse error category.
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::InternalServerError
            | ErrorCode::ConfigurationError
            | ErrorCode::ServiceUnavailable
            | ErrorCode::Timeout
            | ErrorCode::ResourceExhausted => "system",

            ErrorCode::DatabaseConnectionError
            | ErrorCode::DatabaseConstraintViolation
            | ErrorCode::DatabaseTransactionError
            | ErrorCode::DatabaseQueryError
            | ErrorCode::DatabaseMigrationError
            | ErrorCode::StorageError
            | ErrorCode::CacheError
            | ErrorCode::CacheMiss => "storage",

            ErrorCode::NetworkError
            | ErrorCode::NetworkTimeout
            | ErrorCode::NetworkConnectionRefused
            | ErrorCode::ExternalServiceError
            | ErrorCode::SerializationError
            | ErrorCode::TransientFailure
            | ErrorCode::UpstreamUnavailable => "network",

            ErrorCode::AuthenticationRequired
            | ErrorCode::AuthenticationFailed
            | ErrorCode::InvalidCredentials
            | ErrorCode::TokenExpired
            | ErrorCode::TokenInvalid
            | ErrorCode::AuthorizationFailed
            | ErrorCode::PermissionDenied
            | ErrorCode::OrgMismatch
            | ErrorCode::EncryptionError
            | ErrorCode::DecryptionError => "security",

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFormat
            | ErrorCode::ValueOutOfRange
            | ErrorCode::DuplicateValue
            | ErrorCode::SchemaValidationFailed => "validation",

            ErrorCode::ResourceNotFound
            | ErrorCode::ResourceAlreadyExists
            | ErrorCode::ResourceLocked
            | ErrorCode::ResourceInUse
            | ErrorCode::AlreadyInProgress
            | ErrorCode::NotFound
            | ErrorCode::NotImplemented
            | ErrorCode::Conflict => "resource",

            ErrorCode::RateLimitExceeded
            | ErrorCode::TooManyRequests
            | ErrorCode::ConcurrencyLimitExceeded
            | ErrorCode::QuotaExceeded => "rate_limit",

            ErrorCode::JobQueueError
            | ErrorCode::JobExecutionFailed
            | ErrorCode::JobTimeout
            | ErrorCode::JobDeserializationError => "jobs",

            ErrorCode::InvariantViolation => "fatal",
        }
    }

    /// Whether a caller may reasonably retry the operation that raised this code.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ServiceUnavailable
                | ErrorCode::Timeout
                | ErrorCode::NetworkTimeout
                | ErrorCode::NetworkConnectionRefused
                | ErrorCode::TransientFailure
                | ErrorCode::UpstreamUnavailable
                | ErrorCode::DatabaseConnectionError
                | ErrorCode::JobTimeout
        )
    }

    /// Whether this code should always be surfaced at `error!` level regardless of severity.
    pub fn should_log_as_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::InternalServerError
                | ErrorCode::DatabaseConnectionError
                | ErrorCode::InvariantViolation
                | ErrorCode::EncryptionError
                | ErrorCode::DecryptionError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
