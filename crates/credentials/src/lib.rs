//! C2 Credential Store: encrypt-at-rest OAuth credential
//! lifecycle for platform connections, with a memory cache layered over a
//! durable repository and single-flight refresh.

pub mod issuer;
pub mod models;
pub mod repository;
pub mod store;

pub use issuer::HttpTokenIssuer;
pub use models::{CredentialHealth, CredentialKind, EncryptedCredential, OAuthCredentials};
pub use repository::{CredentialRepository, PostgresCredentialRepository};
pub use store::{CredentialStore, TokenIssuer};
