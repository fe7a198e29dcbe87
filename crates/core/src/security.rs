pub mod encryption;
pub mod jwt;

pub use encryption::EncryptionService;
pub use jwt::{GatewayClaims, JwtService};
