//! Realtime Gateway: authenticated WebSocket server with
//! role-based default subscriptions, org-scoped broadcast, and
//! cross-process fan-out over Redis pub/sub.

pub mod redis_fanout;
pub mod server;
pub mod types;

pub use redis_fanout::{channel_for, spawn_fanout_subscriber, RedisEventPublisher};
pub use server::GatewayServer;
pub use types::{default_subscriptions, ConnectedClient, SessionId, SubscriptionFlag, SubscriptionPreference, UserRole};
