//! Cross-process fan-out: the piece of ambient plumbing a single-process
//! description leaves implicit but a multi-instance gateway needs. Worker
//! processes publish onto one of the five named channels; every gateway
//! instance subscribes and re-broadcasts after the same validation and
//! subscription gating used for locally-produced events.

use crate::server::GatewayServer;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use shadowai_core::realtime::{EventPublisher, GatewayEvent, NotificationLevel};
use std::sync::Arc;
use std::time::Duration;

const CHANNELS: [&str; 5] = ["discovery:events", "automation:events", "connection:events", "risk:events", "system:events"];

/// The channel one `GatewayEvent` is published on.
pub fn channel_for(event: &GatewayEvent) -> &'static str {
    match event {
        GatewayEvent::CorrelationStarted { .. }
        | GatewayEvent::CorrelationProgress { .. }
        | GatewayEvent::CorrelationCompleted { .. }
        | GatewayEvent::CorrelationError { .. } => "discovery:events",
        GatewayEvent::ChainDetected { .. } | GatewayEvent::ChainHighRiskAlert { .. } => "automation:events",
        GatewayEvent::RiskAssessmentUpdate { .. } | GatewayEvent::RiskThresholdExceeded { .. } | GatewayEvent::ExecutiveReportReady { .. } => {
            "risk:events"
        }
        GatewayEvent::SystemPerformanceUpdate { .. } | GatewayEvent::SystemHealthCheck { .. } | GatewayEvent::SystemNotification { .. } => {
            "system:events"
        }
    }
}

/// Publishes onto the named channel rather than broadcasting directly;
/// used by worker processes (discovery, correlation) that run apart from
/// the gateway process.
pub struct RedisEventPublisher {
    conn: ConnectionManager,
}

impl RedisEventPublisher {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait::async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, event: GatewayEvent) {
        let channel = channel_for(&event);
        match serde_json::to_string(&event) {
            Ok(payload) => {
                let mut conn = self.conn.clone();
                if let Err(error) = conn.publish::<_, _, ()>(channel, payload).await {
                    tracing::warn!(%error, channel, "failed to publish gateway event to redis");
                }
            }
            Err(error) => {
                tracing::error!(%error, event = event.event_name(), "dropping gateway event that failed schema validation before publish");
            }
        }
    }
}

/// Long-lived task: subscribes to the five channels and re-broadcasts
/// every validated message to this instance's connected clients.
/// Reconnects with a fixed backoff if the subscription stream ends.
pub fn spawn_fanout_subscriber(redis_url: String, server: Arc<GatewayServer>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(error) = run_subscriber(&redis_url, &server).await {
                tracing::warn!(%error, "redis fan-out subscriber ended, reconnecting");
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    })
}

async fn run_subscriber(redis_url: &str, server: &Arc<GatewayServer>) -> redis::RedisResult<()> {
    let client = redis::Client::open(redis_url)?;
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();
    for channel in CHANNELS {
        pubsub.subscribe(channel).await?;
    }

    let mut messages = pubsub.on_message();
    while let Some(message) = messages.next().await {
        let payload: String = match message.get_payload() {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%error, "failed to decode redis pub/sub payload");
                continue;
            }
        };
        match serde_json::from_str::<GatewayEvent>(&payload) {
            Ok(event) => server.broadcast(&event).await,
            Err(error) => {
                tracing::warn!(%error, "dropping cross-process gateway event that failed schema validation");
                server.broadcast_notification(NotificationLevel::Error, "dropped malformed cross-process event".to_string()).await;
            }
        }
    }
    Ok(())
}
