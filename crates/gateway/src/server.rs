//! WebSocket server. Grounded on
//! `dashflow-observability`'s websocket_server: a bounded per-socket
//! outbound channel, a timeout-guarded send helper so a wedged client
//! can't block the broadcaster, and a control-frame size cap on the
//! inbound `authenticate` handshake.

use crate::types::{default_subscriptions, ConnectedClient, SessionId, SubscriptionFlag, SubscriptionPreference, UserRole};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use shadowai_core::error::Error;
use shadowai_core::realtime::{EventPublisher, GatewayEvent, HealthStatus, NotificationLevel, ServiceHealth};
use shadowai_core::security::jwt::JwtService;
use shadowai_core::types::TenantId;
use shadowai_core::GatewayConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Maximum size, in bytes, of the inbound `authenticate` control frame.
/// Sized down from a typical control-frame cap since this handshake
/// payload is a handful of fields, not a replay resume request.
const MAX_AUTH_FRAME_BYTES: usize = 8 * 1024;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    Authenticate {
        token: String,
        user_role: UserRole,
        #[serde(default)]
        resume_session_id: Option<Uuid>,
    },
}

struct AuthenticatedHandshake {
    user_id: String,
    tenant_id: TenantId,
    subscriptions: SubscriptionPreference,
}

pub struct GatewayServer {
    clients: DashMap<SessionId, ConnectedClient>,
    jwt: JwtService,
    config: GatewayConfig,
    sent_total: AtomicU64,
    dropped_total: AtomicU64,
}

impl GatewayServer {
    pub fn new(jwt: JwtService, config: GatewayConfig) -> Arc<Self> {
        Arc::new(Self { clients: DashMap::new(), jwt, config, sent_total: AtomicU64::new(0), dropped_total: AtomicU64::new(0) })
    }

    pub fn connected_client_count(&self) -> usize {
        self.clients.len()
    }

    pub async fn upgrade(State(server): State<Arc<Self>>, ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(move |socket| async move { server.handle_socket(socket).await })
    }

    async fn handle_socket(self: Arc<Self>, socket: WebSocket) {
        let (mut sink, mut stream) = socket.split();

        let authenticated = match self.authenticate(&mut stream).await {
            Ok(authenticated) => authenticated,
            Err(reason) => {
                tracing::warn!(%reason, "gateway handshake failed");
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
        };

        let (tx, mut rx) = tokio::sync::mpsc::channel::<Message>(self.config.broadcast_channel_capacity);
        let session_id = SessionId::new();
        let tenant_id = authenticated.tenant_id;
        self.clients.insert(
            session_id,
            ConnectedClient {
                session_id,
                user_id: authenticated.user_id,
                tenant_id,
                subscriptions: authenticated.subscriptions,
                sender: tx,
            },
        );
        tracing::info!(session_id = %session_id.0, tenant_id = %tenant_id.0, "gateway client connected");

        let forward = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let close = matches!(message, Message::Close(_));
                if tokio::time::timeout(Duration::from_secs(5), sink.send(message)).await.is_err() {
                    break;
                }
                if close {
                    break;
                }
            }
        });

        loop {
            match stream.next().await {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => continue,
                Some(Err(error)) => {
                    tracing::warn!(%error, "gateway socket read error");
                    break;
                }
            }
        }

        self.clients.remove(&session_id);
        forward.abort();
        tracing::info!(session_id = %session_id.0, "gateway client disconnected");
    }

    /// Waits for `authenticate{token, userRole}` within the configured
    /// grace period.
    async fn authenticate(&self, stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin)) -> Result<AuthenticatedHandshake, String> {
        let grace_period = Duration::from_millis(self.config.auth_grace_period_ms);
        let raw = tokio::time::timeout(grace_period, stream.next())
            .await
            .map_err(|_| "authenticate handshake timed out".to_string())?
            .ok_or_else(|| "socket closed before authenticating".to_string())?
            .map_err(|e| e.to_string())?;

        let text = match raw {
            Message::Text(text) => text,
            _ => return Err("expected authenticate as the first message".to_string()),
        };
        if text.len() > MAX_AUTH_FRAME_BYTES {
            return Err("authenticate payload too large".to_string());
        }

        let ClientMessage::Authenticate { token, user_role, resume_session_id } =
            serde_json::from_str(&text).map_err(|e| format!("malformed authenticate payload: {e}"))?;

        let claims = self.jwt.verify_gateway_token(&token).map_err(|e| e.to_string())?;
        let tenant_id = TenantId(Uuid::parse_str(&claims.org_id).map_err(|_| "org_id claim is not a uuid".to_string())?);

        if let Some(resume_session_id) = resume_session_id {
            if let Some(existing) = self.clients.get(&SessionId(resume_session_id)) {
                if existing.tenant_id != tenant_id {
                    return Err(Error::org_mismatch("resumed session's tenant does not match the presented token").to_string());
                }
            }
        }

        Ok(AuthenticatedHandshake { user_id: claims.sub, tenant_id, subscriptions: default_subscriptions(user_role) })
    }

    /// Schema-validates and fans `event` out to every subscribed, org-matching
    /// client.
    pub async fn broadcast(&self, event: &GatewayEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(%error, event = event.event_name(), "dropping gateway event that failed schema validation");
                self.broadcast_notification(NotificationLevel::Error, format!("dropped malformed {} event", event.event_name())).await;
                return;
            }
        };

        let flag = subscription_flag_for(event);
        let organization_id = event.organization_id();

        for entry in self.clients.iter() {
            let client = entry.value();
            if let Some(organization_id) = organization_id {
                if client.tenant_id != organization_id {
                    continue;
                }
            }
            if let Some(flag) = flag {
                if !client.subscriptions.flags.contains(&flag) {
                    continue;
                }
            }
            self.send_to(client, Message::Text(payload.clone()));
        }
    }

    pub(crate) async fn broadcast_notification(&self, level: NotificationLevel, message: String) {
        let event = GatewayEvent::SystemNotification { level, message, timestamp: chrono::Utc::now() };
        if let Ok(payload) = serde_json::to_string(&event) {
            for entry in self.clients.iter() {
                self.send_to(entry.value(), Message::Text(payload.clone()));
            }
        }
    }

    fn send_to(&self, client: &ConnectedClient, message: Message) {
        match client.sender.try_send(message) {
            Ok(()) => {
                self.sent_total.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.dropped_total.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// One tick of the 30s periodic stream.
    pub async fn broadcast_performance_snapshot(&self, latency: f64, accuracy: f64, throughput: f64, services: Vec<ServiceHealth>) {
        let overall = services.iter().map(|s| s.status).max().unwrap_or(HealthStatus::Healthy);
        self.broadcast(&GatewayEvent::SystemPerformanceUpdate { latency, accuracy, throughput, timestamp: chrono::Utc::now() }).await;
        self.broadcast(&GatewayEvent::SystemHealthCheck { services, overall, timestamp: chrono::Utc::now() }).await;
    }

    /// Long-lived task driving the 30s periodic broadcast.
    pub fn spawn_periodic_broadcasts(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_secs(self.config.performance_broadcast_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let sent = self.sent_total.swap(0, Ordering::Relaxed) as f64;
                let dropped = self.dropped_total.swap(0, Ordering::Relaxed) as f64;
                let throughput = sent / interval.as_secs_f64().max(1.0);
                let accuracy = if sent + dropped > 0.0 { sent / (sent + dropped) } else { 1.0 };
                let services = vec![ServiceHealth { service: "gateway".to_string(), status: HealthStatus::Healthy }];
                self.broadcast_performance_snapshot(0.0, accuracy, throughput, services).await;
            }
        })
    }
}

/// Maps one `GatewayEvent` onto the subscription flag that gates it
///; `None` means the
/// event bypasses subscription gating (still gated by `organization_id`
/// where present).
fn subscription_flag_for(event: &GatewayEvent) -> Option<SubscriptionFlag> {
    match event {
        GatewayEvent::CorrelationStarted { .. }
        | GatewayEvent::CorrelationProgress { .. }
        | GatewayEvent::CorrelationCompleted { .. }
        | GatewayEvent::CorrelationError { .. } => Some(SubscriptionFlag::AnalysisProgress),
        GatewayEvent::ChainDetected { .. } => Some(SubscriptionFlag::ChainDetection),
        GatewayEvent::ChainHighRiskAlert { .. } => Some(SubscriptionFlag::RiskAlerts),
        GatewayEvent::RiskAssessmentUpdate { .. } | GatewayEvent::RiskThresholdExceeded { .. } => Some(SubscriptionFlag::RiskAlerts),
        GatewayEvent::ExecutiveReportReady { .. } => Some(SubscriptionFlag::ExecutiveUpdates),
        GatewayEvent::SystemPerformanceUpdate { .. } | GatewayEvent::SystemHealthCheck { .. } => Some(SubscriptionFlag::PerformanceMetrics),
        GatewayEvent::SystemNotification { .. } => None,
    }
}

#[async_trait::async_trait]
impl EventPublisher for GatewayServer {
    async fn publish(&self, event: GatewayEvent) {
        self.broadcast(&event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowai_core::config::JwtConfig;
    use tokio::sync::mpsc;

    fn test_config() -> GatewayConfig {
        GatewayConfig { auth_grace_period_ms: 5_000, performance_broadcast_interval_secs: 30, broadcast_channel_capacity: 16 }
    }

    fn test_jwt() -> JwtService {
        let config = JwtConfig { secret: "a".repeat(32), access_token_expiry: 1800, refresh_token_expiry: 604_800 };
        JwtService::new(&config, "test").unwrap()
    }

    fn insert_client(server: &Arc<GatewayServer>, tenant_id: TenantId, flags: &[SubscriptionFlag]) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(16);
        let session_id = SessionId::new();
        server.clients.insert(
            session_id,
            ConnectedClient {
                session_id,
                user_id: "u1".to_string(),
                tenant_id,
                subscriptions: SubscriptionPreference { flags: flags.iter().copied().collect(), risk_score_threshold: None },
                sender: tx,
            },
        );
        rx
    }

    #[tokio::test]
    async fn broadcast_respects_org_and_subscription_gating() {
        let server = GatewayServer::new(test_jwt(), test_config());
        let tenant_a = TenantId(Uuid::new_v4());
        let tenant_b = TenantId(Uuid::new_v4());

        let mut subscribed_match = insert_client(&server, tenant_a, &[SubscriptionFlag::ChainDetection]);
        let mut wrong_flag = insert_client(&server, tenant_a, &[SubscriptionFlag::RiskAlerts]);
        let mut wrong_tenant = insert_client(&server, tenant_b, &[SubscriptionFlag::ChainDetection]);

        server
            .broadcast(&GatewayEvent::ChainDetected { organization_id: tenant_a, chain: serde_json::json!({}), timestamp: chrono::Utc::now() })
            .await;

        assert!(subscribed_match.try_recv().is_ok());
        assert!(wrong_flag.try_recv().is_err());
        assert!(wrong_tenant.try_recv().is_err());
    }

    #[tokio::test]
    async fn system_notification_bypasses_subscription_gate() {
        let server = GatewayServer::new(test_jwt(), test_config());
        let mut client = insert_client(&server, TenantId(Uuid::new_v4()), &[]);

        server
            .broadcast(&GatewayEvent::SystemNotification { level: NotificationLevel::Info, message: "hello".to_string(), timestamp: chrono::Utc::now() })
            .await;

        assert!(client.try_recv().is_ok());
    }

    #[tokio::test]
    async fn full_subscriber_buffer_drops_rather_than_blocks() {
        let server = GatewayServer::new(test_jwt(), test_config());
        let tenant_id = TenantId(Uuid::new_v4());
        let _rx = insert_client(&server, tenant_id, &[SubscriptionFlag::RiskAlerts]);

        for client in server.clients.iter() {
            for _ in 0..16 {
                let _ = client.sender.try_send(Message::Text("filler".to_string()));
            }
        }

        server
            .broadcast(&GatewayEvent::RiskAssessmentUpdate { organization_id: tenant_id, assessment: serde_json::json!({}), timestamp: chrono::Utc::now() })
            .await;

        assert_eq!(server.dropped_total.load(Ordering::Relaxed), 1);
    }
}
