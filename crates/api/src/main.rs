mod api_middleware;
mod error;
mod error_handler;
mod handlers;
mod health;
mod state;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use redis::aio::ConnectionManager;
use shadowai_automations::{AutomationService, PostgresAutomationRepository};
use shadowai_core::config::Config;
use shadowai_core::database::DatabasePool;
use shadowai_core::metrics::{MetricsRegistry, MetricsService};
use shadowai_core::security::{EncryptionService, JwtService};
use shadowai_correlation::chain_detector::HeuristicChainDetector;
use shadowai_correlation::CorrelationEngine;
use shadowai_credentials::{CredentialStore, HttpTokenIssuer, PostgresCredentialRepository};
use shadowai_discovery::{ConnectionRepository, DiscoveryOrchestrator, DiscoveryScheduler, PostgresConnectionRepository};
use shadowai_gateway::{spawn_fanout_subscriber, GatewayServer, RedisEventPublisher};
use shadowai_learning::{FeedbackStore, PostgresFeedbackRepository, RlThresholdService, RollbackMonitor};
use shadowai_risk::RiskAssessor;
use shadowai_storage::QuotaTracker;
use state::{register_connectors, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(health::health_check, health::readiness_check),
    tags((name = "health", description = "Liveness and readiness endpoints"))
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = Config::load()?;
    info!(environment = %config.app.environment, "starting shadowai-api");

    let db = DatabasePool::new(config.database.clone()).await?;
    run_migrations(&db).await?;

    let redis = init_redis(&config.redis.url).await?;
    let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;

    let connectors = register_connectors(http.clone());

    let encryption = Arc::new(EncryptionService::new(&config.security)?);
    let issuer = Arc::new(HttpTokenIssuer::new(http.clone(), config.oauth.clone()));
    let credential_repo = Arc::new(PostgresCredentialRepository::new(db.clone()));
    let credentials = Arc::new(CredentialStore::new(credential_repo, encryption, issuer, connectors.clone()));

    let automation_repo = Arc::new(PostgresAutomationRepository::new(db.clone()));
    let automations = Arc::new(AutomationService::new(automation_repo));

    let connections: Arc<dyn ConnectionRepository> = Arc::new(PostgresConnectionRepository::new(db.clone()));

    let risk = Arc::new(RiskAssessor::new(Arc::clone(&automations)));

    let feedback_repo = Arc::new(PostgresFeedbackRepository::new(db.clone()));
    let feedback = Arc::new(FeedbackStore::new(Arc::clone(&feedback_repo)));
    let rl_thresholds = Arc::new(RlThresholdService::new(
        FeedbackStore::new(Arc::clone(&feedback_repo)),
        config.rl.feedback_window_days,
    ));
    let rollback = Arc::new(RollbackMonitor::new(FeedbackStore::new(Arc::clone(&feedback_repo))));

    let discovery = Arc::new(DiscoveryOrchestrator::new(
        Arc::clone(&connections),
        connectors.clone(),
        Arc::clone(&credentials),
        Arc::clone(&automations),
        Arc::clone(&risk),
        Arc::clone(&rl_thresholds),
    ));
    let scheduler = Arc::new(DiscoveryScheduler::new(
        Arc::clone(&discovery),
        Arc::clone(&connections),
        config.discovery.interval_hours,
        config.discovery.fan_out_concurrency,
    ));
    Arc::clone(&scheduler).spawn();

    let quota = Arc::new(QuotaTracker::new(Some(redis.clone())));

    let jwt = JwtService::new(&config.jwt, &config.app.environment)?;
    let gateway = GatewayServer::new(jwt.clone(), config.gateway.clone());
    Arc::clone(&gateway).spawn_periodic_broadcasts();
    spawn_fanout_subscriber(config.redis.url.clone(), Arc::clone(&gateway));

    let publisher = Arc::new(RedisEventPublisher::new(redis.clone()));
    let correlation = Arc::new(CorrelationEngine::new(
        connectors.clone(),
        Arc::clone(&connections),
        Arc::new(HeuristicChainDetector),
        publisher,
        config.correlation.clone(),
    ));
    spawn_correlation_job(Arc::clone(&correlation), Arc::clone(&connections), config.correlation.clone());
    spawn_rollback_check_job(Arc::clone(&rollback), Arc::clone(&rl_thresholds), Arc::clone(&connections));

    let metrics = Arc::new(MetricsService::new(MetricsRegistry::new(config.metrics.clone())));

    let state = AppState {
        config: config.clone(),
        db,
        redis,
        connectors,
        connections: Arc::clone(&connections),
        credentials,
        automations,
        discovery,
        scheduler,
        risk,
        feedback,
        rl_thresholds,
        rollback,
        quota,
        correlation,
        gateway: Arc::clone(&gateway),
        jwt,
        metrics,
    };

    let app = create_app(state, gateway);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "shadowai-api listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn run_migrations(db: &DatabasePool) -> anyhow::Result<()> {
    sqlx::migrate!("../../migrations").run(db.pool()).await?;
    Ok(())
}

/// How often the RL rollback check re-evaluates every tenant/detector
/// pair's feedback quality.
const ROLLBACK_CHECK_INTERVAL: Duration = Duration::from_secs(3600);

/// Periodically re-evaluates every tunable detector for every tenant and
/// neutralizes its learned multiplier if quality has regressed.
fn spawn_rollback_check_job(
    rollback: Arc<RollbackMonitor>,
    rl_thresholds: Arc<RlThresholdService>,
    connections: Arc<dyn ConnectionRepository>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ROLLBACK_CHECK_INTERVAL);
        loop {
            ticker.tick().await;
            let tenants = match connections.list_tenants().await {
                Ok(tenants) => tenants,
                Err(error) => {
                    warn!(%error, "rollback check: failed to list tenants");
                    continue;
                }
            };
            for tenant_id in tenants {
                for detector in shadowai_learning::TUNABLE_DETECTORS {
                    match rollback.check(&rl_thresholds, tenant_id, detector).await {
                        Ok(decision) if decision.rolled_back => {
                            warn!(tenant_id = %tenant_id.0, detector, "rolled back detector threshold multiplier after quality regression");
                        }
                        Ok(_) => {}
                        Err(error) => warn!(tenant_id = %tenant_id.0, detector, %error, "rollback check failed"),
                    }
                }
            }
        }
    });
}

/// Periodically runs cross-platform correlation for every tenant, gated
/// by `enable_real_time_processing` since a deployment that only wants
/// on-demand correlation runs shouldn't pay for a scheduled sweep.
fn spawn_correlation_job(
    correlation: Arc<CorrelationEngine>,
    connections: Arc<dyn ConnectionRepository>,
    config: shadowai_core::config::CorrelationConfig,
) {
    if !config.enable_real_time_processing {
        info!("real-time correlation processing disabled, skipping scheduled correlation ticker");
        return;
    }
    let interval = Duration::from_millis(config.correlation_interval_ms);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let tenants = match connections.list_tenants().await {
                Ok(tenants) => tenants,
                Err(error) => {
                    warn!(%error, "correlation job: failed to list tenants");
                    continue;
                }
            };
            for tenant_id in tenants {
                if let Err(error) = correlation.execute_correlation_analysis(tenant_id, None).await {
                    warn!(tenant_id = %tenant_id.0, %error, "scheduled correlation run failed");
                }
            }
        }
    });
}

async fn init_redis(url: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;
    Ok(manager)
}

fn build_cors_layer(config: &shadowai_core::config::CorsConfig) -> CorsLayer {
    let mut layer = CorsLayer::new();

    layer = if config.allowed_origins.iter().any(|o| o == "*") {
        layer.allow_origin(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = config.allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(origins)
    };

    let methods: Vec<Method> = config.allowed_methods.iter().filter_map(|m| m.parse().ok()).collect();
    layer = layer.allow_methods(methods);

    let headers: Vec<HeaderName> = config.allowed_headers.iter().filter_map(|h| h.parse().ok()).collect();
    layer = layer.allow_headers(headers);

    if !config.expose_headers.is_empty() {
        let expose: Vec<HeaderName> = config.expose_headers.iter().filter_map(|h| h.parse().ok()).collect();
        layer = layer.expose_headers(expose);
    }

    layer = layer.max_age(Duration::from_secs(config.max_age));
    if config.allow_credentials {
        layer = layer.allow_credentials(true);
    }

    layer
}

fn create_app(state: AppState, gateway: Arc<GatewayServer>) -> Router {
    let cors = build_cors_layer(&state.config.cors);

    let ws_router = Router::new().route("/ws", get(GatewayServer::upgrade)).with_state(gateway);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api/v1", handlers::routes())
        .merge(ws_router)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(
                    api_middleware::security_headers::security_headers_middleware,
                ))
                .layer(axum::middleware::from_fn(api_middleware::request_id::request_id_middleware))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    api_middleware::tenant_context::tenant_context_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    api_middleware::quota::quota_middleware,
                ))
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
        .with_state(state)
        .fallback(handler_404)
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

async fn metrics_endpoint(axum::extract::State(state): axum::extract::State<AppState>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.get_metrics(),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    warn!("shutdown signal received, draining in-flight requests");
}
