use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

use payconfirm_backend::api::checkout::{
    get_checkout, initiate_checkout, resume_checkout, CheckoutApiState,
};
use payconfirm_backend::api::webhooks::{handle_gateway_webhook, WebhookState};
use payconfirm_backend::config::{DatabaseConfig, ServerConfig};
use payconfirm_backend::database::memory::MemoryRecordStore;
use payconfirm_backend::database::payment_record_repository::PaymentRecordRepository;
use payconfirm_backend::database::record_store::PaymentRecordStore;
use payconfirm_backend::database::{init_pool, PoolConfig};
use payconfirm_backend::gateway::{HttpGateway, PaymentGateway};
use payconfirm_backend::health::{HealthChecker, HealthState};
use payconfirm_backend::logging::init_tracing;
use payconfirm_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use payconfirm_backend::notify::StatusChannel;
use payconfirm_backend::reconcile::ReconcilePolicy;
use payconfirm_backend::services::checkout::CheckoutService;
use payconfirm_backend::services::finalizer::{LoggingFinalizer, OrderFinalizer};
use payconfirm_backend::services::webhook_ingest::WebhookIngestor;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
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

    info!("shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    // Active reconciliation loops drain here; their records stay pending and
    // can be resumed after restart.
    let _ = shutdown_tx.send(true);
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "payconfirm-backend",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(checker): State<HealthChecker>) -> impl IntoResponse {
    let status = checker.check().await;
    let code = if status.status == HealthState::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenv::dotenv().ok();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "starting payconfirm backend service"
    );

    let server_config = ServerConfig::from_env()?;
    server_config.validate()?;

    // Record store: Postgres by default, in-memory for local development.
    let use_memory_store = std::env::var("RECORD_STORE")
        .map(|v| v.eq_ignore_ascii_case("memory"))
        .unwrap_or(false);

    let (db_pool, store): (Option<sqlx::PgPool>, Arc<dyn PaymentRecordStore>) = if use_memory_store
    {
        info!("using in-memory record store (RECORD_STORE=memory)");
        (None, Arc::new(MemoryRecordStore::new()))
    } else {
        let db_config = DatabaseConfig::from_env()?;
        db_config.validate()?;
        let pool = init_pool(&db_config.url, Some(PoolConfig::from_config(&db_config)))
            .await
            .map_err(|e| {
                error!(error = %e, "failed to initialize database pool");
                anyhow::anyhow!(e)
            })?;
        (
            Some(pool.clone()),
            Arc::new(PaymentRecordRepository::new(pool)),
        )
    };

    let gateway: Arc<dyn PaymentGateway> = Arc::new(HttpGateway::from_env().map_err(|e| {
        error!(error = %e, "failed to initialize payment gateway client");
        anyhow::anyhow!(e.to_string())
    })?);

    let policy = ReconcilePolicy::from_env();
    policy
        .validate()
        .map_err(|message| anyhow::anyhow!(message))?;
    info!(
        poll_interval_secs = policy.poll_interval.as_secs(),
        fallback_after_attempts = policy.fallback_after_attempts,
        max_attempts = policy.max_attempts,
        "reconciliation policy loaded"
    );

    let signals = StatusChannel::new();
    let finalizer: Arc<dyn OrderFinalizer> = Arc::new(LoggingFinalizer);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let service = Arc::new(CheckoutService::new(
        store.clone(),
        gateway.clone(),
        finalizer,
        signals.clone(),
        policy,
        shutdown_rx,
    ));
    let ingestor = Arc::new(WebhookIngestor::new(gateway, store, signals));
    let health_checker = HealthChecker::new(db_pool);

    let checkout_routes = Router::new()
        .route("/api/checkout", post(initiate_checkout))
        .route("/api/checkout/{reference}", get(get_checkout))
        .route("/api/checkout/{reference}/reconcile", post(resume_checkout))
        .with_state(CheckoutApiState { service });

    let webhook_routes = Router::new()
        .route("/webhooks/gateway", post(handle_gateway_webhook))
        .with_state(WebhookState { ingestor });

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(health_checker)
        .merge(checkout_routes)
        .merge(webhook_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, address = %addr, "failed to bind");
        e
    })?;

    info!(address = %addr, "payconfirm backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx))
        .await?;

    info!("server stopped");
    Ok(())
}
