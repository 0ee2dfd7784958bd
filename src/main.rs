use axum::{
    routing::{get, post},
    Json, Router,
};
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info, warn};

use rifaflow_backend::api;
use rifaflow_backend::codes::{CodeGenerator, FixedWorkerId, HashedHostWorkerId};
use rifaflow_backend::config::AppConfig;
use rifaflow_backend::database::gateway_config_store::{GatewayConfigStore, PgGatewayConfigStore};
use rifaflow_backend::database::memory::{InMemoryGatewayConfigStore, InMemoryPaymentStore};
use rifaflow_backend::database::payment_store::{PaymentStore, PgPaymentStore};
use rifaflow_backend::gateways::vault::{CredentialVault, HttpCredentialVault, PlaintextVault};
use rifaflow_backend::gateways::GatewayManager;
use rifaflow_backend::health::{HealthChecker, HealthState, HealthStatus};
use rifaflow_backend::logging::init_tracing;
use rifaflow_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use rifaflow_backend::services::{LifecycleConfig, PaymentLifecycle, WebhookProcessor};
use rifaflow_backend::workers::{PaymentExpirationConfig, PaymentExpirationWorker};

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

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let skip_externals = std::env::var("SKIP_EXTERNALS")
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        == "true";

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "🚀 Starting RifaFlow backend service"
    );

    // Load and validate configuration
    let config = AppConfig::from_env().map_err(|e| {
        error!("❌ Failed to load configuration: {}", e);
        e
    })?;
    config.validate().map_err(|e| {
        error!("❌ Invalid configuration: {}", e);
        e
    })?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        "Server configuration loaded"
    );

    // Initialize database connection pool
    let db_pool = if skip_externals {
        info!("⏭️  Skipping database initialization (SKIP_EXTERNALS=true)");
        None
    } else {
        info!("📊 Initializing database connection pool...");
        let pool = rifaflow_backend::database::init_pool_from_config(&config.database)
            .await
            .map_err(|e| {
                error!("Failed to initialize database pool: {}", e);
                e
            })?;

        info!(
            max_connections = config.database.max_connections,
            "✅ Database connection pool initialized"
        );
        Some(pool)
    };

    // Wire storage backends
    let (payment_store, config_store): (Arc<dyn PaymentStore>, Arc<dyn GatewayConfigStore>) =
        match &db_pool {
            Some(pool) => (
                Arc::new(PgPaymentStore::new(pool.clone())),
                Arc::new(PgGatewayConfigStore::new(pool.clone())),
            ),
            None => {
                info!("⏭️  Using in-memory stores (SKIP_EXTERNALS=true)");
                (
                    Arc::new(InMemoryPaymentStore::new()),
                    Arc::new(InMemoryGatewayConfigStore::new()),
                )
            }
        };

    // Credential vault for gateway secrets
    let vault: Arc<dyn CredentialVault> = if skip_externals {
        info!("⏭️  Skipping credential vault (SKIP_EXTERNALS=true)");
        Arc::new(PlaintextVault)
    } else {
        match std::env::var("VAULT_URL") {
            Ok(vault_url) => {
                let api_key = std::env::var("VAULT_API_KEY")
                    .map_err(|_| anyhow::anyhow!("VAULT_API_KEY not set"))?;
                info!(vault_url = %vault_url, "🔐 Using HTTP credential vault");
                Arc::new(HttpCredentialVault::new(vault_url, api_key)?)
            }
            Err(_) => {
                warn!("VAULT_URL not set, resolving gateway credentials inline");
                Arc::new(PlaintextVault)
            }
        }
    };

    // Payment code generator
    let codes = match config.codes.worker_id {
        Some(worker_id) => {
            info!(worker_id, "Using fixed code worker id");
            Arc::new(CodeGenerator::new(
                &config.codes.signing_secret,
                &FixedWorkerId(worker_id),
            ))
        }
        None => {
            let source = HashedHostWorkerId::new();
            Arc::new(CodeGenerator::new(&config.codes.signing_secret, &source))
        }
    };
    info!("✅ Payment code generator initialized");

    // Core services
    let manager = Arc::new(GatewayManager::new(config_store.clone(), vault.clone()));
    let lifecycle_config = LifecycleConfig {
        pix_expiration_minutes: config.payments.pix_expiration_minutes,
        platform_fee_bps: config.payments.platform_fee_bps,
        code_prefix: config.codes.prefix.clone(),
    };
    info!(
        pix_expiration_minutes = lifecycle_config.pix_expiration_minutes,
        platform_fee_bps = lifecycle_config.platform_fee_bps,
        "Payment lifecycle configured"
    );
    let lifecycle = Arc::new(PaymentLifecycle::new(
        payment_store.clone(),
        codes.clone(),
        lifecycle_config,
    ));
    let processor = Arc::new(WebhookProcessor::new(manager.clone(), lifecycle.clone()));
    info!("✅ Payment services initialized");

    // Initialize health checker
    info!("🏥 Initializing health checker...");
    let health_checker = HealthChecker::new(db_pool.clone());
    info!("✅ Health checker initialized");

    // Background expiration sweep
    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let expiration_enabled = std::env::var("EXPIRATION_WORKER_ENABLED")
        .unwrap_or_else(|_| "true".to_string())
        .to_lowercase()
        != "false";
    let mut expiration_handle = None;
    if expiration_enabled {
        let worker_config = PaymentExpirationConfig {
            poll_interval: std::time::Duration::from_secs(config.payments.expiration_poll_seconds),
        };
        info!(
            poll_interval_secs = worker_config.poll_interval.as_secs(),
            "Starting payment expiration worker"
        );
        let worker = PaymentExpirationWorker::new(lifecycle.clone(), worker_config);
        expiration_handle = Some(tokio::spawn(worker.run(worker_shutdown_rx)));
    } else {
        info!("Payment expiration worker disabled (EXPIRATION_WORKER_ENABLED=false)");
    }

    // Routes
    let payment_state = api::payments::PaymentApiState {
        manager: manager.clone(),
        lifecycle: lifecycle.clone(),
    };
    let payment_routes = Router::new()
        .route("/api/v1/payments", post(api::payments::create_payment))
        .route(
            "/api/v1/payments/{payment_code}",
            get(api::payments::get_payment),
        )
        .with_state(payment_state);

    let webhook_state = api::webhooks::WebhookApiState {
        processor: processor.clone(),
    };
    let webhook_routes = Router::new()
        .route(
            "/webhooks/pix/{tenant_id}",
            post(api::webhooks::receive_pix_webhook),
        )
        .with_state(webhook_state);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .merge(payment_routes)
        .merge(webhook_routes)
        .with_state(AppState { health_checker })
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    info!("✅ Routes configured");

    // Run the server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    // Print a prominent banner with server information
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                                                              ║");
    println!("║          🎟️  RIFAFLOW BACKEND SERVER IS RUNNING  🎟️           ║");
    println!("║                                                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║                                                              ║");
    println!(
        "║  🌐 Server Address:  http://{}                    ║",
        addr
    );
    println!("║                                                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  📡 AVAILABLE ENDPOINTS:                                     ║");
    println!("║                                                              ║");
    println!("║  GET  /                             - Root endpoint          ║");
    println!("║  GET  /health                       - Health check           ║");
    println!("║  GET  /health/ready                 - Readiness probe        ║");
    println!("║  GET  /health/live                  - Liveness probe         ║");
    println!("║  POST /api/v1/payments              - Create PIX payment     ║");
    println!("║  GET  /api/v1/payments/{{code}}       - Payment lookup        ║");
    println!("║  POST /webhooks/pix/{{tenant_id}}     - Processor webhooks    ║");
    println!("║                                                              ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    info!(
        address = %addr,
        "🚀 Server listening on http://{}",
        addr
    );
    info!("✅ Server is ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = expiration_handle {
        if let Err(e) = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
            error!(error = %e, "Timed out waiting for expiration worker shutdown");
        }
    }

    info!("👋 Server shutdown complete");

    Ok(())
}

// Application state
#[derive(Clone)]
struct AppState {
    health_checker: HealthChecker,
}

// Handlers
async fn root() -> &'static str {
    "RifaFlow payments API"
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    let health_status = state.health_checker.check_health().await;

    // Return 503 if any component is unhealthy
    if matches!(health_status.status, HealthState::Unhealthy) {
        error!("❌ Health check failed - service unhealthy");
        Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    } else {
        Ok(Json(health_status))
    }
}

/// Readiness probe - checks if the service is ready to accept traffic
async fn readiness(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    let result = health(axum::extract::State(state)).await;
    if result.is_err() {
        error!("❌ Readiness check failed");
    }
    result
}

/// Liveness probe - checks if the service is alive (basic check)
async fn liveness() -> &'static str {
    "OK"
}
