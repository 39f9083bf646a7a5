// ============================================================================
// API Gateway Service
// ============================================================================
//
// Authenticates callers by API key, throttles them per key and forwards
// `/proxy/{service_slug}/...` to the registered upstream service.
//
// Startup:
// - Configuration from env (.env honoured)
// - PostgreSQL pool + migrations (credentials, services, audit trail)
// - Redis connection (rate limit counters)
// - axum server with graceful shutdown on Ctrl-C / SIGTERM
//
// ============================================================================

use anyhow::{Context, Result};
use gateway_server::cache::RedisCache;
use gateway_server::config::{Config, LogFormat};
use gateway_server::db;
use gateway_server::gateway::{build_router, GatewaySettings, GatewayState};
use gateway_server::storage::PgStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::new(config.rust_log.clone());
    match config.logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    info!("=== API Gateway Service Starting ===");
    info!("Port: {}", config.port);
    info!(
        "Rate limit: {} requests / {}s per API key",
        config.rate_limit.max_requests, config.rate_limit.window_secs
    );
    info!("Upstream timeout: {}s", config.proxy.upstream_timeout_secs);

    // Initialize dependencies
    let pool = db::create_pool(&config.database_url, &config.db).await?;
    db::run_migrations(&pool).await?;
    info!("Connected to database");

    let cache = RedisCache::connect(&config.redis_url).await?;
    info!("Connected to Redis");

    let state = GatewayState::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(cache),
        GatewaySettings::from_config(&config),
    )?;
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = config
        .bind_addr()
        .parse()
        .context("Failed to parse bind address")?;

    info!("API Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to start server")?;

    info!("API Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
