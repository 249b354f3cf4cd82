//! API Server Entry Point
//!
//! Application entry point and server initialization.
//! Uses `anyhow` for startup errors, but application-level
//! errors should use `kernel::error::AppError`.

mod config;

use auth::{PgCredentialStore, PgKvStore, auth_router, auth_router_generic, presentation::AuthAppState};
use axum::{
    Json, Router, http,
    http::{Method, header},
    routing::get,
};
use config::{KvBackend, ServerConfig};
use platform::kv::{MemoryKvStore, spawn_purge_task};
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Re-export unified error types for use in handlers
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

const KV_PURGE_INTERVAL: Duration = Duration::from_secs(60);

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                //.unwrap_or_else(|_| "api=debug,auth=debug,tower_http=debug".into()),
                .unwrap_or_else(|_| "api=info,auth=info,platform=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    tracing::info!(
        throttle_limit = config.auth.throttle.max_requests,
        throttle_window_secs = config.auth.throttle.window.as_secs(),
        developer_refs = config.auth.developer_refs.len(),
        kv_backend = ?config.kv_backend,
        "Configuration loaded"
    );
    if !config.auth.developer_refs.is_empty() {
        tracing::warn!("Developer signature bypass is enabled");
    }

    // Database connection
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;

    tracing::info!("Migrations completed");

    let credential_store = PgCredentialStore::new(pool.clone());

    let auth_routes = match config.kv_backend {
        KvBackend::Postgres => {
            // Expired replay records and counters are purged at startup and
            // then periodically; failures never stop the server
            let kv = PgKvStore::new(pool.clone());
            let _purge = spawn_purge_task(Arc::new(kv.clone()), KV_PURGE_INTERVAL);
            auth_router(credential_store, kv, config.auth.clone())
        }
        KvBackend::Memory => {
            tracing::warn!("Replay records are process-local; do not run more than one instance");
            let kv = Arc::new(MemoryKvStore::new());
            let _purge = spawn_purge_task(Arc::clone(&kv), KV_PURGE_INTERVAL);
            auth_router_generic(AuthAppState::new(
                Arc::new(credential_store),
                kv,
                config.auth.clone(),
            ))
        }
    };

    // CORS configuration
    let allowed_origins: Vec<http::HeaderValue> = config
        .frontend_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE, header::ACCEPT]))
        .expose_headers([header::RETRY_AFTER])
        .allow_credentials(true);

    // Build router
    let app = Router::new()
        .route("/api/health", get(health))
        .nest("/api/auth", auth_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = config.bind_addr;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
