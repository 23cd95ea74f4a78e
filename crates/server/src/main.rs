use std::sync::Arc;

use server::clients::hardware::{PortDirectory, SystemPorts};
use server::config;
use server::relay::{ConnectionManager, TracingArchive};
use server::routes;

use axum::{routing::get, Extension, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        "Relay settings: grace window {:?}, retention {:?}, duplicate policy {:?}",
        config.relay.grace_window,
        config.relay.retention,
        config.relay.duplicate_policy
    );

    let relay = ConnectionManager::new(config.relay.clone(), Arc::new(TracingArchive));
    let ports: Arc<dyn PortDirectory> = Arc::new(SystemPorts);

    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        // Live relay
        .route("/ws/live", get(routes::live_ws::ws_handler))
        .route("/api/live-games", get(routes::live::list_live_games))
        .route("/api/live-games/{game_id}", get(routes::live::get_live_game))
        // Board hardware discovery
        .route("/api/hardware/ports", get(routes::hardware::list_ports))
        // Shared state
        .layer(Extension(relay))
        .layer(Extension(ports))
        .layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
