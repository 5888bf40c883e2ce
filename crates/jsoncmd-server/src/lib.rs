//! jsoncmd Server - JSON command dispatch over HTTP
//!
//! A standalone axum server around `jsoncmd-core`, providing:
//! - `GET|POST <prefix>/<target>/<operation>` command endpoint
//! - `GET /api/targets` registry discovery
//! - `GET /api/health` liveness check
//!
//! This crate can be used standalone (see `jsoncmd serve`) or embedded in
//! other applications with their own registry via [`start_server_with_state`].

pub mod api;
pub mod controllers;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use jsoncmd_core::DispatchConfig;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::state::{AppState, AppStateInner};

pub const DEFAULT_PREFIX: &str = "/json";

/// Configuration for the jsoncmd server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Mount point of the command endpoint. Empty or `/` mounts at the root.
    pub prefix: String,
    pub dispatch: DispatchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3210,
            prefix: DEFAULT_PREFIX.to_string(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl ServerConfig {
    /// The normalized mount prefix (`/x/y`), or `None` for the root.
    pub fn mount_prefix(&self) -> Option<String> {
        let trimmed = self.prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(format!("/{}", trimmed))
        }
    }
}

/// Create a shared `AppState` serving the built-in controllers.
///
/// Applications with their own targets build an `AppStateInner` around
/// their registry instead.
pub fn create_app_state(config: &ServerConfig) -> Result<AppState, String> {
    let registry = controllers::default_registry()
        .map_err(|e| format!("Failed to register built-in controllers: {}", e))?;
    Ok(Arc::new(AppStateInner::new(
        Arc::new(registry),
        config.dispatch.clone(),
    )))
}

/// Build the full axum application for `state`.
pub fn build_router(config: &ServerConfig, state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let commands = api::command::router();
    let router = Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check));
    let router = match config.mount_prefix() {
        Some(prefix) => router.nest(&prefix, commands),
        None => router.merge(commands),
    };

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install the default `tracing` subscriber unless one is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jsoncmd_core=info,jsoncmd_server=info,tower_http=info".into()),
        )
        .try_init();
}

/// Start the jsoncmd server with the built-in controllers.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig) -> Result<SocketAddr, String> {
    init_tracing();

    tracing::info!(
        "[Server] Starting jsoncmd server on {}:{}",
        config.host,
        config.port
    );

    let state = create_app_state(&config)?;

    start_server_with_state(config, state).await
}

/// Start the HTTP server with a pre-built `AppState`.
///
/// This variant is useful when the application registers its own targets.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    let app = build_router(&config, state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!(
        "[Server] jsoncmd server listening on {} (commands at {})",
        local_addr,
        config.mount_prefix().unwrap_or_else(|| "/".to_string())
    );

    // Spawn the server in a background task
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("[Server] Server error: {}", e);
        }
    });

    Ok(local_addr)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "jsoncmd-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
