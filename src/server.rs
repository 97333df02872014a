use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower_http::cors::CorsLayer;

use crate::api::{self, AppState, SharedState};
use crate::config::TracboardConfig;
use crate::db::{Db, DbHandle};
use crate::scope::{ProjectRegistry, ScopeFilter, StaticGroups};

/// Configuration for the HTTP server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3142,
            dev_mode: false,
        }
    }
}

/// Scope filter with the built-in groups plus any `[groups]` table.
pub fn build_filter(config: &TracboardConfig) -> ScopeFilter {
    let filter = ScopeFilter::new(config.scope.max_closure_depth);
    let groups = StaticGroups::from_table(&config.groups);
    if groups.is_empty() {
        filter
    } else {
        filter.with_provider(groups)
    }
}

pub fn build_state(db: Db, config: &TracboardConfig) -> SharedState {
    Arc::new(AppState {
        db: DbHandle::new(db),
        registry: Arc::new(ProjectRegistry::new()),
        filter: Arc::new(build_filter(config)),
        rank_policy: config.board.rank_policy,
        required_permission: config.board.required_permission.clone(),
    })
}

pub fn build_router(state: SharedState) -> Router {
    api::api_router().fallback(not_found).with_state(state)
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "no such route"})),
    )
        .into_response()
}

/// Open the database, warm the registry and serve until Ctrl+C.
pub async fn start_server(config: ServerConfig, app_config: &TracboardConfig) -> Result<()> {
    let db_path = &app_config.database.path;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = Db::open(db_path).context("Failed to initialize tracboard database")?;
    let state = build_state(db, app_config);
    {
        let db = state.db.lock_sync()?;
        state
            .registry
            .reload(&db)
            .context("Failed to load scope registry")?;
    }

    let mut app = build_router(state);
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, db = %db_path.display(), "tracboard listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
}
