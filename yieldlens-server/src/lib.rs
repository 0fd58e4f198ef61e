//! # YieldLens Server
//!
//! axum HTTP API hosting dashboard sessions. Each session is driven through
//! upload, analysis and prediction by a [`DashboardShell`]; results are
//! returned as `SessionView` snapshots.

pub mod error;
pub mod handlers;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use yieldlens_core::{DashboardShell, ServerConfig, SessionStore};

pub use error::ApiError;

/// Shared state behind every handler.
#[derive(Debug)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub shell: DashboardShell,
    pub server: ServerConfig,
    pub started_at: DateTime<Utc>,
}

/// Thread-safe shared state reference for axum handlers.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(server: ServerConfig, shell: DashboardShell) -> SharedState {
        Arc::new(Self {
            store: Arc::new(SessionStore::new()),
            shell,
            server,
            started_at: Utc::now(),
        })
    }
}

/// Build the API router, with the static frontend as fallback when configured.
pub fn router(state: SharedState) -> Router {
    let mut app = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/parameters", get(handlers::parameters_handler))
        .route("/api/sessions", post(handlers::create_session_handler))
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session_handler).delete(handlers::delete_session_handler),
        )
        .route("/api/sessions/{id}/upload", post(handlers::upload_handler))
        .route("/api/sessions/{id}/inputs", put(handlers::set_input_handler))
        .route("/api/sessions/{id}/predict", post(handlers::predict_handler));

    if let Some(dir) = &state.server.frontend_dir {
        let index_file = dir.join("index.html");
        if index_file.exists() {
            info!(frontend_dir = %dir.display(), "Serving static frontend");
            app = app.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index_file)));
        }
    }

    app.layer(DefaultBodyLimit::max(state.server.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Periodically remove idle sessions. Returns `None` when reaping is disabled.
pub fn spawn_reaper(state: SharedState) -> Option<JoinHandle<()>> {
    let ttl_secs = state.server.session_ttl_secs;
    let sweep_secs = state.server.session_sweep_secs;
    if ttl_secs == 0 || sweep_secs == 0 {
        debug!("Idle session reaper disabled");
        return None;
    }
    let ttl = chrono::Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX));

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(sweep_secs));
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = state.store.purge_idle(ttl).await;
            if removed > 0 {
                let remaining = state.store.len().await;
                info!(removed, remaining, "Reaped idle sessions");
            }
        }
    }))
}

/// Bind to `server.host:server.port` and serve until `shutdown` resolves.
pub async fn run<F>(state: SharedState, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.server.bind_addr();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "YieldLens API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;
    use yieldlens_core::ModelGateway;

    fn make_state(server: ServerConfig) -> SharedState {
        AppState::new(server, DashboardShell::new(ModelGateway::unconfigured()))
    }

    #[test]
    fn test_router_builds() {
        let _app = router(make_state(ServerConfig::default()));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(make_state(ServerConfig::default()));

        let req = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["sessions"], 0);
        assert_eq!(json["model_configured"], false);
    }

    #[tokio::test]
    async fn test_frontend_fallback_serves_index() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>YieldLens</h1>").unwrap();
        let app = router(make_state(ServerConfig {
            frontend_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        }));

        let req = axum::http::Request::builder()
            .uri("/dashboard/anything")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<h1>YieldLens</h1>");
    }

    #[tokio::test]
    async fn test_reaper_disabled_without_ttl() {
        let state = make_state(ServerConfig {
            session_ttl_secs: 0,
            ..Default::default()
        });
        assert!(spawn_reaper(state).is_none());
    }

    #[tokio::test]
    async fn test_reaper_removes_idle_sessions() {
        let state = make_state(ServerConfig {
            session_ttl_secs: 1,
            session_sweep_secs: 1,
            ..Default::default()
        });
        state.store.create().await;
        let handle = spawn_reaper(state.clone()).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(3500)).await;
        assert!(state.store.is_empty().await);
        handle.abort();
    }
}
