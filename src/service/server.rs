use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use serde::Serialize;
use tokio::signal::ctrl_c;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::api::{self, AppState};
use super::db::{BoardDb, DbHandle};
use super::identity::{DEFAULT_IDENTITY_HEADER, HeaderAuthenticator};

pub const DEMO_USER_NAME: &str = "Test User";
pub const DEMO_USER_EMAIL: &str = "test@example.com";

/// Configuration for the board server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Explicit bind host. When unset, dev mode binds all interfaces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub db_path: PathBuf,
    pub identity_header: String,
    pub dev_mode: bool,
    pub seed_demo_user: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: None,
            db_path: PathBuf::from(".taskboard/taskboard.db"),
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            dev_mode: false,
            seed_demo_user: false,
        }
    }
}

impl ServerConfig {
    pub fn bind_host(&self) -> &str {
        match &self.host {
            Some(host) => host,
            None if self.dev_mode => "0.0.0.0",
            None => "127.0.0.1",
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host(), self.port)
    }
}

/// Build the application router: API routes plus request tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the database (creating its directory), seed the demo account if
/// configured, and assemble the shared state.
pub fn prepare_state(config: &ServerConfig) -> Result<Arc<AppState>> {
    if let Some(parent) = config.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = BoardDb::new(&config.db_path).context("Failed to initialize board database")?;
    if config.seed_demo_user {
        let user = db.ensure_user(DEMO_USER_NAME, DEMO_USER_EMAIL)?;
        info!(user_id = user.id, email = DEMO_USER_EMAIL, "Demo user ready");
    }

    let authenticator = HeaderAuthenticator::from_name(&config.identity_header)?;
    let state = AppState::new(DbHandle::new(db)).with_authenticator(Arc::new(authenticator));
    Ok(Arc::new(state))
}

/// Start the board server and run until a shutdown signal arrives.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let state = prepare_state(&config)?;
    let mut app = build_router(state);

    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        db = %config.db_path.display(),
        dev_mode = config.dev_mode,
        "Taskboard server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let db = BoardDb::new_in_memory().unwrap();
        build_router(Arc::new(AppState::new(DbHandle::new(db))))
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let app = test_router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_routes_mounted() {
        let app = test_router();
        let req = Request::builder()
            .uri("/api/boards")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = test_router();
        let req = Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_bind_host_follows_dev_mode() {
        let mut config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:5000");
        config.dev_mode = true;
        assert_eq!(config.bind_host(), "0.0.0.0");
        config.host = Some("10.0.0.5".into());
        assert_eq!(config.bind_host(), "10.0.0.5");
    }

    #[test]
    fn test_prepare_state_creates_db_and_seeds_demo_user() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = ServerConfig {
            db_path: dir.path().join("nested").join("board.db"),
            seed_demo_user: true,
            ..Default::default()
        };

        let state = prepare_state(&config)?;
        assert!(config.db_path.exists());
        let user = state.db.lock_sync()?.find_user_by_email(DEMO_USER_EMAIL)?;
        assert_eq!(user.map(|u| u.name), Some(DEMO_USER_NAME.to_string()));

        // Reopening does not duplicate the seeded account.
        drop(state);
        let state = prepare_state(&config)?;
        assert!(state.db.lock_sync()?.find_user_by_email(DEMO_USER_EMAIL)?.is_some());
        Ok(())
    }

    #[test]
    fn test_prepare_state_rejects_bad_identity_header() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            db_path: dir.path().join("board.db"),
            identity_header: "not a header".into(),
            ..Default::default()
        };
        assert!(prepare_state(&config).is_err());
    }
}
