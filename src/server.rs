//!
//! nfsgate HTTP server
//! -------------------
//! Axum router for the file gateway and the account/admin API.
//!
//! Responsibilities:
//! - Bearer-token authentication through the `Authenticated`/`AdminPrincipal` extractors.
//! - File routes delegating to `FileGateway`, with range-aware streaming.
//! - Account routes delegating to `AuthService`; admin routes to `Repository`.
//! - CORS for the configured browser origins and request tracing.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{
    ACCEPT_RANGES, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE,
};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::AuthService;
use crate::config::GatewayConfig;
use crate::error::{AppError, AppResult};
use crate::files::{FileGateway, Sandbox};
use crate::identity::{JwtAuthority, LoginThrottle};
use crate::monitor::Monitor;
use crate::repository::Repository;

pub mod admin_api;
pub mod auth_api;
pub mod extract;
pub mod files_api;
pub mod response;

/// Shared state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub auth: Arc<AuthService>,
    pub files: FileGateway,
    pub monitor: Arc<Monitor>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, auth: AuthService, files: FileGateway, monitor: Monitor) -> Self {
        Self { repo, auth: Arc::new(auth), files, monitor: Arc::new(monitor) }
    }

    /// Open the data documents and the sandbox named by `cfg`.
    pub fn from_config(cfg: &GatewayConfig) -> anyhow::Result<Self> {
        let repo = Arc::new(
            Repository::open(&cfg.data_dir)
                .with_context(|| format!("opening documents under {}", cfg.data_dir.display()))?,
        );
        if cfg.fs_root.as_path() == std::path::Path::new(crate::config::DEFAULT_FS_ROOT) {
            std::fs::create_dir_all(&cfg.fs_root)
                .with_context(|| format!("creating filesystem root {}", cfg.fs_root.display()))?;
        }
        let sandbox = Sandbox::new(&cfg.fs_root)
            .with_context(|| format!("opening filesystem root {}", cfg.fs_root.display()))?
            .with_hidden(&cfg.data_dir)
            .with_context(|| format!("reserving data dir {}", cfg.data_dir.display()))?;
        if sandbox.hides_anything() {
            warn!(
                target: "startup",
                data_dir = %cfg.data_dir.display(),
                fs_root = %cfg.fs_root.display(),
                "data dir lies inside the filesystem root; it is withheld from file routes"
            );
        }
        let jwt = Arc::new(JwtAuthority::new(&cfg.jwt_secret)?);
        let auth = AuthService::new(repo.clone(), jwt.clone(), jwt, LoginThrottle::new(cfg.throttle.clone()))?;
        let monitor = Monitor::new(sandbox.root().to_path_buf(), cfg.monitor.clone());
        Ok(Self::new(repo, auth, FileGateway::new(sandbox), monitor))
    }
}

/// Run repository or password-hashing work on the blocking pool; both hold
/// synchronous locks or burn CPU that must not stall the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal("task_join_failed", format!("join error: {}", e)))?
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(target: "startup", origin = %o, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, RANGE])
        .expose_headers([
            CONTENT_RANGE,
            CONTENT_LENGTH,
            CONTENT_DISPOSITION,
            ACCEPT_RANGES,
            HeaderName::from_static(response::PREVIEW_TRUNCATED_HEADER),
        ])
        .allow_credentials(true)
}

/// All routes, without CORS or tracing layers.
pub fn build_router(state: AppState) -> Router {
    let files = Router::new()
        .route("/api/files", get(files_api::list).delete(files_api::delete))
        .route("/api/files/folder", post(files_api::create_folder))
        .route(
            "/api/files/upload",
            post(files_api::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/files/rename", put(files_api::rename))
        .route("/api/files/info", get(files_api::info))
        .route("/api/files/stream", get(files_api::stream))
        .route("/api/files/download", get(files_api::download))
        .route("/api/files/preview", get(files_api::preview));

    let account = Router::new()
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/profile", get(auth_api::profile).put(auth_api::update_profile))
        .route("/api/generate-2fa-secret", post(auth_api::generate_two_factor))
        .route("/api/verify-2fa", post(auth_api::verify_two_factor))
        .route("/api/disable-2fa", post(auth_api::disable_two_factor))
        .route("/api/logout", post(auth_api::logout))
        .route("/api/change-password", post(auth_api::change_password));

    let admin = Router::new()
        .route("/api/monitoring", get(admin_api::monitoring))
        .route("/api/admin/users", get(admin_api::list_users).post(admin_api::create_user))
        .route("/api/admin/users/bulk-delete", post(admin_api::bulk_delete_users))
        .route(
            "/api/admin/users/{id}",
            get(admin_api::get_user).put(admin_api::update_user).delete(admin_api::delete_user),
        )
        .route("/api/admin/users/{id}/disable-2fa", post(admin_api::disable_user_two_factor))
        .route("/api/admin/roles", get(admin_api::list_roles).post(admin_api::create_role))
        .route(
            "/api/admin/roles/{id}",
            get(admin_api::get_role).put(admin_api::update_role).delete(admin_api::delete_role),
        )
        .route("/api/admin/settings", get(admin_api::get_settings).put(admin_api::replace_settings))
        .route("/api/admin/audit-logs", get(admin_api::audit_logs));

    Router::new()
        .route("/", get(|| async { "nfsgate ok" }))
        .merge(files)
        .merge(account)
        .merge(admin)
        .with_state(state)
}

fn log_startup(cfg: &GatewayConfig) {
    let cwd = std::env::current_dir().ok();
    info!(
        target: "startup",
        "nfsgate starting: cwd={:?}, data_dir={:?}, fs_root={:?}, http_port={}, cors_origins={:?}",
        cwd, cfg.data_dir, cfg.fs_root, cfg.http_port, cfg.cors_origins
    );
    info!(
        target: "startup",
        "Path existence: data_dir_exists={}, fs_root_exists={}",
        cfg.data_dir.exists(),
        cfg.fs_root.exists()
    );
}

/// Serve the API on `cfg.http_port` until the process is stopped.
pub async fn run(cfg: GatewayConfig) -> anyhow::Result<()> {
    log_startup(&cfg);
    let state = AppState::from_config(&cfg)?;
    let app = build_router(state)
        .layer(cors_layer(&cfg.cors_origins))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_passes_results_through() {
        assert_eq!(blocking(|| Ok(7)).await.unwrap(), 7);
        let err = blocking(|| -> AppResult<()> { Err(AppError::user("bad_input", "nope")) }).await.unwrap_err();
        assert_eq!(err.code_str(), "bad_input");
    }

    #[tokio::test]
    async fn blocking_turns_a_panic_into_an_internal_error() {
        let err = blocking(|| -> AppResult<()> { panic!("boom") }).await.unwrap_err();
        assert_eq!(err.code_str(), "task_join_failed");
        assert_eq!(err.http_status(), 500);
    }
}
