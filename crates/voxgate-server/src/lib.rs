//! voxgate server library logic.

pub mod api;
pub mod bridge;
pub mod config;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Extension, Json, Router,
};
use bridge::VoiceBridge;
use config::{Config, StoreBackend};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use voxgate_db::{create_pool, run_migrations, DbRuntimeSettings, MigrationError, PoolError};
use voxgate_forward::{Forwarder, ForwarderConfig};
use voxgate_vault::{
    sanitize_file_name, CredentialCodec, CredentialResolver, CredentialStore,
    FileCredentialStore, FileNameError, KeyError, MasterKey, SqliteCredentialStore,
};

/// Maximum accepted request body (64 KiB). Voice webhooks are small.
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Provisioning API settings as seen by handlers.
#[derive(Clone, Default)]
pub struct AdminSettings {
    /// Bearer token for `/api/credentials`. `None` leaves the API unmounted.
    pub token: Option<String>,
    /// Accept `http://` endpoints.
    pub allow_insecure_endpoints: bool,
}

impl std::fmt::Debug for AdminSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSettings")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("allow_insecure_endpoints", &self.allow_insecure_endpoints)
            .finish()
    }
}

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Credential resolution plus upstream forwarding.
    pub bridge: VoiceBridge,
    /// Provisioning API settings.
    pub admin: AdminSettings,
}

/// Failures that stop the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("master key: {0}")]
    Key(#[from] KeyError),

    #[error("invalid credentials file name: {0}")]
    FileName(#[from] FileNameError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("failed to get database connection for migrations: {0}")]
    Connection(#[from] r2d2::Error),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

impl AppState {
    /// Loads (or creates) the master key, opens the configured credential
    /// backend and wires up the bridge.
    ///
    /// File names are validated before the key file is touched.
    ///
    /// # Errors
    ///
    /// Any [`StartupError`]; none of them is recoverable at runtime.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let data_dir = Path::new(&config.vault.data_dir);
        sanitize_file_name(&config.vault.credentials_file)?;
        let key = MasterKey::load_or_generate(data_dir, &config.vault.key_file)?;
        let codec = Arc::new(CredentialCodec::new(&key));
        tracing::info!(fingerprint = codec.key_fingerprint(), "master key loaded");

        let store: Arc<dyn CredentialStore> = match config.vault.backend {
            StoreBackend::Sqlite => {
                let pool = create_pool(
                    &config.database.path,
                    DbRuntimeSettings {
                        busy_timeout_ms: config.database.busy_timeout_ms,
                        pool_max_size: config.database.pool_max_size,
                    },
                )?;
                let conn = pool.get()?;
                let applied = run_migrations(&conn)?;
                if applied > 0 {
                    tracing::info!(count = applied, "applied database migrations");
                }
                drop(conn);
                Arc::new(SqliteCredentialStore::new(pool))
            }
            StoreBackend::File => Arc::new(FileCredentialStore::new(
                data_dir,
                &config.vault.credentials_file,
            )?),
        };
        tracing::info!(backend = store.backend(), "credential store ready");

        let forwarder = Forwarder::new(ForwarderConfig {
            timeout: config.forward.timeout(),
            probe_timeout: config.forward.probe_timeout(),
        });

        Ok(Self {
            bridge: VoiceBridge::new(CredentialResolver::new(store, codec), forwarder),
            admin: AdminSettings {
                token: config.admin.token.clone(),
                allow_insecure_endpoints: config.admin.allow_insecure_endpoints,
            },
        })
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
///
/// The provisioning routes exist only when an admin token is configured.
pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/query", post(bridge::query_handler));

    if state.admin.token.is_some() {
        let admin_routes = Router::new()
            .route("/api/credentials/test", post(api::test_credential_handler))
            .route(
                "/api/credentials/{userId}",
                put(api::put_credential_handler),
            )
            .layer(axum::middleware::from_fn(middleware::admin_auth_middleware));
        router = router.merge(admin_routes);
    } else {
        tracing::info!("no admin token configured, provisioning API disabled");
    }

    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
