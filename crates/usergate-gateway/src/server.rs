//! Gateway server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, extract::FromRef, routing::get};
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use usergate_core::Config;

use crate::GatewayError;
use crate::auth::{AuthState, setup::auto_setup_from_env};
use crate::handlers::users;
use crate::mail::{LogMailer, Mailer};
use crate::upload::ImagePolicy;

/// Interval between sweeps of expired revocations and reset tokens.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// State shared by every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Authentication components.
    pub auth: Arc<AuthState>,
    /// Profile image storage.
    pub uploads: Arc<ImagePolicy>,
}

impl FromRef<AppState> for Arc<AuthState> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for Arc<ImagePolicy> {
    fn from_ref(state: &AppState) -> Self {
        state.uploads.clone()
    }
}

/// Usergate HTTP gateway.
pub struct Gateway {
    config: Config,
    db: sled::Db,
    state: AppState,
}

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
    config: Config,
    db: Option<sled::Db>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl GatewayBuilder {
    /// Create a new builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            db: None,
            mailer: None,
        }
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use an already opened database instead of `<data_dir>/db`.
    #[must_use]
    pub fn with_db(mut self, db: sled::Db) -> Self {
        self.db = Some(db);
        self
    }

    /// Set the mailer used for password reset links.
    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the database
    /// cannot be opened.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let db = match self.db {
            Some(db) => db,
            None => {
                let data_dir = config.data_dir();
                std::fs::create_dir_all(&data_dir)?;
                sled::open(data_dir.join("db"))
                    .map_err(|e| GatewayError::Config(format!("Failed to open database: {e}")))?
            }
        };

        let mailer = self.mailer.unwrap_or_else(|| Arc::new(LogMailer));
        let auth = AuthState::initialize(&config, &db, mailer)
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        // A bad seed should not keep the server from starting.
        if let Err(e) = auto_setup_from_env(&auth.accounts, &config.uploads.default_image) {
            tracing::warn!(error = %e, "Admin auto-setup failed");
        }

        let state = AppState {
            auth: Arc::new(auth),
            uploads: Arc::new(ImagePolicy::from_config(&config)),
        };

        Ok(Gateway { config, db, state })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    /// Create a gateway from `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the gateway cannot be built.
    pub fn new(config: Config) -> Result<Self, GatewayError> {
        GatewayBuilder::new().with_config(config).build()
    }

    /// Shared handler state.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.config)
    }

    /// Spawn the periodic expiry sweep.
    #[must_use]
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let auth = self.state.auth.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                auth.sweep_expired().await;
            }
        })
    }

    /// Run the gateway server until it fails or receives Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or serve.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let app = self.router();

        let addr: SocketAddr = format!("{}:{}", self.config.server.bind, self.config.server.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Usergate API listening on http://{}", addr);

        let sweeper = self.spawn_sweeper();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::Server(e.to_string()));
        sweeper.abort();

        if let Err(e) = self.db.flush_async().await {
            tracing::warn!(error = %e, "Failed to flush database");
        }
        tracing::info!("Usergate API stopped");
        result
    }
}

/// Assemble the router for `state`.
pub fn build_router(state: AppState, config: &Config) -> Router {
    let app = Router::new()
        .route("/health", get(health_handler))
        .nest("/api/users", users::routes(config.uploads.max_bytes))
        .with_state(state)
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(TraceLayer::new_for_http());

    if config.server.cors {
        app.layer(CorsLayer::very_permissive())
    } else {
        app
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn gateway(dir: &TempDir) -> Gateway {
        let mut config = Config::default();
        config.server.data_dir = Some(dir.path().to_path_buf());
        Gateway::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_build_opens_data_dir() {
        let dir = TempDir::new().unwrap();
        let gateway = gateway(&dir);
        assert!(dir.path().join("db").exists());
        assert!(gateway.state().auth.accounts.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.server.data_dir = Some(dir.path().to_path_buf());
        config.session.ttl_minutes = 0;
        assert!(matches!(Gateway::new(config), Err(GatewayError::Config(_))));
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let response = gateway(&dir)
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
