//! HTTP route wiring and shared application state.

pub mod auth;
pub mod error;
pub mod health;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_cookies::CookieManagerLayer;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::auth::{PocketBase, ProviderFactory};
use crate::config::GatewayConfig;
use crate::gateway;

/// Shared application state. Everything here is immutable or internally
/// synchronized; per-request auth state lives in the provider sessions the
/// factory opens.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub provider: Arc<dyn ProviderFactory>,
    /// Client for upstream forwarding in proxy mode. Redirects are not
    /// followed; the upstream's redirects belong to the end user.
    pub http_client: reqwest::Client,
    pub static_files: ServeDir,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let provider = Arc::new(PocketBase::new(config.pocketbase_url.clone()));
        Self::with_provider(config, provider)
    }

    /// Construct state with a custom provider factory. Used by tests to
    /// substitute a scripted provider.
    pub fn with_provider(config: GatewayConfig, provider: Arc<dyn ProviderFactory>) -> Self {
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();
        let static_files = ServeDir::new(&config.static_dir);

        Self {
            config: Arc::new(config),
            provider,
            http_client,
            static_files,
        }
    }
}

/// Build the gateway router.
///
/// The login page, credential exchange, logout, verify, and health endpoints
/// always bypass the pipeline; every other path falls through to the
/// mode-dependent protected dispatch.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/auth/verify", get(auth::verify))
        .route("/login", get(auth::login_page))
        .route("/api/cookie", post(auth::exchange_cookie))
        .route("/api/logout", post(auth::logout))
        .route("/healthz", get(health::healthz))
        .fallback(gateway::dispatch)
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
