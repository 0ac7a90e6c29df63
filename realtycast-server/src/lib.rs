//! HTTP surface of the social publishing engine
//!
//! Every route lives under `/api/social`. Handlers are thin: they resolve the
//! caller, apply the rate limit for their scope and delegate to
//! [`RealtycastService`].

pub mod auth;
pub mod cookies;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use librealtycast::RealtycastService;

pub struct AppState {
    pub service: RealtycastService,
}

impl AppState {
    pub fn new(service: RealtycastService) -> Self {
        Self { service }
    }

    /// Configured cron secret, ignoring an empty value
    pub fn cron_secret(&self) -> Option<&str> {
        self.service
            .config()
            .server
            .cron_secret
            .as_deref()
            .filter(|s| !s.is_empty())
    }

    /// Whether cookies should carry the `Secure` attribute
    pub fn secure_cookies(&self) -> bool {
        self.service.config().server.public_url.starts_with("https://")
    }
}

/// Build the full router for a service
pub fn build_router(service: RealtycastService) -> Router {
    let state = Arc::new(AppState::new(service));
    Router::new()
        .nest("/api/social", routes::build_routes())
        .with_state(state)
}
