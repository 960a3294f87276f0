//! HTTP server.
//!
//! This module implements the HTTP server that:
//! - Accepts tag push webhooks from GitLab and GitHub and dispatches releases
//! - Accepts direct release requests
//! - Serves the project catalog and the built artifacts
//! - Provides a health check for liveness probes
//!
//! # Endpoints
//!
//! - `POST /listen/gitlab`, `POST /listen/github` - Webhook deliveries
//! - `POST /api/v1/release` - Direct release request (202 Accepted)
//! - `POST /api/v1/project` - Legacy alias of the direct release request
//! - `GET /api/v1/project` - All projects with their releases
//! - `GET /api/v1/project/{id}` - One stored project
//! - `GET /releases/{id}/{version}/{file}` - Artifact download
//! - `GET /_health` - Returns 200 if the server is running

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;

use crate::catalog::CatalogBackend;
use crate::config::{Config, ProviderConfig};
use crate::dispatch::Dispatcher;
use crate::types::CorrelationId;
use crate::webhooks::Provider;

pub mod download;
pub mod error;
pub mod health;
pub mod middleware;
pub mod project;
pub mod release;
pub mod webhook;

pub use download::download_handler;
pub use error::ApiError;
pub use health::health_handler;
pub use project::{get_handler, list_handler};
pub use release::release_handler;
pub use webhook::{github_handler, gitlab_handler};

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    dispatcher: Dispatcher,
    catalog: Arc<CatalogBackend>,
}

impl AppState {
    pub fn new(config: Config, dispatcher: Dispatcher, catalog: Arc<CatalogBackend>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                config,
                dispatcher,
                catalog,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn catalog(&self) -> &CatalogBackend {
        &self.inner.catalog
    }

    /// Webhook settings for a provider.
    pub fn provider_settings(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::Gitlab => &self.inner.config.integrations.gitlab,
            Provider::Github => &self.inner.config.integrations.github,
        }
    }
}

/// `{"status":"ok"}`
#[derive(Debug, Clone, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
}

impl StatusBody {
    pub fn ok() -> Self {
        StatusBody { status: "ok" }
    }
}

/// The caller's correlation ID, as stored by the request middleware.
#[derive(Debug, Clone)]
pub struct Correlation(pub Option<CorrelationId>);

impl<S: Send + Sync> FromRequestParts<S> for Correlation {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Correlation(parts.extensions.get::<CorrelationId>().cloned()))
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/listen/gitlab", post(gitlab_handler))
        .route("/listen/github", post(github_handler))
        .route("/api/v1/release", post(release_handler))
        .route("/api/v1/project", post(release_handler).get(list_handler))
        .route("/api/v1/project/{id}", get(get_handler))
        .route("/releases/{id}/{version}/{file}", get(download_handler))
        .route("/_health", get(health_handler))
        .layer(axum::middleware::from_fn(middleware::trace_requests))
        .with_state(app_state)
}
