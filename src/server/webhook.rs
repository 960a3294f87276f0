//! Webhook endpoint handlers.
//!
//! A delivery is classified synchronously; actionable tag pushes are
//! validated and dispatched to the worker pool before the response is sent,
//! so a 200 means the release request is in the transport. Ignored deliveries
//! also get a 200. A tag push whose derived request has an empty field (a
//! bare `refs/tags/` ref, or no clone URL template configured) gets a 400.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use tracing::{debug, info};

use super::release::dispatch_release;
use super::{ApiError, AppState, Correlation, StatusBody};
use crate::webhooks::{FilterOutcome, Provider, WebhookHeaders, classify};

/// `POST /listen/gitlab`
pub async fn gitlab_handler(
    State(app_state): State<AppState>,
    correlation: Correlation,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusBody>, ApiError> {
    handle_delivery(Provider::Gitlab, &app_state, correlation, &headers, &body).await
}

/// `POST /listen/github`
pub async fn github_handler(
    State(app_state): State<AppState>,
    correlation: Correlation,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusBody>, ApiError> {
    handle_delivery(Provider::Github, &app_state, correlation, &headers, &body).await
}

async fn handle_delivery(
    provider: Provider,
    app_state: &AppState,
    Correlation(correlation_id): Correlation,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<StatusBody>, ApiError> {
    let webhook_headers = WebhookHeaders::new(
        header(headers, provider.event_header()),
        header(headers, provider.secret_header()),
    );
    let settings = app_state.provider_settings(provider);

    match classify(provider, settings, &webhook_headers, body)? {
        FilterOutcome::Ignored(reason) => {
            debug!(provider = %provider, ?reason, "Ignoring webhook delivery");
        }
        FilterOutcome::Actionable(request) => {
            info!(
                provider = %provider,
                project = %request.name,
                version = %request.version,
                "Tag push received"
            );
            dispatch_release(app_state, request, correlation_id).await?;
        }
    }

    Ok(Json(StatusBody::ok()))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
