//! Bridge user lifecycle API.
//!
//! Registration, activation, deactivation and password reset of storage
//! accounts, backed by PostgreSQL.
#![forbid(unsafe_code)]

pub mod config;
mod crypto;
mod database;
pub mod error;
pub mod mail;
mod router;
pub mod telemetry;
pub mod token;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{delete, get, post};
use axum::{Router, middleware};
use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::config::Configuration;
use crate::mail::{MailManager, Notifier};
use crate::token::RandomTokenIssuer;
use crate::user::{
    CredentialStore, MemoryStore, PgCredentialStore, UserService,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
    basic: Option<(&str, &str)>,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use base64::Engine;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some((username, password)) = basic {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{username}:{password}"));
        request = request.header(header::AUTHORIZATION, format!("Basic {encoded}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub users: UserService,
    /// Prometheus handle, absent when metrics are disabled.
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Mark sensitive headers before the trace span records them.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, REQUEST_TIMEOUT))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        .route("/health", get(router::health))
        .route("/metrics", get(router::metrics))
        // `POST /users` goes to registration.
        .route("/users", post(router::users::create))
        // `DELETE /users/{id}` starts a deactivation. Basic auth required.
        // `PATCH /users/{id}` starts a password reset.
        .route(
            "/users/{id}",
            delete(router::users::deactivate).patch(router::users::reset),
        )
        .route("/activations", post(router::activations::create))
        .route("/activations/{token}", get(router::activations::confirm))
        .route("/deactivations/{token}", get(router::deactivations::confirm))
        .route("/resets/{token}", post(router::resets::confirm))
        .with_state(state)
        .route_layer(middleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
///
/// `DATABASE_URL` takes precedence over the `postgres` entry. Without any of
/// them, users live in memory.
pub async fn initialize_state(
    config: Arc<Configuration>,
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let store: Arc<dyn CredentialStore> = if let Ok(url) =
        std::env::var("DATABASE_URL")
    {
        let pool_size = config
            .postgres
            .as_ref()
            .and_then(|postgres| postgres.pool_size)
            .unwrap_or(database::DEFAULT_POOL_SIZE);
        let pool = database::connect_url(&url, pool_size).await?;
        Arc::new(PgCredentialStore::new(pool))
    } else if let Some(postgres) = &config.postgres {
        Arc::new(PgCredentialStore::new(database::connect(postgres).await?))
    } else {
        tracing::warn!(
            "missing `postgres` entry on `config.yaml` file, users are kept in memory"
        );
        Arc::new(MemoryStore::new())
    };

    // handle mail sender.
    let notifier: Arc<dyn Notifier> = match &config.mail {
        Some(mail) => Arc::new(MailManager::new(mail).await?),
        None => {
            tracing::warn!("missing `mail` entry on `config.yaml` file, notifications are dropped");
            Arc::new(MailManager::default())
        },
    };

    let users = UserService::new(store, Arc::new(RandomTokenIssuer), notifier);

    Ok(AppState {
        config,
        users,
        metrics,
    })
}
