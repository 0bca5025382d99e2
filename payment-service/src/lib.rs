pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use secrecy::ExposeSecret;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use config::Config;
use services::payments::PaymentService;
use services::repository::PaymentRepository;

#[derive(Clone)]
pub struct AppState {
    pub service: PaymentService,
}

/// Health check endpoint for liveness probes.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "payment-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check endpoint.
async fn readiness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}

/// Build the HTTP router. Shared with integration tests, which supply a
/// state backed by the in-memory store.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(
            "/configurations",
            post(handlers::configurations::create_configuration),
        )
        .route(
            "/requests",
            post(handlers::payment_requests::create_payment_request)
                .get(handlers::payment_requests::list_payment_requests),
        )
        .route(
            "/requests/:id",
            get(handlers::payment_requests::get_payment_request)
                .patch(handlers::payment_requests::update_payment_request),
        )
        .route(
            "/payments",
            post(handlers::payments::record_payment).get(handlers::payments::list_payments),
        )
        .route("/payments/:id", get(handlers::payments::get_payment))
        .route("/webhook", post(handlers::webhook::instamojo_webhook))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .with_state(state)
}

pub struct Application {
    port: u16,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let repository = PaymentRepository::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
        )
        .await?;

        repository.run_migrations().await?;

        let service = PaymentService::new(
            Arc::new(repository),
            Duration::from_secs(config.instamojo.request_timeout_secs),
        );

        let state = AppState { service };
        let router = router(state);

        Ok(Self {
            port: config.server.port,
            router,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
