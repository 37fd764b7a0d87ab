use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, put},
};
use fhir_upsert_storage::{DynDataStore, DynSearchGateway};
use tower_http::trace::TraceLayer;

use crate::conditional::ConditionalUpsertEngine;
use crate::dispatcher::Dispatcher;
use crate::{config::AppConfig, handlers};

/// Shared request state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

pub struct UpsertServer {
    addr: SocketAddr,
    app: Router,
}

/// Builds the router backed by a fresh in-memory store.
pub fn build_app(cfg: &AppConfig) -> Router {
    let (search, store) = fhir_upsert_db_memory::create_gateways();
    build_app_with_gateways(cfg, search, store)
}

/// Builds the router over caller-supplied gateways.
pub fn build_app_with_gateways(
    cfg: &AppConfig,
    search: DynSearchGateway,
    store: DynDataStore,
) -> Router {
    let engine = ConditionalUpsertEngine::new(search, store, cfg.conditional_options());
    let state = AppState {
        dispatcher: Dispatcher::new(Arc::new(engine)),
    };
    let body_limit = cfg.server.body_limit_bytes;

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/{resource_type}", put(handlers::conditional_update))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> UpsertServer {
        UpsertServer {
            addr: self.addr,
            app: build_app(&self.config),
        }
    }
}

impl UpsertServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
