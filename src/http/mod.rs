//! HTTP control and query API (axum).
//!
//! | Route              | Purpose                                        |
//! |--------------------|------------------------------------------------|
//! | `GET /start`       | start device streaming                         |
//! | `GET /stop`        | stop device streaming                          |
//! | `PUT /configure`   | set sampling rate and debug flag               |
//! | `GET /messages`    | newest `limit` samples of the current profile  |
//! | `GET /device`      | current configuration, latest sample, mean     |
//!
//! Command routes block on the device for up to the command timeout, so they run on
//! tokio's blocking pool rather than on executor threads.

pub mod handlers;

use crate::bridge::Bridge;
use axum::{
    routing::{get, put},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The bridge every route talks to.
    pub bridge: Arc<Bridge>,
}

impl AppState {
    /// Wrap a bridge.
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }
}

/// Build the router with request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/start", get(handlers::start))
        .route("/stop", get(handlers::stop))
        .route("/configure", put(handlers::configure))
        .route("/messages", get(handlers::messages))
        .route("/device", get(handlers::device))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::debug_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
