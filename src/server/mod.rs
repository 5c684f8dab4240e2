mod handler;

use crate::cache::ResponseCache;
use crate::metrics::Metrics;
use crate::rules::RuleTable;
use arc_swap::ArcSwap;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const REDIRECT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const METRICS_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid listen address '{0}': {1}")]
    InvalidAddress(String, std::net::AddrParseError),
    #[error("Server error: {0}")]
    Serve(String),
}

/// Settings the request pipeline needs besides the rule table.
///
/// Unlike the table these are fixed at startup; a reload only swaps rules.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub location_on_miss: String,
    pub status_on_miss: u16,
    pub cache_control_max_age: i64,
}

/// State shared by every request handler
pub struct AppState {
    pub settings: ServerSettings,
    pub table: Arc<ArcSwap<RuleTable>>,
    pub cache: ResponseCache,
}

/// The redirect service itself
pub struct RedirectServer {
    state: Arc<AppState>,
}

impl RedirectServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    pub async fn run(&self, addr: &str, cancel_token: CancellationToken) -> Result<(), ServerError> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| ServerError::InvalidAddress(addr.to_string(), e))?;

        let app = Router::new()
            .route("/status", get(handle_status))
            .fallback(handler::handle_redirect)
            .with_state(Arc::clone(&self.state));

        let listener = TcpListener::bind(addr).await?;
        info!("redirect server listening on {}", addr);

        serve_until_cancelled(listener, app, cancel_token, REDIRECT_SHUTDOWN_TIMEOUT).await?;

        info!("redirect server stopped");
        Ok(())
    }
}

/// Serves `/metrics` on its own listener
pub struct MetricsServer {
    metrics: Arc<Metrics>,
}

impl MetricsServer {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    pub async fn run(&self, addr: &str, cancel_token: CancellationToken) -> Result<(), ServerError> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| ServerError::InvalidAddress(addr.to_string(), e))?;

        let app = Router::new()
            .route("/metrics", get(handle_metrics))
            .with_state(Arc::clone(&self.metrics));

        let listener = TcpListener::bind(addr).await?;
        info!("metrics server listening on {}", addr);

        serve_until_cancelled(listener, app, cancel_token, METRICS_SHUTDOWN_TIMEOUT).await?;

        info!("metrics server stopped");
        Ok(())
    }
}

/// Run an axum server until the token is cancelled, then shut down gracefully
/// within `timeout`; connections still open after that are dropped.
async fn serve_until_cancelled(
    listener: TcpListener,
    app: Router,
    cancel_token: CancellationToken,
    timeout: Duration,
) -> Result<(), ServerError> {
    let shutdown_token = cancel_token.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_token.cancelled().await;
    });

    tokio::select! {
        result = server.into_future() => result.map_err(|e| ServerError::Serve(e.to_string())),
        _ = async {
            cancel_token.cancelled().await;
            tokio::time::sleep(timeout).await;
        } => {
            warn!("graceful shutdown timed out, dropping open connections");
            Ok(())
        }
    }
}

async fn handle_status() -> &'static str {
    "OK"
}

async fn handle_metrics(State(metrics): State<Arc<Metrics>>) -> Response {
    match metrics.gather() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(%err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
