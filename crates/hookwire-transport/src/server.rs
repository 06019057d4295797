//! HTTP transport server using Axum.
//!
//! Maps each request path onto a controller dispatch, follows forward paths
//! returned by actions, and converts the shared response handle back into an
//! HTTP reply.

use std::net::{AddrParseError, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Json},
    routing::get,
};
use hookwire_protocol::envelope::JSON_CONTENT_TYPE;
use hookwire_protocol::{HandlerResult, JsonEnvelope, Request, Response};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::route::split_path;

/// Trait implemented by the dispatcher to serve routed requests.
/// The transport calls this once per hop of every request.
pub trait RequestHandler: Send + Sync + 'static {
    /// Dispatch `controller::action`. Writes go to `response`; an `Ok(Some(path))`
    /// asks the transport to re-route the request to `path`.
    fn handle_request(
        &self,
        controller: &str,
        action: &str,
        request: Request,
        response: Response,
    ) -> impl std::future::Future<Output = HandlerResult> + Send;

    /// Names reported by `/health`.
    fn controllers(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Enable CORS
    pub enable_cors: bool,
    /// Forward hops followed before answering 508
    pub max_forwards: usize,
    /// Controller used when the path has no first segment
    pub default_controller: String,
    /// Action used when the path has no second segment
    pub default_action: String,
    /// Log every request at info level
    pub verbose_logging: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 9501,
            hostname: "127.0.0.1".into(),
            enable_cors: false,
            max_forwards: 8,
            default_controller: "Index".into(),
            default_action: "index".into(),
            verbose_logging: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("invalid listen address: {0}")]
    Address(#[from] AddrParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state for the transport server.
struct AppState<H: RequestHandler> {
    handler: Arc<H>,
    config: TransportConfig,
}

/// Build the axum router serving `handler`.
pub fn router<H: RequestHandler>(config: TransportConfig, handler: Arc<H>) -> Router {
    let enable_cors = config.enable_cors;
    let state = Arc::new(AppState { handler, config });

    let app = Router::new()
        .route("/health", get(health_handler::<H>))
        .fallback(dispatch_handler::<H>)
        .with_state(state);

    if enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// The transport server. Owns the listener task.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start the transport server with the given request handler.
    pub async fn start<H: RequestHandler>(config: TransportConfig, handler: H) -> Result<Self, ServeError> {
        Self::start_shared(config, Arc::new(handler)).await
    }

    /// Start the transport server with a handler shared with other owners.
    pub async fn start_shared<H: RequestHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, ServeError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("Hookwire transport listening on http://{}:{}", config.hostname, actual_port);

        let app = router(config, handler);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Hookwire transport server stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn health_handler<H: RequestHandler>(State(state): State<Arc<AppState<H>>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "controllers": state.handler.controllers(),
    }))
}

async fn dispatch_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let request = Request::from_parts(method, uri, headers, body);
    let method = request.method().clone();
    let path = request.path().to_string();

    let reply = serve(&state, request).await;
    if state.config.verbose_logging {
        info!("{method} {path} -> {}", reply.status());
    }
    reply
}

/// Dispatch `request`, following forward paths up to `max_forwards` hops.
async fn serve<H: RequestHandler>(state: &AppState<H>, mut request: Request) -> axum::response::Response {
    let config = &state.config;
    let response = Response::new();
    let mut hops = 0;

    loop {
        let (controller, action) =
            split_path(request.path(), &config.default_controller, &config.default_action);
        let (controller, action) = (controller.to_string(), action.to_string());

        let forward = match state
            .handler
            .handle_request(&controller, &action, request.clone(), response.clone())
            .await
        {
            Ok(forward) => forward,
            Err(err) => {
                warn!("{controller}::{action}: {err}");
                return error_reply(err.status(), err.to_string());
            }
        };

        let Some(path) = forward else {
            let (status, headers, body) = response.to_parts();
            return (status, headers, body).into_response();
        };

        hops += 1;
        if hops > config.max_forwards {
            warn!("{controller}::{action}: forward limit ({}) exceeded at {path}", config.max_forwards);
            return error_reply(
                StatusCode::LOOP_DETECTED,
                format!("forward limit of {} exceeded", config.max_forwards),
            );
        }

        debug!("{controller}::{action} forwarded to {path}");
        request = match request.forwarded_to(&path) {
            Ok(next) => next,
            Err(err) => {
                warn!("{controller}::{action}: {err}");
                return error_reply(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
            }
        };
    }
}

fn error_reply(status: StatusCode, msg: String) -> axum::response::Response {
    let envelope = JsonEnvelope::new(status.as_u16(), status.canonical_reason().unwrap_or("error"), msg);
    (
        status,
        [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
        envelope.to_json(),
    )
        .into_response()
}
