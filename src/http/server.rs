//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with a single catch-all gateway handler
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Hand each request to the synchronous gateway on the blocking pool
//! - Turn gateway responses (including streams) into HTTP responses
//! - Drain in-flight requests on shutdown

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::http::request::{self, MakeRequestUuidV4};
use crate::http::stream_sink::{self, ChannelSink, ConnectionGuard};
use crate::net::{ConnectionHandle, InFlightTracker};
use crate::translate::response::MIME_JSON;
use crate::translate::{GatewayRequest, GatewayResponse};

/// How long shutdown waits for in-flight requests.
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub sink: Arc<ChannelSink>,
    pub in_flight: InFlightTracker,
    pub max_body_size: usize,
}

/// HTTP front end of the gateway.
pub struct HttpServer {
    router: Router,
    gateway: Arc<Gateway>,
    in_flight: InFlightTracker,
}

impl HttpServer {
    /// `sink` must be the sink the gateway was built with.
    pub fn new(gateway: Arc<Gateway>, sink: Arc<ChannelSink>) -> Self {
        let in_flight = InFlightTracker::new();
        let state = AppState {
            gateway: Arc::clone(&gateway),
            sink,
            in_flight: in_flight.clone(),
            max_body_size: gateway.config().listener.max_body_size,
        };

        let router = Self::build_router(gateway.config(), state);
        Self {
            router,
            gateway,
            in_flight,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let router = Router::new()
            .fallback(gateway_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size));

        let router = if config.timeouts.request_secs > 0 {
            router.layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        } else {
            router
        };

        router
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    /// The fully layered router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Run the server until `shutdown` fires, then drain and shut the gateway down.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let gateway = Arc::clone(&self.gateway);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
                // Open streams would otherwise hold their connections forever.
                let closed = tokio::task::spawn_blocking(move || gateway.streams().close_all()).await;
                tracing::debug!(streams = ?closed.ok(), "Closed open streams");
            })
            .await?;

        if !self.in_flight.wait_idle(DRAIN_DEADLINE).await {
            tracing::warn!(
                active = self.in_flight.active_count(),
                "Requests still in flight after drain deadline"
            );
        }

        let gateway = self.gateway;
        if let Err(e) = tokio::task::spawn_blocking(move || gateway.shutdown()).await {
            tracing::error!(error = %e, "Gateway shutdown panicked");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: every request goes through the gateway pipeline.
async fn gateway_handler(State(state): State<AppState>, incoming: Request<Body>) -> Response {
    let _in_flight = state.in_flight.track();
    let start_time = Instant::now();

    let peer = incoming
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = incoming.into_parts();
    let request_id = request::request_id(&parts.headers).unwrap_or("unknown").to_string();

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            return GatewayError::InvalidArgument(format!("Failed to read request body: {e}")).into_response();
        }
    };

    let connection = ConnectionHandle::next();
    let req = GatewayRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        body,
        caller: request::caller_identity(&parts.headers, peer),
        upload: request::upload_meta(&parts.headers),
        connection,
    };

    tracing::debug!(
        request_id = %request_id,
        method = %req.method,
        path = %req.path,
        %connection,
        "Handling request"
    );

    // Armed until we know no stream is attached to this connection.
    let mut guard = ConnectionGuard::new(
        connection,
        state.gateway.stream_controller(),
        Arc::clone(&state.sink),
    );

    let gateway = Arc::clone(&state.gateway);
    let response = match tokio::task::spawn_blocking(move || gateway.handle(req)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Gateway task failed");
            return GatewayError::Internal("Request handling failed".to_string()).into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        status = response.status.as_u16(),
        streaming = response.streaming,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "Gateway responded"
    );

    if response.streaming {
        let (headers, body) = stream_sink::streamed_body(&state.sink, guard).await;
        let mut http = Response::new(body);
        *http.status_mut() = response.status;
        http.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(MIME_JSON));
        http.headers_mut().extend(headers);
        return http;
    }

    // Chunks pushed before a failed call are never read.
    state.sink.forget(connection);
    guard.disarm();
    into_http_response(response)
}

fn into_http_response(response: GatewayResponse) -> Response {
    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = response.status;
    http.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(response.mime_type));
    http.headers_mut().extend(response.headers);
    http
}
