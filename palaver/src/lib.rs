//! # palaver: Assistant Chat Relay
//!
//! `palaver` relays chat messages and file uploads between a browser widget
//! and a hosted conversational-AI assistant service. It exposes one chat
//! endpoint, serves the widget itself, and treats the upstream service as an
//! opaque collaborator reached over its Assistants-style REST API.
//!
//! ## Overview
//!
//! Browser clients cannot talk to the assistant service directly: the API
//! credential must stay server-side, uploads need validation, and the
//! service answers asynchronously through runs that have to be polled. The
//! relay owns all of that. Each request is handled independently - the only
//! state that crosses requests is the opaque conversation handle
//! (`threadId`), which round-trips through the client.
//!
//! ### Request Flow
//!
//! A `POST /api/v1/chat` request moves through a fixed pipeline:
//!
//! 1. The payload is decoded ([`api::payload`]): JSON or multipart, with the
//!    multipart boundary extracted defensively from the content-type header.
//! 2. A request with neither text nor file is rejected before any upstream
//!    call.
//! 3. An attachment, if present, is uploaded to the upstream file endpoint
//!    and its asset id captured.
//! 4. The caller's conversation handle is reused verbatim, or a new thread
//!    is created.
//! 5. The message is posted (a file-only request gets placeholder text) and
//!    a run of the configured assistant is started.
//! 6. The run is polled at a fixed interval up to a bounded ceiling
//!    ([`assistant::poll`]). Runs that pause for tool outputs are resumed
//!    through the [`tools::ToolRegistry`].
//! 7. The newest assistant message is mapped back: text segments joined as
//!    the JSON reply, or a generated file streamed as an attachment body.
//!
//! Failures at every stage map onto the structured error taxonomy in
//! [`errors`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use palaver::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Parse CLI arguments and load configuration
//!     let args = palaver::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     // Initialize telemetry (structured logging and optional OpenTelemetry)
//!     palaver::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     // Create and start the application
//!     let app = Application::new(config)?;
//!
//!     // Run with graceful shutdown on Ctrl+C
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod assistant;
pub mod config;
pub mod errors;
mod openapi;
mod static_assets;
pub mod telemetry;
pub mod tools;

#[cfg(test)]
mod test;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{Router, routing::post};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::assistant::AssistantClient;
use crate::config::CorsOrigin;
use crate::openapi::ApiDoc;
use crate::tools::ToolRegistry;
pub use config::Config;

/// Application state shared across all request handlers.
///
/// Everything here is immutable per process: the relay holds no mutable
/// state across requests.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub assistant: Arc<AssistantClient>,
    pub tools: Arc<ToolRegistry>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<Option<CorsLayer>> {
    if config.cors.allowed_origins.is_empty() {
        return Ok(None);
    }

    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    Ok(Some(CorsLayer::new().allow_origin(origins).allow_headers([axum::http::header::CONTENT_TYPE])))
}

/// Build the application router with all endpoints and middleware.
///
/// - `POST /api/v1/chat`: the relay endpoint (other methods get a
///   structured 405 instead of upstream traffic)
/// - `GET /healthz`: liveness probe
/// - `GET /docs`: rendered OpenAPI documentation
/// - everything else: the embedded chat widget
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors_layer = create_cors_layer(&state.config)?;

    let mut router = Router::new()
        .route("/healthz", axum::routing::get(|| async { "OK" }))
        .route(
            "/api/v1/chat",
            post(api::handlers::chat::relay_chat).fallback(api::handlers::chat::method_not_allowed),
        )
        .with_state(state)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .fallback(api::handlers::static_assets::serve_widget_asset);

    if let Some(cors_layer) = cors_layer {
        router = router.layer(cors_layer);
    }

    // Add tracing layer
    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The assembled relay application.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance from validated configuration.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting relay with configuration: {:#?}", config);

        let assistant = Arc::new(AssistantClient::new(&config.assistant)?);

        let tools = match &config.compute {
            Some(compute) => {
                info!(backend = %compute.base_url, "Tool calls forward to the compute backend");
                Arc::new(ToolRegistry::with_compute_backend(compute)?)
            }
            None => Arc::new(ToolRegistry::new()),
        };

        let state = AppState {
            config: config.clone(),
            assistant,
            tools,
        };
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Relay listening on http://{}, widget available at http://localhost:{}",
            bind_addr, self.config.port
        );

        // Run the server with graceful shutdown
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        // Shutdown telemetry
        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
