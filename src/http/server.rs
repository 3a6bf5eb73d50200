//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the Axum router from the route table
//! - Wire up global middleware (context, body limit, logging, recovery, CORS)
//! - Bind server to listener
//! - Stop accepting and drain on shutdown
//!
//! # Data Flow
//! ```text
//! TcpListener → context → body limit → logger → recovery → cors
//!             → ElegantRouter (group / route middleware → handler)
//! ```
//!
//! # Design Decisions
//! - The request deadline lives on the context; the handler adapter races the
//!   business function against it and answers with a `Timeout` envelope
//! - The body limit sits outside the logger so no layer buffers past it

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::api::{build_routes, ApiDeps};
use crate::config::ServerConfig;
use crate::http::middleware::{
    body_limit_middleware, context_middleware, logger_middleware, recovery_middleware, BodyLimit,
    ContextState,
};
use crate::http::router::ElegantRouter;
use crate::observability::panic::install_panic_hook;
use crate::observability::LogSink;

/// HTTP server for the account API.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    /// Create a server serving the full API.
    ///
    /// Cancelling `root` cancels the context of every in-flight request.
    pub fn new(
        config: ServerConfig,
        deps: &ApiDeps,
        logger: Arc<dyn LogSink>,
        root: CancellationToken,
    ) -> Self {
        Self::with_routes(config, build_routes(deps), logger, root)
    }

    /// Create a server for an arbitrary route table.
    pub fn with_routes(
        config: ServerConfig,
        routes: ElegantRouter,
        logger: Arc<dyn LogSink>,
        root: CancellationToken,
    ) -> Self {
        let context = ContextState::new(logger)
            .with_timeout(config.request_timeout())
            .with_root(root);
        let router = Self::build_router(&config, routes, context);
        Self { router, config }
    }

    /// Apply the global middleware stack to a route table.
    pub fn build_router(config: &ServerConfig, routes: ElegantRouter, context: ContextState) -> Router {
        install_panic_hook();

        // Last layer added runs first
        routes
            .into_router()
            .layer(cors_layer(&config.cors_origins))
            .layer(axum::middleware::from_fn(recovery_middleware))
            .layer(axum::middleware::from_fn(logger_middleware))
            .layer(axum::middleware::from_fn_with_state(
                BodyLimit(config.max_body_bytes),
                body_limit_middleware,
            ))
            .layer(axum::middleware::from_fn_with_state(context, context_middleware))
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            request_timeout_secs = self.config.request_timeout_secs,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        cors.allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect();
        cors.allow_origin(AllowOrigin::list(allowed))
    }
}
