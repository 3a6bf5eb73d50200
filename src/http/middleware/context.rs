//! Context middleware: one `RequestContext` per request.
//!
//! Creates the context (logger, deadline, root cancellation), records the
//! request metadata, stores it in the request extensions and stamps
//! `X-Trace-ID` on the response.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tokio_util::sync::CancellationToken;

use crate::context::RequestContext;
use crate::observability::LogSink;

pub const X_TRACE_ID: &str = "x-trace-id";

/// Settings shared by every context the middleware creates.
#[derive(Clone)]
pub struct ContextState {
    pub logger: Arc<dyn LogSink>,
    pub timeout: Option<Duration>,
    /// Cancelling this cancels every in-flight request context.
    pub root: CancellationToken,
}

impl ContextState {
    pub fn new(logger: Arc<dyn LogSink>) -> Self {
        Self {
            logger,
            timeout: None,
            root: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_root(mut self, root: CancellationToken) -> Self {
        self.root = root;
        self
    }
}

pub async fn context_middleware(
    State(state): State<ContextState>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut builder = RequestContext::builder()
        .parent(&state.root)
        .logger(state.logger.clone());
    if let Some(timeout) = state.timeout {
        builder = builder.timeout(timeout);
    }
    let ctx = builder.build();

    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let client_ip = client_ip(&request);
    ctx.set_request_info(request.method().as_str(), path, client_ip, user_agent);

    request.extensions_mut().insert(ctx.clone());
    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(ctx.trace_id()) {
        response.headers_mut().insert(X_TRACE_ID, value);
    }
    response
}

/// The request's context, inserting a fresh one if none is attached yet.
pub fn ensure_context(request: &mut Request) -> RequestContext {
    if let Some(ctx) = request.extensions().get::<RequestContext>() {
        return ctx.clone();
    }
    let ctx = RequestContext::new();
    request.extensions_mut().insert(ctx.clone());
    ctx
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer.
pub fn client_ip(request: &Request) -> String {
    forwarded_ip(request.headers())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_default()
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let first_forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    first_forwarded.or_else(real_ip).map(str::to_string)
}

/// Extract the request's context in plain axum handlers.
///
/// Falls back to a fresh context when the middleware is not installed.
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}
