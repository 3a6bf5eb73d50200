//! Request body size limit.
//!
//! Requests announcing a `Content-Length` above the limit are answered with a
//! `ParamError` envelope before anything reads them. The limit is also put in
//! the request extensions so every later body read (access log, binder) stops
//! at the same bound, which covers chunked bodies with no length header.

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::errors::{AppError, ErrorCode};
use crate::http::middleware::context::ensure_context;
use crate::observability::LogField;

pub const TOO_LARGE: &str = "request body too large";

/// Maximum accepted request body, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimit(pub usize);

impl BodyLimit {
    /// Applies when no limit middleware is installed.
    pub const DEFAULT: BodyLimit = BodyLimit(2 * 1024 * 1024);

    /// The limit attached to `request`, or the default.
    pub fn of(request: &Request) -> BodyLimit {
        request
            .extensions()
            .get::<BodyLimit>()
            .copied()
            .unwrap_or(Self::DEFAULT)
    }

    /// Read `body` fully, failing with `ParamError` past the limit.
    pub async fn read(self, body: Body) -> Result<Bytes, AppError> {
        to_bytes(body, self.0)
            .await
            .map_err(|_| AppError::with_detail(ErrorCode::ParamError, TOO_LARGE))
    }
}

fn declared_length(request: &Request) -> Option<usize> {
    request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

pub async fn body_limit_middleware(
    State(limit): State<BodyLimit>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(length) = declared_length(&request).filter(|&len| len > limit.0) {
        let ctx = ensure_context(&mut request);
        ctx.log_warn(
            TOO_LARGE,
            &[
                LogField::new("content_length", length),
                LogField::new("limit", limit.0),
            ],
        );
        return AppError::with_detail(ErrorCode::ParamError, TOO_LARGE).into_response();
    }

    request.extensions_mut().insert(limit);
    next.run(request).await
}
