//! Authentication guards.
//!
//! # Responsibilities
//! - `require_auth`: verify a `Bearer` access token and attach the identity
//! - `require_admin`: admit only identities with the admin role
//! - `require_api_key`: admit requests carrying a configured `X-API-Key`
//!
//! Rejections are ordinary error envelopes; the guarded handler never runs.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::IntoResponse;

use crate::auth::TokenService;
use crate::errors::{AppError, ErrorCode};
use crate::http::middleware::context::ensure_context;
use crate::http::router::Middleware;
use crate::observability::LogField;

pub const X_API_KEY: &str = "x-api-key";

/// Shortened token for logs: the first 8 characters.
fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}...")
}

fn bearer_token(request: &Request) -> Result<String, AppError> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if header.is_empty() {
        return Err(AppError::with_detail(ErrorCode::Unauthorized, "missing authorization token"));
    }
    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::with_detail(ErrorCode::Unauthorized, "malformed authorization header")
    })?;
    if token.trim().is_empty() {
        return Err(AppError::with_detail(ErrorCode::Unauthorized, "empty authorization token"));
    }
    Ok(token.trim().to_string())
}

pub fn require_auth(tokens: Arc<TokenService>) -> Middleware {
    Middleware::from_fn(move |mut request: Request, next: Next| {
        let tokens = tokens.clone();
        async move {
            let ctx = ensure_context(&mut request);
            let token = match bearer_token(&request) {
                Ok(token) => token,
                Err(err) => return err.into_response(),
            };
            let claims = match tokens.verify(&token) {
                Ok(claims) => claims,
                Err(err) => {
                    ctx.log_warn("token rejected", &[LogField::new("error", err.to_string())]);
                    return AppError::from(err).into_response();
                }
            };

            ctx.set_field("token_length", token.len());
            ctx.set_field("token", mask_token(&token));
            ctx.set_identity(claims.sub, claims.username, claims.role);
            next.run(request).await
        }
    })
}

/// Requires `require_auth` to have run first.
pub fn require_admin() -> Middleware {
    Middleware::from_fn(|mut request: Request, next: Next| async move {
        match ensure_context(&mut request).identity() {
            None => AppError::with_detail(ErrorCode::Unauthorized, "authentication required").into_response(),
            Some(identity) if !identity.is_admin() => {
                AppError::with_detail(ErrorCode::Forbidden, "admin role required").into_response()
            }
            Some(_) => next.run(request).await,
        }
    })
}

pub fn require_api_key(keys: impl IntoIterator<Item = String>) -> Middleware {
    let keys: Arc<HashSet<String>> = Arc::new(keys.into_iter().collect());
    Middleware::from_fn(move |request: Request, next: Next| {
        let keys = keys.clone();
        async move {
            let key = request
                .headers()
                .get(X_API_KEY)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if key.is_empty() {
                return AppError::with_detail(ErrorCode::Unauthorized, "missing API key").into_response();
            }
            if !keys.contains(key) {
                return AppError::with_detail(ErrorCode::Unauthorized, "invalid API key").into_response();
            }
            next.run(request).await
        }
    })
}
