//! Panic recovery.
//!
//! Catches a panic raised anywhere inside the wrapped chain, logs it with
//! the panic-site backtrace and a redacted request dump, and answers
//! HTTP 500 with an empty body. The connection and the process keep going.

use std::panic::AssertUnwindSafe;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::FutureExt;

use crate::http::middleware::context::ensure_context;
use crate::observability::panic::{panic_message, take_backtrace};
use crate::observability::LogField;

const REDACTED_HEADERS: [header::HeaderName; 2] = [header::AUTHORIZATION, header::COOKIE];

/// Request line and headers, with credentials redacted.
pub fn dump_request(request: &Request) -> String {
    let mut dump = format!("{} {} {:?}\r\n", request.method(), request.uri(), request.version());
    for (name, value) in request.headers() {
        let value = if REDACTED_HEADERS.contains(name) {
            "[REDACTED]"
        } else {
            value.to_str().unwrap_or("[binary]")
        };
        dump.push_str(&format!("{name}: {value}\r\n"));
    }
    dump
}

pub async fn recovery_middleware(mut request: Request, next: Next) -> Response {
    let ctx = ensure_context(&mut request);
    let dump = dump_request(&request);

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let mut fields = vec![
                LogField::new("error", panic_message(payload.as_ref())),
                LogField::new("request", dump),
            ];
            if let Some(stack) = take_backtrace() {
                fields.push(LogField::new("stack", stack));
            }
            ctx.log_error("panic recovered", &fields);

            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::observability::panic::install_panic_hook;
    use crate::observability::RecordingSink;
    use axum::routing::get;
    use axum::Router;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[test]
    fn test_dump_redacts_credentials() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/v1/user/edit?x=1")
            .header("authorization", "Bearer secret-token")
            .header("cookie", "session=abc")
            .header("x-custom", "visible")
            .body(Body::empty())
            .unwrap();
        let dump = dump_request(&request);

        assert!(dump.starts_with("POST /api/v1/user/edit?x=1 HTTP/1.1\r\n"));
        assert!(dump.contains("authorization: [REDACTED]"));
        assert!(dump.contains("cookie: [REDACTED]"));
        assert!(dump.contains("x-custom: visible"));
        assert!(!dump.contains("secret-token"));
    }

    #[tokio::test]
    async fn test_panic_becomes_500_and_is_logged() {
        install_panic_hook();
        let sink = RecordingSink::new();
        let ctx = RequestContext::builder().logger(Arc::new(sink.clone())).build();

        let router = Router::new()
            .route(
                "/boom",
                get(|| async {
                    if true {
                        panic!("handler exploded");
                    }
                    "unreachable"
                }),
            )
            .route("/fine", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(recovery_middleware));

        let mut request = axum::http::Request::builder().uri("/boom").body(Body::empty()).unwrap();
        request.extensions_mut().insert(ctx);
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());

        let records = sink.with_message("panic recovered");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, tracing::Level::ERROR);
        assert_eq!(records[0].field("error"), Some(&Value::from("handler exploded")));
        assert!(records[0].field("stack").is_some());

        let request = axum::http::Request::builder().uri("/fine").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
