//! Access logging.
//!
//! # Responsibilities
//! - Capture the request body for JSON and form requests, up to the body limit
//! - Mark multipart requests as `request_type=file_upload`
//! - After the handler: status, response size, small textual response bodies
//! - Emit one `HTTP Request` record through the request's context
//! - Record request metrics
//!
//! # Design Decisions
//! - Level follows status: >= 500 error, >= 400 warn, otherwise info
//! - Bodies are buffered only when they will be logged

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::Request;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::Level;

use crate::context::RequestContext;
use crate::http::middleware::body_limit::BodyLimit;
use crate::http::middleware::context::ensure_context;
use crate::observability::{metrics, LogField};

/// Response bodies at or above this size are not logged.
pub const MAX_LOGGED_RESPONSE: usize = 1024;

pub const MESSAGE: &str = "HTTP Request";

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn is_textual_request(content_type: &str) -> bool {
    content_type.starts_with("application/json")
        || content_type.starts_with("application/x-www-form-urlencoded")
}

fn is_binary_response(content_type: &str) -> bool {
    content_type.starts_with("application/octet-stream")
        || content_type.starts_with("image/")
        || content_type.starts_with("video/")
        || content_type.starts_with("audio/")
}

/// Log level for a response status.
pub fn level_for(status: u16) -> Level {
    if status >= 500 {
        Level::ERROR
    } else if status >= 400 {
        Level::WARN
    } else {
        Level::INFO
    }
}

pub async fn logger_middleware(mut request: Request, next: Next) -> Response {
    let ctx = ensure_context(&mut request);
    let method = request.method().to_string();
    let request_type = content_type(request.headers());

    let mut fields = Vec::new();
    let request = if is_textual_request(&request_type) {
        let limit = BodyLimit::of(&request);
        let (parts, body) = request.into_parts();
        let bytes = match limit.read(body).await {
            Ok(bytes) => bytes,
            Err(err) => {
                ctx.add_log_field("error_code", err.code().as_i32());
                let response = err.into_response();
                finish(&ctx, &method, fields, response.status().as_u16(), 0, None);
                return response;
            }
        };
        fields.push(LogField::new("request_body", String::from_utf8_lossy(&bytes).into_owned()));
        Request::from_parts(parts, Body::from(bytes))
    } else {
        if request_type.starts_with("multipart/form-data") {
            fields.push(LogField::new("request_type", "file_upload"));
        }
        request
    };

    let response = next.run(request).await;
    let status = response.status().as_u16();

    if is_binary_response(&content_type(response.headers())) {
        let size = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        finish(&ctx, &method, fields, status, size, None);
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.unwrap_or_else(|_| Bytes::new());
    let logged = (bytes.len() < MAX_LOGGED_RESPONSE)
        .then(|| String::from_utf8_lossy(&bytes).into_owned());
    finish(&ctx, &method, fields, status, bytes.len(), logged);

    Response::from_parts(parts, Body::from(bytes))
}

fn finish(
    ctx: &RequestContext,
    method: &str,
    mut fields: Vec<LogField>,
    status: u16,
    size: usize,
    body: Option<String>,
) {
    fields.push(LogField::new("status", status));
    fields.push(LogField::new("response_size", size));
    if let Some(body) = body {
        fields.push(LogField::new("response_body", body));
    }
    ctx.log(level_for(status), MESSAGE, &fields);
    metrics::record_request(method, status, ctx.elapsed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::RecordingSink;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::Router;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn run(router: Router, request: axum::http::Request<Body>) -> (RecordingSink, Response) {
        let sink = RecordingSink::new();
        let ctx = RequestContext::builder().logger(Arc::new(sink.clone())).build();
        let mut request = request;
        request.extensions_mut().insert(ctx);
        let response = router
            .layer(axum::middleware::from_fn(logger_middleware))
            .oneshot(request)
            .await
            .unwrap();
        (sink, response)
    }

    #[test]
    fn test_level_for_status() {
        assert_eq!(level_for(200), Level::INFO);
        assert_eq!(level_for(302), Level::INFO);
        assert_eq!(level_for(404), Level::WARN);
        assert_eq!(level_for(500), Level::ERROR);
        assert_eq!(level_for(503), Level::ERROR);
    }

    #[tokio::test]
    async fn test_json_request_and_small_response_logged() {
        let router = Router::new().route("/echo", post(|body: String| async move { body }));
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"a":1}"#))
            .unwrap();
        let (sink, response) = run(router, request).await;

        // Handler still sees the body
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"a":1}"#);

        let records = sink.with_message(MESSAGE);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.level, Level::INFO);
        assert_eq!(record.field("request_body"), Some(&Value::from(r#"{"a":1}"#)));
        assert_eq!(record.field("response_body"), Some(&Value::from(r#"{"a":1}"#)));
        assert_eq!(record.field("status"), Some(&Value::from(200)));
        assert_eq!(record.field("response_size"), Some(&Value::from(7)));
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit_not_buffered() {
        let router = Router::new().route("/echo", post(|body: String| async move { body }));
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            (0..64).map(|_| Ok(Bytes::from(vec![b'a'; 1024]))).collect();
        let mut request = axum::http::Request::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();
        request.extensions_mut().insert(BodyLimit(16));
        let (sink, response) = run(router, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 10002);
        assert_eq!(body["detail"], "request body too large");

        let record = &sink.with_message(MESSAGE)[0];
        assert!(record.field("request_body").is_none());
    }

    #[tokio::test]
    async fn test_multipart_marked_as_upload() {
        let router = Router::new().route("/up", post(|| async { "ok" }));
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/up")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=X")
            .body(Body::from("--X--\r\n"))
            .unwrap();
        let (sink, _) = run(router, request).await;

        let record = &sink.with_message(MESSAGE)[0];
        assert_eq!(record.field("request_type"), Some(&Value::from("file_upload")));
        assert!(record.field("request_body").is_none());
    }

    #[tokio::test]
    async fn test_large_and_binary_responses_not_logged() {
        let big = "x".repeat(MAX_LOGGED_RESPONSE);
        let router = Router::new()
            .route("/big", get(move || async move { big }))
            .route(
                "/img",
                get(|| async { ([(header::CONTENT_TYPE, "image/png")], vec![0u8; 10]) }),
            );

        let (sink, _) = run(
            router.clone(),
            axum::http::Request::builder().uri("/big").body(Body::empty()).unwrap(),
        )
        .await;
        let record = &sink.with_message(MESSAGE)[0];
        assert!(record.field("response_body").is_none());
        assert_eq!(record.field("response_size"), Some(&Value::from(MAX_LOGGED_RESPONSE)));

        let (sink, _) = run(
            router,
            axum::http::Request::builder().uri("/img").body(Body::empty()).unwrap(),
        )
        .await;
        let record = &sink.with_message(MESSAGE)[0];
        assert!(record.field("response_body").is_none());
    }

    #[tokio::test]
    async fn test_error_status_logged_at_warn() {
        let router = Router::new().route("/missing", get(|| async { StatusCode::NOT_FOUND }));
        let (sink, _) = run(
            router,
            axum::http::Request::builder().uri("/missing").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(sink.with_message(MESSAGE)[0].level, Level::WARN);
    }
}
