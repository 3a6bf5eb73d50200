//! Generic request binding.
//!
//! # Responsibilities
//! - Pick a decoder from the HTTP method and `Content-Type`
//! - Decode query string or body into the handler's request type
//! - Run the type's `Validate` hook
//! - Turn every failure into `AppError(ParamError)` with the decoder's text as detail
//!
//! # Data Flow
//! ```text
//! GET / DELETE           → query string  → serde_urlencoded
//! POST / PUT / PATCH
//!     application/json                  → serde_json
//!     x-www-form-urlencoded             → serde_urlencoded
//!     multipart/form-data (text parts)  → serde_urlencoded
//!     anything else                     → serde_json
//! other methods          → body          → serde_json
//! ```

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, Method};
use serde::de::DeserializeOwned;

use crate::errors::{AppError, ErrorCode};
use crate::http::middleware::body_limit::{BodyLimit, TOO_LARGE};

/// Decoding strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    Query,
    Json,
    Form,
    Multipart,
}

/// Post-decode validation hook. The default accepts everything.
pub trait Validate {
    /// Return a message naming the offending field on failure.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Choose the decoder for `method` and the raw `Content-Type` header value.
pub fn select_decoder(method: &Method, content_type: Option<&str>) -> Decoder {
    if method == Method::GET || method == Method::DELETE {
        return Decoder::Query;
    }
    if method != Method::POST && method != Method::PUT && method != Method::PATCH {
        return Decoder::Json;
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match mime.as_str() {
        "application/json" => Decoder::Json,
        "application/x-www-form-urlencoded" => Decoder::Form,
        "multipart/form-data" => Decoder::Multipart,
        _ => Decoder::Json,
    }
}

fn param_error(detail: impl std::fmt::Display) -> AppError {
    AppError::wrap(ErrorCode::ParamError, detail)
}

/// Decode and validate `T` from `request`.
pub async fn bind<T>(request: Request) -> Result<T, AppError>
where
    T: DeserializeOwned + Validate,
{
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let limit = BodyLimit::of(&request);

    let value: T = match select_decoder(request.method(), content_type.as_deref()) {
        Decoder::Query => {
            let query = request.uri().query().unwrap_or("");
            serde_urlencoded::from_str(query).map_err(param_error)?
        }
        Decoder::Json => {
            let bytes = limit.read(request.into_body()).await?;
            if bytes.is_empty() {
                return Err(param_error("empty request body"));
            }
            serde_json::from_slice(&bytes).map_err(param_error)?
        }
        Decoder::Form => {
            let bytes = limit.read(request.into_body()).await?;
            serde_urlencoded::from_bytes(&bytes).map_err(param_error)?
        }
        Decoder::Multipart => {
            let boundary = multer::parse_boundary(content_type.as_deref().unwrap_or(""))
                .map_err(param_error)?;
            let pairs = multipart_text_fields(request.into_body(), boundary, limit).await?;
            let encoded = serde_urlencoded::to_string(&pairs).map_err(param_error)?;
            serde_urlencoded::from_str(&encoded).map_err(param_error)?
        }
    };

    value.validate().map_err(param_error)?;
    Ok(value)
}

fn multipart_error(err: multer::Error) -> AppError {
    match err {
        multer::Error::StreamSizeExceeded { .. } => param_error(TOO_LARGE),
        other => param_error(other),
    }
}

/// Collect the text parts of a multipart body; file parts are skipped.
async fn multipart_text_fields(
    body: Body,
    boundary: String,
    limit: BodyLimit,
) -> Result<Vec<(String, String)>, AppError> {
    let constraints = multer::Constraints::new()
        .size_limit(multer::SizeLimit::new().whole_stream(limit.0 as u64));
    let mut multipart =
        multer::Multipart::with_constraints(body.into_data_stream(), boundary, constraints);
    let mut pairs = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let text = field.text().await.map_err(multipart_error)?;
        pairs.push((name, text));
    }
    Ok(pairs)
}
