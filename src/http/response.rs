//! Response envelope and error rendering.
//!
//! # Responsibilities
//! - Render success values as `{code: 0, message: "success", data}`
//! - Render `AppError` as `{code, message, data: null, detail?}`
//! - Render any other error as a system error carrying its text as detail
//!
//! # Design Decisions
//! - Envelopes always use HTTP 200; the numeric code is the contract
//! - The recovery path is the only producer of a non-200 status (500, empty body)

use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::Value;

use crate::errors::{AppError, ErrorCode};

/// The uniform JSON body of every API response.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct Envelope {
    pub code: i32,
    pub message: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self {
            code: ErrorCode::Success.as_i32(),
            message: ErrorCode::Success.message().to_string(),
            data,
            detail: None,
        }
    }

    pub fn from_app_error(err: &AppError) -> Self {
        Self {
            code: err.code().as_i32(),
            message: err.message().to_string(),
            data: Value::Null,
            detail: err.detail().map(str::to_string),
        }
    }

    /// Envelope for an arbitrary error: `AppError` as is, anything else as a system error.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        match AppError::downcast_ref(err) {
            Some(app) => Self::from_app_error(app),
            None => Self::from_app_error(&AppError::wrap(ErrorCode::SystemError, err)),
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Success envelope around a serializable result. `()` renders as `null`.
pub fn success<T: Serialize>(data: &T) -> Response {
    match serde_json::to_value(data) {
        Ok(value) => Envelope::success(value).into_response(),
        Err(e) => Envelope::from_app_error(&AppError::wrap(ErrorCode::SystemError, e)).into_response(),
    }
}

/// Error envelope for any error.
pub fn error(err: &(dyn std::error::Error + 'static)) -> Response {
    Envelope::from_error(err).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        Envelope::from_app_error(&self).into_response()
    }
}
