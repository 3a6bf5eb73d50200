//! The client-facing application error.

use std::fmt;

use super::codes::ErrorCode;

/// Boxed error accepted by the handler adapter and the responder.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured error with a registered code, its canonical message and an
/// optional free-text detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    code: ErrorCode,
    detail: Option<String>,
}

impl AppError {
    /// Create an error for `code` without detail.
    pub fn new(code: ErrorCode) -> Self {
        Self { code, detail: None }
    }

    /// Create an error carrying a detail string. Empty details are dropped.
    pub fn with_detail(code: ErrorCode, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self {
            code,
            detail: (!detail.is_empty()).then_some(detail),
        }
    }

    /// Wrap another error, keeping its text as the detail.
    pub fn wrap(code: ErrorCode, source: impl fmt::Display) -> Self {
        Self::with_detail(code, source.to_string())
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &'static str {
        self.code.message()
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Find an `AppError` inside a boxed error, if that is what it holds.
    pub fn downcast_ref<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a AppError> {
        err.downcast_ref::<AppError>()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(
                f,
                "code: {}, message: {}, detail: {}",
                self.code,
                self.message(),
                detail
            ),
            None => write!(f, "code: {}, message: {}", self.code, self.message()),
        }
    }
}

impl std::error::Error for AppError {}

impl From<ErrorCode> for AppError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}
