//! Error taxonomy subsystem.
//!
//! # Data Flow
//! ```text
//! collaborator error (StoreError, TokenError, ...)
//!     → service layer maps domain failures to AppError(code)
//!     → handler adapter returns Err(BoxError)
//!     → http::response renders the envelope
//! ```
//!
//! # Design Decisions
//! - One closed registry of numeric codes (codes.rs)
//! - AppError is immutable; its message always comes from the registry
//! - Anything that is not an AppError renders as a system error

pub mod app_error;
pub mod codes;

pub use app_error::{AppError, BoxError};
pub use codes::{message_for, ErrorCode};
