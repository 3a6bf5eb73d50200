//! Account service library.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod dto;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod scheduler;
pub mod service;
pub mod storage;

pub use config::AppConfig;
pub use context::RequestContext;
pub use errors::{AppError, ErrorCode};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
