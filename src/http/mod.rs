//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, global middleware)
//!     → router.rs (group / route middleware, handler adapter)
//!     → binder.rs (decode + validate the typed request)
//!     → business function
//!     → response.rs (uniform envelope)
//!     → Send to client
//! ```

pub mod binder;
pub mod middleware;
pub mod response;
pub mod router;
pub mod server;

pub use binder::{bind, Validate};
pub use response::Envelope;
pub use router::{ElegantRouter, Endpoint, Middleware};
pub use server::HttpServer;
