//! Request context subsystem.
//!
//! # Data Flow
//! ```text
//! context middleware creates RequestContext
//!     → inserted into request extensions
//!     → logger / recovery / auth middleware add fields
//!     → handler adapter hands it to the business function
//!     → services log through it (trace_id on every record)
//!     → fork() for background sub-tasks
//! ```

pub mod request_context;

pub use request_context::{ContextBuilder, Identity, RequestContext, RequestInfo};
