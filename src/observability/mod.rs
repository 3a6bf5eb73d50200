//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext.log_*()
//!     → LogSink (logging.rs)
//!     → tracing subscriber (pretty / json)
//!
//! logger middleware, scheduler
//!     → metrics.rs counters / histograms
//!     → Prometheus exporter (optional)
//!
//! panic inside a request or job
//!     → panic.rs hook records the backtrace
//!     → recovery / scheduler log it
//! ```

pub mod logging;
pub mod metrics;
pub mod panic;

pub use logging::{LogField, LogRecord, LogSink, RecordingSink, TracingSink};
