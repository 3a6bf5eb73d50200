//! Request-scoped correlation context.
//!
//! # Responsibilities
//! - Carry the trace ID, start time and deadline of one request
//! - Hold identity, request metadata and custom fields set along the way
//! - Accumulate log fields and emit records through the attached `LogSink`
//! - Provide cooperative cancellation for collaborators
//!
//! # Design Decisions
//! - `RequestContext` is a cheap handle (`Arc`); cloning the handle shares state
//! - `fork()` derives an independent child context for sub-tasks
//! - Trace ID, start time, deadline and logger are fixed at creation and read without a lock
//! - Mutable state sits behind one `RwLock`: readers don't block readers

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use uuid::Uuid;

use crate::observability::{LogField, LogSink};

/// Authenticated identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub role: String,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// HTTP metadata recorded when the context is attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    pub client_ip: String,
    pub user_agent: String,
}

#[derive(Default)]
struct MutableState {
    identity: Option<Identity>,
    request_info: Option<RequestInfo>,
    custom_fields: HashMap<String, Value>,
    log_fields: Vec<LogField>,
}

struct Inner {
    trace_id: String,
    start: Instant,
    started_at: SystemTime,
    deadline: Option<Instant>,
    cancel: CancellationToken,
    logger: Option<Arc<dyn LogSink>>,
    state: RwLock<MutableState>,
}

/// Per-request correlation, identity, timing and log-field carrier.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

/// Builder for [`RequestContext`].
#[derive(Default)]
pub struct ContextBuilder {
    parent: Option<CancellationToken>,
    deadline: Option<Instant>,
    logger: Option<Arc<dyn LogSink>>,
}

impl ContextBuilder {
    /// Cancel the new context whenever `parent` is cancelled.
    pub fn parent(mut self, parent: &CancellationToken) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Deadline relative to now.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    /// Absolute deadline. The earliest of several calls wins.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> RequestContext {
        let cancel = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };

        RequestContext {
            inner: Arc::new(Inner {
                trace_id: Uuid::new_v4().to_string(),
                start: Instant::now(),
                started_at: SystemTime::now(),
                deadline: self.deadline,
                cancel,
                logger: self.logger,
                state: RwLock::new(MutableState::default()),
            }),
        }
    }
}

impl RequestContext {
    /// New context with no parent, no deadline and no logger.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn trace_id(&self) -> &str {
        &self.inner.trace_id
    }

    /// Wall-clock creation time.
    pub fn started_at(&self) -> SystemTime {
        self.inner.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.start.elapsed()
    }

    pub fn has_logger(&self) -> bool {
        self.inner.logger.is_some()
    }

    /// Record the authenticated identity. Later calls overwrite.
    pub fn set_identity(&self, user_id: impl Into<String>, username: impl Into<String>, role: impl Into<String>) {
        let identity = Identity {
            user_id: user_id.into(),
            username: username.into(),
            role: role.into(),
        };

        let mut state = self.inner.state.write();
        state.log_fields.push(LogField::new("user_id", identity.user_id.clone()));
        state.log_fields.push(LogField::new("username", identity.username.clone()));
        state.log_fields.push(LogField::new("user_role", identity.role.clone()));
        state.identity = Some(identity);
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.read().identity.clone()
    }

    pub fn set_request_info(
        &self,
        method: impl Into<String>,
        path: impl Into<String>,
        client_ip: impl Into<String>,
        user_agent: impl Into<String>,
    ) {
        let info = RequestInfo {
            method: method.into(),
            path: path.into(),
            client_ip: client_ip.into(),
            user_agent: user_agent.into(),
        };

        let mut state = self.inner.state.write();
        state.log_fields.push(LogField::new("method", info.method.clone()));
        state.log_fields.push(LogField::new("path", info.path.clone()));
        state.log_fields.push(LogField::new("client_ip", info.client_ip.clone()));
        state.log_fields.push(LogField::new("user_agent", info.user_agent.clone()));
        state.request_info = Some(info);
    }

    pub fn request_info(&self) -> Option<RequestInfo> {
        self.inner.state.read().request_info.clone()
    }

    /// Set a queryable custom field. Also appended to the log fields.
    pub fn set_field(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        let mut state = self.inner.state.write();
        state.log_fields.push(LogField::new(key.clone(), value.clone()));
        state.custom_fields.insert(key, value);
    }

    pub fn get_field(&self, key: &str) -> Option<Value> {
        self.inner.state.read().custom_fields.get(key).cloned()
    }

    /// Snapshot of all custom fields.
    pub fn custom_fields(&self) -> HashMap<String, Value> {
        self.inner.state.read().custom_fields.clone()
    }

    /// Append a log field without touching the custom fields.
    pub fn add_log_field(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.state.write().log_fields.push(LogField::new(key, value));
    }

    /// Snapshot of the accumulated log fields, in insertion order.
    pub fn log_fields(&self) -> Vec<LogField> {
        self.inner.state.read().log_fields.clone()
    }

    pub fn log_debug(&self, message: &str, extra: &[LogField]) {
        self.log(Level::DEBUG, message, extra);
    }

    pub fn log_info(&self, message: &str, extra: &[LogField]) {
        self.log(Level::INFO, message, extra);
    }

    pub fn log_warn(&self, message: &str, extra: &[LogField]) {
        self.log(Level::WARN, message, extra);
    }

    pub fn log_error(&self, message: &str, extra: &[LogField]) {
        self.log(Level::ERROR, message, extra);
    }

    /// Emit through the attached sink.
    ///
    /// Field order: `trace_id`, `duration`, accumulated fields, then `extra`.
    pub fn log(&self, level: Level, message: &str, extra: &[LogField]) {
        let Some(logger) = &self.inner.logger else {
            return;
        };

        let fields = self.build_log_fields(extra);
        logger.emit(level, message, &fields);
    }

    fn build_log_fields(&self, extra: &[LogField]) -> Vec<LogField> {
        let state = self.inner.state.read();
        let mut fields = Vec::with_capacity(2 + state.log_fields.len() + extra.len());
        fields.push(LogField::new("trace_id", self.inner.trace_id.clone()));
        fields.push(LogField::new("duration", format!("{:?}", self.elapsed())));
        fields.extend(state.log_fields.iter().cloned());
        fields.extend(extra.iter().cloned());
        fields
    }

    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// True once cancelled explicitly, through the parent, or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
            || self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Token for collaborators that want to select on cancellation.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.inner.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline.into()) => {}
                }
            }
            None => self.inner.cancel.cancelled().await,
        }
    }

    /// Derive a context for a sub-task.
    ///
    /// Keeps the trace ID, logger, identity, request info and a copy of the
    /// accumulated fields. Gets a fresh start time and its own cancellation,
    /// unlinked from this context in both directions.
    pub fn fork(&self) -> RequestContext {
        let state = self.inner.state.read();
        let copied = MutableState {
            identity: state.identity.clone(),
            request_info: state.request_info.clone(),
            custom_fields: state.custom_fields.clone(),
            log_fields: state.log_fields.clone(),
        };

        RequestContext {
            inner: Arc::new(Inner {
                trace_id: self.inner.trace_id.clone(),
                start: Instant::now(),
                started_at: SystemTime::now(),
                deadline: None,
                cancel: CancellationToken::new(),
                logger: self.inner.logger.clone(),
                state: RwLock::new(copied),
            }),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("trace_id", &self.inner.trace_id)
            .field("elapsed", &self.elapsed())
            .field("deadline", &self.inner.deadline)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
