//! Background job scheduler.
//!
//! # Responsibilities
//! - Register named jobs against schedule expressions
//! - Run each job on its own tokio task
//! - Give every run a fresh `RequestContext` (own trace ID, `job` field)
//! - Contain job failures and panics; a failing run never stops the job
//!
//! # Data Flow
//! ```text
//! add_job(spec, name, handler)
//!     → start(&Shutdown)
//!     → per job: sleep until next fire time → new RequestContext → handler(ctx)
//!     → outcome logged through the context + scheduler_job_runs_total
//!     → shutdown broadcast ends the loop
//! ```

pub mod schedule;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use chrono::Utc;
use tokio::time::{self, Instant};

use crate::context::RequestContext;
use crate::errors::BoxError;
use crate::lifecycle::Shutdown;
use crate::observability::panic::{panic_message, take_backtrace};
use crate::observability::{metrics, LogField, LogSink};

pub use schedule::{Schedule, SchedulerError};

type JobFn = Arc<dyn Fn(RequestContext) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

struct Job {
    name: String,
    schedule: Schedule,
    handler: JobFn,
}

/// Registry of scheduled jobs.
pub struct Scheduler {
    logger: Arc<dyn LogSink>,
    jobs: Vec<Job>,
}

impl Scheduler {
    pub fn new(logger: Arc<dyn LogSink>) -> Self {
        Self {
            logger,
            jobs: Vec::new(),
        }
    }

    /// Register `handler` to run on `spec`.
    pub fn add_job<F, Fut>(
        &mut self,
        spec: &str,
        name: impl Into<String>,
        handler: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let name = name.into();
        if self.jobs.iter().any(|j| j.name == name) {
            return Err(SchedulerError::DuplicateJob(name));
        }
        let schedule: Schedule = spec.parse()?;

        self.jobs.push(Job {
            name,
            schedule,
            handler: Arc::new(move |ctx| handler(ctx).boxed()),
        });
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }

    /// Spawn one task per job. Tasks exit when `shutdown` is triggered.
    pub fn start(self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        let logger = self.logger;
        self.jobs
            .into_iter()
            .map(|job| {
                let logger = logger.clone();
                let mut stop = shutdown.subscribe();
                tracing::info!(job = %job.name, schedule = %job.schedule, "Scheduling job");

                tokio::spawn(async move {
                    while let Some(delay) = job.schedule.next_delay(Utc::now()) {
                        tokio::select! {
                            _ = stop.recv() => break,
                            _ = time::sleep_until(Instant::now() + delay) => run_once(&job, &logger).await,
                        }
                    }
                    tracing::debug!(job = %job.name, "Job stopped");
                })
            })
            .collect()
    }
}

async fn run_once(job: &Job, logger: &Arc<dyn LogSink>) {
    let ctx = RequestContext::builder().logger(logger.clone()).build();
    ctx.set_field("job", job.name.as_str());
    ctx.log_debug("job started", &[]);

    let outcome = AssertUnwindSafe((job.handler)(ctx.clone()))
        .catch_unwind()
        .await;

    let label = match outcome {
        Ok(Ok(())) => {
            ctx.log_info("job finished", &[]);
            "success"
        }
        Ok(Err(e)) => {
            ctx.log_error("job failed", &[LogField::new("error", e.to_string())]);
            "error"
        }
        Err(payload) => {
            let mut fields = vec![LogField::new("error", panic_message(payload.as_ref()))];
            if let Some(stack) = take_backtrace() {
                fields.push(LogField::new("stack", stack));
            }
            ctx.log_error("job panicked", &fields);
            "panic"
        }
    };
    metrics::record_job_run(&job.name, label);
}
