//! Shutdown coordination.
//!
//! # Data Flow
//! ```text
//! trigger()
//!     → broadcast   → HttpServer::run stops accepting and drains
//!                   → scheduler loops exit after their current run
//!     → root token  → every in-flight RequestContext is cancelled
//!                     (business functions answer with a Timeout envelope)
//! ```

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One stop signal for listeners, background jobs and request contexts.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    root: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            root: CancellationToken::new(),
        }
    }

    /// Receiver for tasks that loop until shutdown.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Parent token for request contexts; cancelled by `trigger`.
    pub fn context_root(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Signal everything. Idempotent.
    pub fn trigger(&self) {
        if !self.root.is_cancelled() {
            tracing::info!(subscribers = self.tx.receiver_count(), "Shutdown triggered");
        }
        self.root.cancel();
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Trigger, then wait for `tasks` to finish.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>) {
        self.trigger();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Task ended abnormally during shutdown");
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
