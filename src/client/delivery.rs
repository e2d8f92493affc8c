//! Single-context callback delivery.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tracing::warn;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs caller callbacks one at a time on a dedicated worker task, so
/// completions from concurrent dispatches never run their handlers in parallel.
///
/// The worker is started on first use and must be used from within a Tokio
/// runtime. It stops once the owning session is dropped.
pub(crate) struct DeliveryQueue {
    tx: OnceLock<mpsc::UnboundedSender<Job>>,
}

impl DeliveryQueue {
    pub(crate) fn new() -> Self {
        Self {
            tx: OnceLock::new(),
        }
    }

    pub(crate) fn deliver(&self, job: Job) {
        let tx = self.tx.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run(rx));
            tx
        });
        if tx.send(job).is_err() {
            warn!("delivery worker is gone; dropping callback");
        }
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("completion callback panicked");
        }
    }
}
