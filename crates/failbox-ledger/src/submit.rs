//! Resubmitting jobs to their queues.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::LedgerError;
use crate::store::ListStore;

/// Hands a job to the queue system for execution.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    /// Enqueue `class` with `args` on `queue`.
    async fn submit(&self, queue: &str, class: &str, args: &[Value]) -> Result<(), LedgerError>;
}

/// Enqueues jobs on the same list store the ledger uses.
///
/// A job on queue `q` is pushed as `{"class", "args"}` onto `{prefix}q`, and
/// `q` is added to the queues set.
pub struct StoreJobSubmitter {
    store: Arc<dyn ListStore>,
    queue_prefix: String,
    queues_key: String,
}

impl StoreJobSubmitter {
    /// Create a submitter.
    pub fn new(
        store: Arc<dyn ListStore>,
        queue_prefix: impl Into<String>,
        queues_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            queue_prefix: queue_prefix.into(),
            queues_key: queues_key.into(),
        }
    }

    /// List key holding the jobs of `queue`.
    pub fn queue_key(&self, queue: &str) -> String {
        format!("{}{}", self.queue_prefix, queue)
    }
}

#[async_trait]
impl JobSubmitter for StoreJobSubmitter {
    async fn submit(&self, queue: &str, class: &str, args: &[Value]) -> Result<(), LedgerError> {
        if queue.is_empty() {
            return Err(LedgerError::Submission("job has no queue".to_string()));
        }
        if class.is_empty() {
            return Err(LedgerError::Submission("job has no class".to_string()));
        }

        let job = json!({ "class": class, "args": args }).to_string();
        self.store.add_member(&self.queues_key, queue).await?;
        self.store.push(&self.queue_key(queue), &job).await?;

        debug!("Submitted {} to queue '{}'", class, queue);
        Ok(())
    }
}
