//! Recording failed jobs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::backend::FailureBackend;
use crate::clock::Clock;
use crate::error::LedgerError;
use crate::record::{FailureRecord, JobFailure};
use crate::registry::FailureQueueRegistry;
use crate::store::ListStore;

/// Builds failure records and appends them to failure queues.
pub struct FailureRecorder {
    store: Arc<dyn ListStore>,
    registry: Arc<FailureQueueRegistry>,
    clock: Arc<dyn Clock>,
    backtrace_boundary: String,
}

impl FailureRecorder {
    /// Create a recorder.
    pub fn new(
        store: Arc<dyn ListStore>,
        registry: Arc<FailureQueueRegistry>,
        clock: Arc<dyn Clock>,
        backtrace_boundary: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            backtrace_boundary: backtrace_boundary.into(),
        }
    }

    /// Build the record for `failure` as of now.
    pub fn build(&self, failure: &JobFailure) -> FailureRecord {
        FailureRecord::from_failure(failure, self.clock.now(), &self.backtrace_boundary)
    }

    /// Append `failure` to the failure queue of its originating queue.
    ///
    /// Returns the failure queue name.
    pub async fn record(&self, failure: &JobFailure) -> Result<String, LedgerError> {
        let failure_queue = self.registry.failure_queue_name(&failure.queue).await?;
        self.append(failure, &failure_queue).await?;
        Ok(failure_queue)
    }

    /// Append `failure` to an explicitly named failure queue.
    pub async fn save_to(&self, failure: &JobFailure, failure_queue: &str) -> Result<(), LedgerError> {
        self.registry.register(failure_queue).await?;
        self.append(failure, failure_queue).await
    }

    async fn append(&self, failure: &JobFailure, failure_queue: &str) -> Result<(), LedgerError> {
        let encoded = self.build(failure).encode()?;
        let len = self.store.push(failure_queue, &encoded).await?;
        debug!(
            "Recorded {} failure of {} in '{}' (position {})",
            failure.error.exception,
            failure.payload.class,
            failure_queue,
            len - 1
        );
        Ok(())
    }
}

#[async_trait]
impl FailureBackend for FailureRecorder {
    async fn save(&self, failure: &JobFailure) -> Result<(), LedgerError> {
        self.record(failure).await.map(|_| ())
    }
}
