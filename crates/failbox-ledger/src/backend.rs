//! Failure backend capability.

use async_trait::async_trait;
use tracing::debug;

use crate::error::LedgerError;
use crate::record::JobFailure;

/// Something a job runner hands failed jobs to.
#[async_trait]
pub trait FailureBackend: Send + Sync {
    /// Persist one failure.
    async fn save(&self, failure: &JobFailure) -> Result<(), LedgerError>;
}

/// Backend that drops every failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

#[async_trait]
impl FailureBackend for NullBackend {
    async fn save(&self, failure: &JobFailure) -> Result<(), LedgerError> {
        debug!(
            "Dropping failure of {} from queue '{}'",
            failure.payload.class, failure.queue
        );
        Ok(())
    }
}
