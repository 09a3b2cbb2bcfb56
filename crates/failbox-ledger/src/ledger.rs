//! Ledger facade wiring the components over one store.

use std::sync::Arc;

use failbox_config::{Config, LedgerConfig, StoreBackend};
use tracing::info;

use crate::backend::FailureBackend;
use crate::clock::{Clock, SystemClock};
use crate::enumerator::FailureEnumerator;
use crate::error::LedgerError;
use crate::recorder::FailureRecorder;
use crate::registry::FailureQueueRegistry;
use crate::remover::FailureRemover;
use crate::requeuer::FailureRequeuer;
use crate::store::{FileListStore, ListStore, MemoryListStore};
use crate::submit::{JobSubmitter, StoreJobSubmitter};

/// All ledger components sharing one store, registry and clock.
pub struct FailureLedger {
    config: LedgerConfig,
    store: Arc<dyn ListStore>,
    registry: Arc<FailureQueueRegistry>,
    recorder: Arc<FailureRecorder>,
    enumerator: Arc<FailureEnumerator>,
    requeuer: FailureRequeuer,
    remover: FailureRemover,
}

impl FailureLedger {
    /// Create a ledger on the wall clock.
    pub fn new(
        config: LedgerConfig,
        store: Arc<dyn ListStore>,
        submitter: Arc<dyn JobSubmitter>,
    ) -> Self {
        Self::with_clock(config, store, submitter, Arc::new(SystemClock))
    }

    /// Create a ledger with a custom time source.
    pub fn with_clock(
        config: LedgerConfig,
        store: Arc<dyn ListStore>,
        submitter: Arc<dyn JobSubmitter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let registry = Arc::new(FailureQueueRegistry::new(
            store.clone(),
            config.registry_key.clone(),
            config.failure_suffix.clone(),
        ));
        let recorder = Arc::new(FailureRecorder::new(
            store.clone(),
            registry.clone(),
            clock.clone(),
            config.backtrace_boundary.clone(),
        ));
        let enumerator = Arc::new(FailureEnumerator::new(store.clone(), registry.clone()));
        let requeuer = FailureRequeuer::new(
            store.clone(),
            registry.clone(),
            enumerator.clone(),
            submitter,
            clock,
        );
        let remover = FailureRemover::new(store.clone(), registry.clone(), config.default_queue.clone());

        Self {
            config,
            store,
            registry,
            recorder,
            enumerator,
            requeuer,
            remover,
        }
    }

    /// Open the store described by `config` and build a ledger on it.
    ///
    /// Requeued jobs are submitted through the same store.
    pub async fn open(config: &Config) -> Result<Self, LedgerError> {
        let store: Arc<dyn ListStore> = match config.store.backend {
            StoreBackend::File => {
                let path = config.store.resolved_path();
                info!("Opening file store at {}", path.display());
                Arc::new(FileListStore::new(path).await?)
            }
            StoreBackend::Memory => Arc::new(MemoryListStore::new()),
        };
        let submitter = Arc::new(StoreJobSubmitter::new(
            store.clone(),
            config.submit.queue_prefix.clone(),
            config.submit.queues_key.clone(),
        ));
        Ok(Self::new(config.ledger.clone(), store, submitter))
    }

    /// Ledger configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Failure queue used when none is named.
    pub fn default_queue(&self) -> &str {
        &self.config.default_queue
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn ListStore> {
        &self.store
    }

    pub fn registry(&self) -> &FailureQueueRegistry {
        &self.registry
    }

    pub fn recorder(&self) -> &FailureRecorder {
        &self.recorder
    }

    /// The recorder as a backend handle for job runners.
    pub fn backend(&self) -> Arc<dyn FailureBackend> {
        self.recorder.clone()
    }

    pub fn enumerator(&self) -> &FailureEnumerator {
        &self.enumerator
    }

    pub fn requeuer(&self) -> &FailureRequeuer {
        &self.requeuer
    }

    pub fn remover(&self) -> &FailureRemover {
        &self.remover
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{JobError, JobFailure, JobPayload};
    use serde_json::json;

    #[tokio::test]
    async fn test_open_memory_backend() {
        let mut config = Config::default();
        config.store.backend = StoreBackend::Memory;

        let ledger = FailureLedger::open(&config).await.unwrap();
        assert_eq!(ledger.default_queue(), "failed");

        let failure = JobFailure::new(
            JobPayload::new("Ping", vec![json!("host")]),
            JobError::new("Timeout", "no answer"),
            "probes",
            "w",
        );
        ledger.backend().save(&failure).await.unwrap();

        assert_eq!(ledger.enumerator().count(None).await.unwrap(), 1);
        ledger.requeuer().requeue(0, "probes_failed").await.unwrap();
        assert_eq!(ledger.store().len("queue:probes").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_file_backend() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.store.path = Some(temp_dir.path().to_path_buf());

        let ledger = FailureLedger::open(&config).await.unwrap();
        assert_eq!(ledger.enumerator().count(None).await.unwrap(), 0);
        assert!(temp_dir.path().join("lists").exists());
    }
}
