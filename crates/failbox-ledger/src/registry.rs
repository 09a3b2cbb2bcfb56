//! Registry of derived failure queue names.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::LedgerError;
use crate::store::ListStore;

/// Tracks which failure queues exist, in one set of the store.
///
/// Names are added on first use and never removed by the ledger.
pub struct FailureQueueRegistry {
    store: Arc<dyn ListStore>,
    registry_key: String,
    suffix: String,
}

impl FailureQueueRegistry {
    /// Create a registry stored under `registry_key`, deriving names with `suffix`.
    pub fn new(
        store: Arc<dyn ListStore>,
        registry_key: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry_key: registry_key.into(),
            suffix: suffix.into(),
        }
    }

    /// Failure queue name for `queue`, without registering it.
    pub fn derive_name(&self, queue: &str) -> String {
        format!("{}{}", queue, self.suffix)
    }

    /// Failure queue name for `queue`, registered in the set.
    pub async fn failure_queue_name(&self, queue: &str) -> Result<String, LedgerError> {
        let name = self.derive_name(queue);
        self.register(&name).await?;
        Ok(name)
    }

    /// Register an already-derived failure queue name.
    pub async fn register(&self, failure_queue: &str) -> Result<(), LedgerError> {
        if self.store.add_member(&self.registry_key, failure_queue).await? {
            debug!("Registered failure queue '{}'", failure_queue);
        }
        Ok(())
    }

    /// Every registered failure queue.
    pub async fn queues(&self) -> Result<BTreeSet<String>, LedgerError> {
        self.store.members(&self.registry_key).await
    }
}
