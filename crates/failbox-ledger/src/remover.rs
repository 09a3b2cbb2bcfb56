//! Deleting failures.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::registry::FailureQueueRegistry;
use crate::store::ListStore;

const SENTINEL_PREFIX: &str = "failbox:removed:";

/// Deletes single records or whole failure queues.
pub struct FailureRemover {
    store: Arc<dyn ListStore>,
    registry: Arc<FailureQueueRegistry>,
    default_queue: String,
}

impl FailureRemover {
    /// Create a remover; `clear` empties `default_queue`.
    pub fn new(
        store: Arc<dyn ListStore>,
        registry: Arc<FailureQueueRegistry>,
        default_queue: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            default_queue: default_queue.into(),
        }
    }

    /// Remove the record at `queue[index]`.
    ///
    /// The store only deletes by value, so the slot is first overwritten with
    /// a sentinel unique to this call, then one occurrence of that sentinel is
    /// removed. The sentinel is not JSON and cannot equal a stored record.
    /// The two steps are not atomic: a concurrent insert or removal before the
    /// first step shifts which record `index` designates.
    pub async fn remove(&self, index: usize, queue: &str) -> Result<(), LedgerError> {
        let sentinel = format!("{}{}", SENTINEL_PREFIX, Uuid::new_v4());

        if !self.store.set(queue, index, &sentinel).await? {
            return Err(LedgerError::not_found(queue, index));
        }
        if self.store.remove_value(queue, 1, &sentinel).await? == 0 {
            warn!("Sentinel for {}[{}] was gone before removal", queue, index);
        }

        info!("Removed failure {}[{}]", queue, index);
        Ok(())
    }

    /// Delete the whole failure queue of `queue`. Registry membership is left
    /// as it was: an unknown queue is not registered by removing it.
    pub async fn remove_queue(&self, queue: &str) -> Result<(), LedgerError> {
        let failure_queue = self.registry.derive_name(queue);
        self.store.delete(&failure_queue).await?;
        info!("Removed failure queue '{}'", failure_queue);
        Ok(())
    }

    /// Delete the default failure queue only.
    pub async fn clear(&self) -> Result<(), LedgerError> {
        self.store.delete(&self.default_queue).await?;
        info!("Cleared failure queue '{}'", self.default_queue);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryListStore;

    fn setup() -> (Arc<MemoryListStore>, Arc<FailureQueueRegistry>, FailureRemover) {
        let store = Arc::new(MemoryListStore::new());
        let registry = Arc::new(FailureQueueRegistry::new(store.clone(), "failed_queues", "_failed"));
        let remover = FailureRemover::new(store.clone(), registry.clone(), "failed");
        (store, registry, remover)
    }

    #[tokio::test]
    async fn test_remove_exact_slot_with_duplicates() {
        let (store, _, remover) = setup();
        for value in ["r0", "dup", "r2", "dup"] {
            store.push("failed", value).await.unwrap();
        }

        remover.remove(3, "failed").await.unwrap();

        assert_eq!(store.range("failed", 0, 10).await.unwrap(), vec!["r0", "dup", "r2"]);
    }

    #[tokio::test]
    async fn test_remove_out_of_range_leaves_list() {
        let (store, _, remover) = setup();
        store.push("failed", "r0").await.unwrap();

        let err = remover.remove(1, "failed").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { index: 1, .. }));
        assert_eq!(store.len("failed").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_queue_keeps_registry() {
        let (store, registry, remover) = setup();
        let name = registry.failure_queue_name("emails").await.unwrap();
        store.push(&name, "r0").await.unwrap();

        remover.remove_queue("emails").await.unwrap();

        assert_eq!(store.len("emails_failed").await.unwrap(), 0);
        assert!(registry.queues().await.unwrap().contains("emails_failed"));
    }

    #[tokio::test]
    async fn test_remove_queue_does_not_register_unknown_queue() {
        let (_, registry, remover) = setup();

        remover.remove_queue("never_used").await.unwrap();

        assert!(registry.queues().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_only_default_queue() {
        let (store, registry, remover) = setup();
        store.push("failed", "r0").await.unwrap();
        store.push("emails_failed", "r1").await.unwrap();
        registry.register("emails_failed").await.unwrap();

        remover.clear().await.unwrap();

        assert_eq!(store.len("failed").await.unwrap(), 0);
        assert_eq!(store.len("emails_failed").await.unwrap(), 1);
        assert_eq!(registry.queues().await.unwrap().len(), 1);
    }
}
