//! Sending failed jobs back to their queues.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::enumerator::FailureEnumerator;
use crate::error::LedgerError;
use crate::record::FailureRecord;
use crate::registry::FailureQueueRegistry;
use crate::store::ListStore;
use crate::submit::JobSubmitter;

/// Resubmits stored failures and stamps them as retried.
///
/// Records stay in their failure queue after a requeue.
pub struct FailureRequeuer {
    store: Arc<dyn ListStore>,
    registry: Arc<FailureQueueRegistry>,
    enumerator: Arc<FailureEnumerator>,
    submitter: Arc<dyn JobSubmitter>,
    clock: Arc<dyn Clock>,
}

impl FailureRequeuer {
    /// Create a requeuer.
    pub fn new(
        store: Arc<dyn ListStore>,
        registry: Arc<FailureQueueRegistry>,
        enumerator: Arc<FailureEnumerator>,
        submitter: Arc<dyn JobSubmitter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            enumerator,
            submitter,
            clock,
        }
    }

    /// Requeue the record at `queue[index]`, returning it as updated.
    ///
    /// The record is rewritten in place before the job is submitted. Read,
    /// rewrite and submit are separate store calls; a concurrent removal in
    /// between can make `index` point at another record.
    pub async fn requeue(&self, index: usize, queue: &str) -> Result<FailureRecord, LedgerError> {
        let mut record = self.enumerator.get(index, queue).await?;
        record.mark_retried(self.clock.now());

        let encoded = record.encode()?;
        if !self.store.set(queue, index, &encoded).await? {
            return Err(LedgerError::not_found(queue, index));
        }

        self.submitter
            .submit(&record.queue, &record.payload.class, record.payload.args())
            .await?;

        info!(
            "Requeued {}[{}] ({}) to queue '{}'",
            queue, index, record.payload.class, record.queue
        );
        Ok(record)
    }

    /// Requeue every record in the failure queue of `queue`, in index order.
    ///
    /// Records that do not decode are skipped. Returns how many were requeued.
    pub async fn requeue_queue(&self, queue: &str) -> Result<usize, LedgerError> {
        let failure_queue = self.registry.failure_queue_name(queue).await?;
        let entries = self.enumerator.each_all(&failure_queue).await?;

        let mut requeued = 0;
        for (index, record) in entries {
            match record {
                Ok(_) => {
                    self.requeue(index, &failure_queue).await?;
                    requeued += 1;
                }
                Err(e) => warn!("Skipping {}", e),
            }
        }

        info!("Requeued {} failures from '{}'", requeued, failure_queue);
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::record::{JobError, JobFailure, JobPayload};
    use crate::recorder::FailureRecorder;
    use crate::store::MemoryListStore;
    use async_trait::async_trait;
    use chrono::DateTime;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSubmitter {
        jobs: Mutex<Vec<(String, String, Vec<Value>)>>,
    }

    #[async_trait]
    impl JobSubmitter for RecordingSubmitter {
        async fn submit(&self, queue: &str, class: &str, args: &[Value]) -> Result<(), LedgerError> {
            self.jobs
                .lock()
                .await
                .push((queue.to_string(), class.to_string(), args.to_vec()));
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryListStore>,
        submitter: Arc<RecordingSubmitter>,
        recorder: FailureRecorder,
        enumerator: Arc<FailureEnumerator>,
        requeuer: FailureRequeuer,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryListStore::new());
        let registry = Arc::new(FailureQueueRegistry::new(store.clone(), "failed_queues", "_failed"));
        let failed_clock = FixedClock(DateTime::parse_from_rfc3339("2026-10-18T08:00:00+00:00").unwrap());
        let retry_clock = FixedClock(DateTime::parse_from_rfc3339("2026-10-18T10:15:00+00:00").unwrap());
        let enumerator = Arc::new(FailureEnumerator::new(store.clone(), registry.clone()));
        let submitter = Arc::new(RecordingSubmitter::default());

        Fixture {
            recorder: FailureRecorder::new(store.clone(), registry.clone(), Arc::new(failed_clock), "job::perform"),
            requeuer: FailureRequeuer::new(
                store.clone(),
                registry,
                enumerator.clone(),
                submitter.clone(),
                Arc::new(retry_clock),
            ),
            store,
            submitter,
            enumerator,
        }
    }

    fn failure(n: i64) -> JobFailure {
        JobFailure::new(
            JobPayload::new("Charge", vec![json!(n), json!("usd")]),
            JobError::new("DeclinedError", "card declined"),
            "billing",
            "w1",
        )
    }

    #[tokio::test]
    async fn test_requeue_stamps_and_submits_once() {
        let f = fixture();
        f.recorder.record(&failure(1)).await.unwrap();
        let before = f.enumerator.get(0, "billing_failed").await.unwrap();

        let updated = f.requeuer.requeue(0, "billing_failed").await.unwrap();
        assert_eq!(updated.retried_at.as_deref(), Some("2026/10/18 10:15:00 +0000"));

        let stored = f.enumerator.get(0, "billing_failed").await.unwrap();
        assert_eq!(stored, updated);
        assert_eq!(
            FailureRecord { retried_at: None, ..stored },
            before
        );

        let jobs = f.submitter.jobs.lock().await;
        assert_eq!(
            *jobs,
            vec![("billing".to_string(), "Charge".to_string(), vec![json!(1), json!("usd")])]
        );
    }

    #[tokio::test]
    async fn test_requeue_out_of_range() {
        let f = fixture();
        f.recorder.record(&failure(1)).await.unwrap();

        let err = f.requeuer.requeue(5, "billing_failed").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { index: 5, .. }));
        assert!(f.submitter.jobs.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_requeue_queue_keeps_ledger_size() {
        let f = fixture();
        for n in 0..3 {
            f.recorder.record(&failure(n)).await.unwrap();
        }

        assert_eq!(f.requeuer.requeue_queue("billing").await.unwrap(), 3);
        assert_eq!(f.store.len("billing_failed").await.unwrap(), 3);

        let args: Vec<_> = f
            .submitter
            .jobs
            .lock()
            .await
            .iter()
            .map(|(_, _, args)| args[0].clone())
            .collect();
        assert_eq!(args, vec![json!(0), json!(1), json!(2)]);

        for record in f.enumerator.all(0, 3, "billing_failed").await.unwrap() {
            assert!(record.unwrap().retried_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_requeue_queue_skips_malformed() {
        let f = fixture();
        f.recorder.record(&failure(0)).await.unwrap();
        f.store.push("billing_failed", "garbage").await.unwrap();
        f.recorder.record(&failure(2)).await.unwrap();

        assert_eq!(f.requeuer.requeue_queue("billing").await.unwrap(), 2);
        assert_eq!(f.submitter.jobs.lock().await.len(), 2);
    }
}
