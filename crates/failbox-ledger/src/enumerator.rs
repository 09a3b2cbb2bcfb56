//! Counting and reading stored failures.

use std::sync::Arc;

use crate::error::LedgerError;
use crate::record::FailureRecord;
use crate::registry::FailureQueueRegistry;
use crate::store::ListStore;

/// Reads failure queues by position.
pub struct FailureEnumerator {
    store: Arc<dyn ListStore>,
    registry: Arc<FailureQueueRegistry>,
}

impl FailureEnumerator {
    /// Create an enumerator.
    pub fn new(store: Arc<dyn ListStore>, registry: Arc<FailureQueueRegistry>) -> Self {
        Self { store, registry }
    }

    /// Failures in `queue`, or across every registered failure queue when `None`.
    ///
    /// The unscoped count costs one store round-trip per registered queue.
    pub async fn count(&self, queue: Option<&str>) -> Result<usize, LedgerError> {
        if let Some(queue) = queue {
            return self.store.len(queue).await;
        }

        let mut total = 0;
        for queue in self.registry.queues().await? {
            total += self.store.len(&queue).await?;
        }
        Ok(total)
    }

    /// Up to `limit` records from `queue` starting at `offset`.
    ///
    /// Always a sequence, also when it holds a single record. An element that
    /// does not decode yields an error in its own slot; its neighbours still decode.
    pub async fn all(
        &self,
        offset: usize,
        limit: usize,
        queue: &str,
    ) -> Result<Vec<Result<FailureRecord, LedgerError>>, LedgerError> {
        Ok(self.each(offset, limit, queue).await?.map(|(_, record)| record).collect())
    }

    /// The record at `index`.
    pub async fn get(&self, index: usize, queue: &str) -> Result<FailureRecord, LedgerError> {
        let raw = self.store.range(queue, index, 1).await?;
        match raw.first() {
            Some(raw) => FailureRecord::decode_at(raw, queue, index),
            None => Err(LedgerError::not_found(queue, index)),
        }
    }

    /// Fetch a batch and iterate it as `(index, record)` pairs.
    ///
    /// The index is the absolute list position at fetch time, not a stable id:
    /// removing or inserting elements afterwards shifts what it addresses.
    pub async fn each(
        &self,
        offset: usize,
        limit: usize,
        queue: &str,
    ) -> Result<FailureEntries, LedgerError> {
        let raw = self.store.range(queue, offset, limit).await?;
        Ok(FailureEntries {
            queue: queue.to_string(),
            offset,
            raw: raw.into_iter().enumerate(),
        })
    }

    /// Iterate every record currently in `queue`.
    pub async fn each_all(&self, queue: &str) -> Result<FailureEntries, LedgerError> {
        let len = self.store.len(queue).await?;
        self.each(0, len, queue).await
    }
}

/// Single-pass iterator over one fetched batch of failures.
///
/// Decoding happens lazily as the iterator advances.
pub struct FailureEntries {
    queue: String,
    offset: usize,
    raw: std::iter::Enumerate<std::vec::IntoIter<String>>,
}

impl FailureEntries {
    /// Failure queue the batch was read from.
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl Iterator for FailureEntries {
    type Item = (usize, Result<FailureRecord, LedgerError>);

    fn next(&mut self) -> Option<Self::Item> {
        let (position, raw) = self.raw.next()?;
        let index = self.offset + position;
        Some((index, FailureRecord::decode_at(&raw, &self.queue, index)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.raw.size_hint()
    }
}

impl ExactSizeIterator for FailureEntries {}
