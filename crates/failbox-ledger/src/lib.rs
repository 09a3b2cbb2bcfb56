//! # Failbox Ledger
//!
//! Failure ledger for a job-processing system: durably records jobs that
//! raised an error, grouped per originating queue, and lets operators
//! inspect, requeue and purge them.
//!
//! ## Features
//!
//! - Per-queue failure queues (`<queue>_failed`) tracked in a registry set
//! - Positional enumeration and counting
//! - Requeue to the original job queue with `retried_at` stamping
//! - Delete-by-index over a list store that only deletes by value
//! - In-memory and file-backed list stores
//!
//! Records are addressed by their position in a list. Positions shift when
//! another caller removes or inserts elements, so an index read from
//! [`FailureEnumerator::each`] is only valid until the list changes.

pub mod backend;
pub mod clock;
pub mod enumerator;
pub mod error;
pub mod ledger;
pub mod record;
pub mod recorder;
pub mod registry;
pub mod remover;
pub mod requeuer;
pub mod store;
pub mod submit;

pub use backend::{FailureBackend, NullBackend};
pub use clock::{Clock, FixedClock, SystemClock};
pub use enumerator::{FailureEntries, FailureEnumerator};
pub use error::LedgerError;
pub use failbox_config::LedgerConfig;
pub use ledger::FailureLedger;
pub use record::{FailureRecord, JobError, JobFailure, JobPayload};
pub use recorder::FailureRecorder;
pub use registry::FailureQueueRegistry;
pub use remover::FailureRemover;
pub use requeuer::FailureRequeuer;
pub use store::{FileListStore, ListStore, MemoryListStore};
pub use submit::{JobSubmitter, StoreJobSubmitter};
