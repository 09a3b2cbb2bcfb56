//! Ledger errors.

use thiserror::Error;

/// Ledger error types.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A store round-trip failed.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A stored element could not be decoded into a failure record.
    #[error("Malformed record at {queue}[{index}]: {message}")]
    MalformedRecord {
        queue: String,
        index: usize,
        message: String,
    },

    /// No element exists at the given position.
    #[error("No failure at {queue}[{index}]")]
    NotFound { queue: String, index: usize },

    /// The job submitter refused a resubmission.
    #[error("Job submission failed: {0}")]
    Submission(String),

    /// A record could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    pub(crate) fn not_found(queue: &str, index: usize) -> Self {
        LedgerError::NotFound {
            queue: queue.to_string(),
            index,
        }
    }

    /// Whether the error leaves the store state unknown.
    pub fn is_storage(&self) -> bool {
        matches!(self, LedgerError::StorageUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = LedgerError::not_found("emails_failed", 7);
        assert_eq!(err.to_string(), "No failure at emails_failed[7]");
    }

    #[test]
    fn test_malformed_display() {
        let err = LedgerError::MalformedRecord {
            queue: "failed".to_string(),
            index: 2,
            message: "expected value".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("failed[2]"));
        assert!(display.contains("expected value"));
    }

    #[test]
    fn test_is_storage() {
        assert!(LedgerError::StorageUnavailable("refused".into()).is_storage());
        assert!(!LedgerError::Submission("closed".into()).is_storage());
    }
}
