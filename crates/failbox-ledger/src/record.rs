//! Failure record definition and encoding.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LedgerError;

/// Format of `failed_at` and `retried_at`.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S %z";

/// Job description as handed over by the job runner.
///
/// Fields other than `class` and `args` are kept as-is. A payload stored
/// without `args` is written back without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Job class identifier.
    pub class: String,
    /// Positional job arguments, `None` when the payload had none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobPayload {
    /// Create a payload.
    pub fn new(class: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            class: class.into(),
            args: Some(args),
            extra: Map::new(),
        }
    }

    /// Positional arguments, empty when absent.
    pub fn args(&self) -> &[Value] {
        self.args.as_deref().unwrap_or_default()
    }
}

/// The error a job raised.
#[derive(Debug, Clone)]
pub struct JobError {
    /// Fully-qualified error type name.
    pub exception: String,
    /// Raw message bytes, possibly not valid UTF-8.
    pub message: Vec<u8>,
    /// Frames, outermost first.
    pub backtrace: Vec<String>,
}

impl JobError {
    /// Create an error description.
    pub fn new(exception: impl Into<String>, message: impl Into<Vec<u8>>) -> Self {
        Self {
            exception: exception.into(),
            message: message.into(),
            backtrace: Vec::new(),
        }
    }

    /// Describe a Rust error value, naming it by its type path.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        Self::new(std::any::type_name::<E>(), err.to_string())
    }

    /// Set backtrace frames.
    pub fn with_backtrace<I, S>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backtrace = frames.into_iter().map(Into::into).collect();
        self
    }
}

/// One failed job execution handed to a failure backend.
#[derive(Debug, Clone)]
pub struct JobFailure {
    pub payload: JobPayload,
    pub error: JobError,
    /// Queue the job was taken from.
    pub queue: String,
    /// Worker that ran the job.
    pub worker: String,
}

impl JobFailure {
    /// Create a failure.
    pub fn new(
        payload: JobPayload,
        error: JobError,
        queue: impl Into<String>,
        worker: impl Into<String>,
    ) -> Self {
        Self {
            payload,
            error,
            queue: queue.into(),
            worker: worker.into(),
        }
    }
}

/// A stored failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub failed_at: String,
    pub payload: JobPayload,
    pub exception: String,
    pub error: String,
    #[serde(default)]
    pub backtrace: Vec<String>,
    pub worker: String,
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retried_at: Option<String>,
}

impl FailureRecord {
    /// Build a record for `failure` observed at `failed_at`.
    ///
    /// The message is cleaned to valid UTF-8 and the backtrace cut at `boundary`.
    pub fn from_failure(
        failure: &JobFailure,
        failed_at: DateTime<FixedOffset>,
        boundary: &str,
    ) -> Self {
        Self {
            failed_at: format_timestamp(&failed_at),
            payload: failure.payload.clone(),
            exception: failure.error.exception.clone(),
            error: clean_utf8(&failure.error.message),
            backtrace: filter_backtrace(&failure.error.backtrace, boundary),
            worker: failure.worker.clone(),
            queue: failure.queue.clone(),
            retried_at: None,
        }
    }

    /// Encode as a single store value.
    pub fn encode(&self) -> Result<String, LedgerError> {
        serde_json::to_string(self).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    /// Decode a store value.
    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Decode the element found at `queue[index]`.
    pub(crate) fn decode_at(raw: &str, queue: &str, index: usize) -> Result<Self, LedgerError> {
        Self::decode(raw).map_err(|e| LedgerError::MalformedRecord {
            queue: queue.to_string(),
            index,
            message: e.to_string(),
        })
    }

    /// Mark as retried at `at`.
    pub fn mark_retried(&mut self, at: DateTime<FixedOffset>) {
        self.retried_at = Some(format_timestamp(&at));
    }

    /// Parsed `failed_at`.
    pub fn failed_at_time(&self) -> Option<DateTime<FixedOffset>> {
        parse_timestamp(&self.failed_at)
    }

    /// Parsed `retried_at`, if the record was requeued.
    pub fn retried_at_time(&self) -> Option<DateTime<FixedOffset>> {
        self.retried_at.as_deref().and_then(parse_timestamp)
    }
}

/// Render a timestamp the way records store it.
pub fn format_timestamp(at: &DateTime<FixedOffset>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok()
}

/// Decode bytes as UTF-8, dropping invalid sequences.
pub fn clean_utf8(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

/// Keep the frames before the first one containing `boundary`.
///
/// Without a matching frame the whole trace is kept.
pub fn filter_backtrace(frames: &[String], boundary: &str) -> Vec<String> {
    let end = frames
        .iter()
        .position(|frame| frame.contains(boundary))
        .unwrap_or(frames.len());
    frames[..end].to_vec()
}
