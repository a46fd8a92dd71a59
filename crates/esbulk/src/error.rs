//! 💀 Errors: the taxonomy of things that go wrong between "here are some events"
//! and "Elasticsearch said 201".
//!
//! 🧠 Knowledge graph:
//! - Everything public returns `anyhow::Result`, with `.context(..)` layered on like lasagna.
//! - At the bottom of each chain sits one of these `BulkError`s when the failure is one a caller
//!   might want to branch on. Fish it out with `err.downcast_ref::<BulkError>()`, or use
//!   [`BulkError::find`] which walks the whole chain for you.
//! - Partial document failures are NOT errors. They live inside `BulkResponse` as failed entries.
//!   The HTTP call worked. Some documents just had a bad day.
//!
//! 🦆 The duck reviewed this enum and filed zero complaints. Suspicious.

use thiserror::Error;

/// 🏷️ The failures worth naming.
#[derive(Debug, Error)]
pub enum BulkError {
    /// 🔧 A required configuration key is absent.
    #[error("missing required configuration key '{0}'")]
    MissingKey(&'static str),

    /// 🔧 A key is present but its value makes no sense.
    #[error("invalid value for configuration key '{key}': {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    /// 📎 The document id template references a field the event does not have.
    #[error("document id template references field '{field}' which the event does not carry")]
    UnresolvedPlaceholder { field: String },

    /// 📅 The timestamp field exists on the event but we could not read a date out of it.
    #[error("timestamp field '{field}' holds '{value}', which is neither RFC 3339 nor epoch millis")]
    InvalidTimestamp { field: String, value: String },

    /// 🚫 The dispatcher's executor refused to run the request.
    #[error("request executor rejected the bulk request: {0}")]
    Rejected(String),

    /// 🔄 Every attempt failed with a transient error and the retry budget is spent.
    #[error("bulk request failed after {attempts} attempt(s), last error: {last_error}")]
    DeliveryExhausted { attempts: u32, last_error: String },

    /// 🚫 The engine answered with a non-retryable status (4xx other than 429).
    #[error("bulk request rejected with status {status}: {body}")]
    RequestRejected { status: u16, body: String },

    /// 📭 A 2xx came back but the body is not a bulk response we can read.
    #[error("malformed bulk response: {0}")]
    MalformedResponse(String),
}

impl BulkError {
    /// 🔍 Walk an `anyhow` chain and return the first `BulkError` in it, if any.
    pub fn find(err: &anyhow::Error) -> Option<&BulkError> {
        err.chain().find_map(|cause| cause.downcast_ref::<BulkError>())
    }

    /// 🔧 Is this a "you configured it wrong" error (fail fast, never retried)?
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BulkError::MissingKey(_)
                | BulkError::InvalidConfig { .. }
                | BulkError::UnresolvedPlaceholder { .. }
                | BulkError::InvalidTimestamp { .. }
        )
    }
}
