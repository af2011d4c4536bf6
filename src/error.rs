//! Error taxonomy for the encoder, decoder, and merge engine.
//!
//! Mirrors the error kinds enumerated in the protocol design: per-id
//! producer errors are carried as ordinary [`Value`](crate::value::Value)
//! payloads on the wire and never appear here — this enum is for the
//! failures that can't be represented as a body frame (transport, protocol
//! misuse, cleanup).

use crate::value::Value;
use std::fmt;

/// Errors surfaced by [`crate::encoder`], [`crate::decoder`], and
/// [`crate::merge`].
#[derive(Debug, thiserror::Error)]
pub enum AsyncvalError {
    /// JSON parsing/formatting failure at the frame boundary.
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure reading or writing the underlying transport.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    /// A body frame did not parse as `[id, status, payload]`.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A tagged node referenced a reducer/reviver name that isn't registered.
    #[error("unknown reducer/reviver name: {0}")]
    UnknownName(String),

    /// The frame stream ended while one or more controllers were still open.
    #[error("stream interrupted: malformed stream")]
    StreamInterrupted,

    /// The upstream frame transport raised an error before all ids completed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A value thrown or rejected by a producer, carried as an encodable payload.
    #[error("producer error")]
    Producer(Value),

    /// Encoding a producer's thrown cause failed, and no `coerce_error` was
    /// configured (or it also failed).
    #[error("cause not encodable: {0}")]
    CauseNotEncodable(String),

    /// A second attempt was made to consume a [`crate::merge::MergeEngine`]
    /// sequence that already has an active consumer.
    #[error("merge engine is already being consumed")]
    AlreadyConsuming,

    /// Cleanup of one or more live producers failed during cancellation.
    #[error("{} cleanup error(s) during cancellation", .0.len())]
    Composite(Vec<AsyncvalError>),
}

impl AsyncvalError {
    /// Build the composite cleanup error of §7 kind 7, or return the single
    /// error directly when only one cause was collected.
    pub fn composite(mut causes: Vec<AsyncvalError>) -> Option<AsyncvalError> {
        match causes.len() {
            0 => None,
            1 => causes.pop(),
            _ => Some(AsyncvalError::Composite(causes)),
        }
    }
}

/// A boxed, thread-safe producer error, used for thrown/rejected causes
/// before they are reduced to an encodable [`Value`].
pub type CauseError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A cause that has already been reduced to (or simply carries) a [`Value`],
/// so it can flow through code paths generic over `std::error::Error`.
#[derive(Debug, Clone)]
pub struct ValueCause(pub Value);

impl fmt::Display for ValueCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl std::error::Error for ValueCause {}
