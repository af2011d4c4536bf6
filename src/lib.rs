//! Streams a graph of ordinary and asynchronous values as newline-delimited
//! text frames and reconstructs it incrementally at the other end.
//!
//! This crate layers three async-value kinds — one-shot promises, lazy
//! async sequences, and pull-based streams — on top of a small structural
//! value codec ([`value`]) that handles the ordinary shapes (cyclic/shared
//! references within one flatten pass, numeric sentinels, big integers,
//! dates, regexes, and ordered/set-like/unordered-keyed collections).
//!
//! The pieces, leaves first:
//!
//! - [`deferred`] — a one-shot resolvable signal.
//! - [`managed_iterator`] — pulls a single [`managed_iterator::AsyncSource`]
//!   through its idle/pending/done state machine with an idempotent cancel.
//! - [`merge`] — multiplexes an open-ended set of managed iterators into one
//!   ordered asynchronous sequence, with guaranteed cleanup on every exit.
//! - [`encoder`] — walks an [`encodable::Encodable`] tree, assigns chunk-stream
//!   ids to async leaves, and emits the header frame followed by body frames
//!   drained from the merge engine.
//! - [`decoder`] — reads the header frame, opens a demultiplex controller per
//!   referenced id, and dispatches the remaining frames into them
//!   concurrently with the caller draining the reconstructed value.
//! - [`framing`] — adapts a raw byte transport into whole text lines.
//! - [`resource`] — a synchronous RAII scope-exit guard for composing
//!   cascading cleanup steps.
//!
//! See `encoder::encode` and `decoder::decode` for the two halves of the
//! public surface; `value::Value` and `encodable::Encodable` are the data
//! types that flow through them.

pub mod decoder;
pub mod deferred;
pub mod encodable;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod framing;
pub mod kinds;
pub mod managed_iterator;
pub mod merge;
pub mod resource;
pub mod value;

pub use decoder::{decode, AsyncError, DecodeOptions, Decoded};
pub use encodable::{AsyncHandle, AsyncProducer, Encodable, ProducerStep};
pub use encoder::{encode, CoerceError, EncodeOptions, ErrorReducer};
pub use error::AsyncvalError;
pub use kinds::{AsyncKind, ChunkId, ChunkStatus};
pub use value::Value;
