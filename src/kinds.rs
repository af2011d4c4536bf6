//! The three built-in async value kinds (spec §3) and the chunk-id/status
//! vocabulary the wire frames use to talk about them (spec §6).

use std::fmt;
use std::num::NonZeroU64;

/// Tag names reserved for the built-in async kinds. A custom reducer must
/// not reuse one of these (spec §4.4).
pub const KIND_PROMISE: &str = "Promise";
pub const KIND_ASYNC_ITERABLE: &str = "AsyncIterable";
pub const KIND_READABLE_STREAM: &str = "ReadableStream";

/// One of the three built-in async value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    Promise,
    AsyncIterable,
    ReadableStream,
}

impl AsyncKind {
    pub fn tag_name(self) -> &'static str {
        match self {
            AsyncKind::Promise => KIND_PROMISE,
            AsyncKind::AsyncIterable => KIND_ASYNC_ITERABLE,
            AsyncKind::ReadableStream => KIND_READABLE_STREAM,
        }
    }

    pub fn from_tag_name(name: &str) -> Option<AsyncKind> {
        match name {
            KIND_PROMISE => Some(AsyncKind::Promise),
            KIND_ASYNC_ITERABLE => Some(AsyncKind::AsyncIterable),
            KIND_READABLE_STREAM => Some(AsyncKind::ReadableStream),
            _ => None,
        }
    }
}

impl fmt::Display for AsyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

/// Identifies one producer/controller pair across the lifetime of a
/// session. Ids are assigned sequentially starting at 1; 0 is reserved so
/// a missing/absent id can't be mistaken for a real one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(NonZeroU64);

impl ChunkId {
    pub fn new(n: u64) -> Option<ChunkId> {
        NonZeroU64::new(n).map(ChunkId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The status byte carried by a body frame (spec §6): `0` for an
/// intermediate value, `1` for a terminal error, `2` for a terminal
/// return/completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Yield,
    Error,
    Return,
}

impl ChunkStatus {
    pub fn wire_code(self) -> u8 {
        match self {
            ChunkStatus::Yield => 0,
            ChunkStatus::Error => 1,
            ChunkStatus::Return => 2,
        }
    }

    pub fn from_wire_code(code: u8) -> Option<ChunkStatus> {
        match code {
            0 => Some(ChunkStatus::Yield),
            1 => Some(ChunkStatus::Error),
            2 => Some(ChunkStatus::Return),
            _ => None,
        }
    }
}

impl AsyncKind {
    /// Whether a body frame carrying this wire status code is the last
    /// one this id will ever receive. Status codes are namespaced by kind
    /// (spec §3): a promise settles on its very first (and only) body
    /// frame regardless of code, while a sequence/pull-stream id is
    /// terminal only on `error`/`return` (code 1 or 2) — code 0 there
    /// means "more may follow".
    pub fn is_terminal_status(self, code: u8) -> bool {
        match self {
            AsyncKind::Promise => true,
            AsyncKind::AsyncIterable | AsyncKind::ReadableStream => code != 0,
        }
    }
}
