//! Wraps a single asynchronous sequence into a pull-driven machine with an
//! idempotent cancel (spec §4.2).
//!
//! `AsyncSource` is the crate's answer to spec §9's "dynamic dispatch on
//! value shape" note: Rust has no single uniform await primitive the way
//! the host platform in the original design does, so instead of a
//! duck-typed predicate we use explicit sum-type discrimination — a
//! source is unambiguously one of `Yield`/`Return`/`Error` each time it's
//! stepped, matching the "pull-driven lazy sequence with terminal
//! yield/return/throw" framing of spec §9.

use async_trait::async_trait;

use crate::error::CauseError;
use crate::value::Value;

/// The outcome of one `step()` call on an [`AsyncSource`].
pub enum StepOutcome {
    /// One produced item; the source may still have more.
    Yield(Value),
    /// The sequence is exhausted; carries its final return value.
    Return(Value),
    /// The sequence failed; terminal.
    Error(CauseError),
}

/// A single asynchronous producer: a promise, async sequence, or
/// pull-stream, abstracted over its concrete await mechanism.
///
/// Implementations must tolerate `cancel` being called after the source
/// has already reached a terminal state (spec §4.2: destroy is
/// idempotent).
#[async_trait]
pub trait AsyncSource: Send {
    /// Advance the source by one step. Implementations that model a
    /// single-shot value (a promise) must return exactly one
    /// `Return`/`Error` and never be stepped again.
    async fn step(&mut self) -> StepOutcome;

    /// Best-effort cooperative cancellation. Called at most once, and
    /// only while the source has not already reached a terminal state.
    async fn cancel(&mut self) -> Result<(), CauseError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Pending,
    Done,
}

/// Drives one [`AsyncSource`] through the `idle -> pending -> idle | done`
/// state machine of spec §4.2, invoking a callback with each result.
pub struct ManagedIterator {
    source: Box<dyn AsyncSource>,
    state: State,
}

impl ManagedIterator {
    pub fn new(source: Box<dyn AsyncSource>) -> Self {
        ManagedIterator {
            source,
            state: State::Idle,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Issue one step if idle; a no-op otherwise. Returns `None` when the
    /// pull was skipped (already pending or done).
    pub async fn pull(&mut self) -> Option<StepOutcome> {
        if self.state != State::Idle {
            return None;
        }
        self.state = State::Pending;
        let outcome = self.source.step().await;
        self.state = match &outcome {
            StepOutcome::Yield(_) => State::Idle,
            StepOutcome::Return(_) | StepOutcome::Error(_) => State::Done,
        };
        Some(outcome)
    }

    /// Mark done and best-effort cancel the upstream source. Idempotent:
    /// calling this when already done is a no-op that returns `Ok(())`.
    pub async fn destroy(&mut self) -> Result<(), CauseError> {
        if self.state == State::Done {
            return Ok(());
        }
        self.state = State::Done;
        self.source.cancel().await
    }
}
