use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use asyncval::error::CauseError;
use asyncval::{AsyncProducer, Encodable, ProducerStep};

/// One scripted outcome for a [`FakeSequence`] step.
pub enum ScriptedStep {
    Yield(Encodable),
    Return(Encodable),
    Error(CauseError),
}

/// A programmable [`AsyncProducer`] that replays a fixed script of steps,
/// the async-sequence/pull-stream counterpart to [`crate::FakePromise`].
///
/// Counts cancellations so tests can assert the "every source receives
/// exactly one cancellation" property (spec.md §8) without plumbing a
/// channel through every call site.
pub struct FakeSequence {
    script: std::vec::IntoIter<ScriptedStep>,
    cancels: Arc<AtomicUsize>,
}

impl FakeSequence {
    pub fn new(script: Vec<ScriptedStep>) -> Self {
        FakeSequence {
            script: script.into_iter(),
            cancels: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A shared counter incremented once per `cancel()` call, so the caller
    /// can keep a handle after the source is boxed and moved into an
    /// `Encodable`.
    pub fn cancel_count_handle(&self) -> Arc<AtomicUsize> {
        self.cancels.clone()
    }
}

#[async_trait]
impl AsyncProducer for FakeSequence {
    async fn step(&mut self) -> ProducerStep {
        match self.script.next() {
            Some(ScriptedStep::Yield(v)) => ProducerStep::Yield(v),
            Some(ScriptedStep::Return(v)) => ProducerStep::Return(v),
            Some(ScriptedStep::Error(e)) => ProducerStep::Error(e),
            None => ProducerStep::Return(Encodable::value(asyncval::Value::Null)),
        }
    }

    async fn cancel(&mut self) -> Result<(), CauseError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
