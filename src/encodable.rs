//! The tree type callers build to hand a value to [`crate::encoder`]
//! (spec §4.4's "walks the input value ... each async value it
//! discovers").
//!
//! [`crate::value::Value`] is the base codec's own data model and stays
//! free of async concerns (see that module's docs). [`Encodable`] is the
//! richer tree one level up: everywhere a plain value could go, an
//! asynchronous leaf can go instead, including nested arbitrarily deep —
//! a promise resolving to an object that itself contains another promise
//! is just an `Encodable::Object` holding an `Encodable::Async`.
//!
//! [`AsyncProducer`] is the pull/cancel shape every async leaf reduces
//! to, per spec §9: a promise, an async sequence, and a pull-stream are
//! all "pull-driven lazy sequences with terminal yield/return/throw" —
//! a promise is simply one that never yields before its terminal step.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::error::CauseError;
use crate::kinds::AsyncKind;
use crate::value::Value;

/// A value tree that may contain asynchronous leaves anywhere a plain
/// value could appear.
pub enum Encodable {
    Value(Value),
    Array(Vec<Encodable>),
    Object(Vec<(String, Encodable)>),
    Async(AsyncHandle),
}

impl Encodable {
    pub fn object(entries: impl IntoIterator<Item = (impl Into<String>, Encodable)>) -> Encodable {
        Encodable::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn value(v: Value) -> Encodable {
        Encodable::Value(v)
    }
}

impl From<Value> for Encodable {
    fn from(v: Value) -> Encodable {
        Encodable::Value(v)
    }
}

/// The result of stepping one [`AsyncProducer`].
pub enum ProducerStep {
    /// One produced item; the source may still have more (an
    /// async-sequence/pull-stream step). A promise-like producer must
    /// never return this.
    Yield(Encodable),
    /// Terminal: the sequence's final return value, or a promise's
    /// fulfilled value.
    Return(Encodable),
    /// Terminal: a thrown/rejected cause.
    Error(CauseError),
}

/// The async leaf of an [`Encodable`] tree before the encoder assigns it
/// a chunk-stream id. The three built-in kinds differ only in how their
/// status codes are interpreted on the wire (spec §3); all three are
/// driven identically here.
pub enum AsyncHandle {
    Promise(Box<dyn AsyncProducer>),
    AsyncIterable(Box<dyn AsyncProducer>),
    ReadableStream(Box<dyn AsyncProducer>),
}

impl AsyncHandle {
    pub fn kind(&self) -> AsyncKind {
        match self {
            AsyncHandle::Promise(_) => AsyncKind::Promise,
            AsyncHandle::AsyncIterable(_) => AsyncKind::AsyncIterable,
            AsyncHandle::ReadableStream(_) => AsyncKind::ReadableStream,
        }
    }

    /// Unwrap into the boxed producer, discarding the kind tag (the
    /// encoder keeps the kind separately once it assigns an id).
    pub fn into_producer(self) -> Box<dyn AsyncProducer> {
        match self {
            AsyncHandle::Promise(p)
            | AsyncHandle::AsyncIterable(p)
            | AsyncHandle::ReadableStream(p) => p,
        }
    }
}

/// What every asynchronous leaf reduces to: a pull-driven step with an
/// idempotent-from-the-caller's-perspective cancel.
#[async_trait]
pub trait AsyncProducer: Send {
    async fn step(&mut self) -> ProducerStep;

    /// Cooperative cancellation hook, invoked at most once by the
    /// managed iterator that wraps this producer.
    async fn cancel(&mut self) -> Result<(), CauseError> {
        Ok(())
    }
}

/// Adapts a single [`Future`] into an [`AsyncProducer`] that yields
/// nothing and resolves once, for building [`AsyncHandle::Promise`]
/// values from ordinary async blocks.
pub struct FromFuture<F> {
    inner: Option<Pin<Box<F>>>,
}

impl<F> FromFuture<F>
where
    F: Future<Output = Result<Encodable, CauseError>> + Send,
{
    pub fn new(fut: F) -> Self {
        FromFuture {
            inner: Some(Box::pin(fut)),
        }
    }
}

#[async_trait]
impl<F> AsyncProducer for FromFuture<F>
where
    F: Future<Output = Result<Encodable, CauseError>> + Send,
{
    async fn step(&mut self) -> ProducerStep {
        let Some(fut) = self.inner.take() else {
            return ProducerStep::Return(Encodable::Value(Value::Null));
        };
        match fut.await {
            Ok(v) => ProducerStep::Return(v),
            Err(e) => ProducerStep::Error(e),
        }
    }
}
