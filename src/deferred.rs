//! A one-shot resolvable signal (spec §4.1).
//!
//! Built on [`tokio::sync::oneshot`], which already gives us single-shot,
//! attach-before-or-after-resolve semantics for free — the same primitive
//! the teacher crate reaches for whenever one task needs to wake another
//! (`tokio::sync::{oneshot, watch}` throughout `services/receiver`).

use tokio::sync::oneshot;

/// Holds the pending half of a [`Deferred`] until `resolve`/`reject` fires.
pub struct Deferred<T> {
    tx: Option<oneshot::Sender<T>>,
    rx: Option<oneshot::Receiver<T>>,
}

impl<T> Deferred<T> {
    pub fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Deferred {
            tx: Some(tx),
            rx: Some(rx),
        }
    }

    /// Resolve the signal. Safe to call at most once; later calls are
    /// no-ops (the sender is consumed on first use).
    pub fn resolve(&mut self, value: T) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(value);
        }
    }

    /// Take the completion future. Awaiting it blocks until `resolve` is
    /// called, even if that happens before this is polled.
    pub fn completion(&mut self) -> oneshot::Receiver<T> {
        self.rx
            .take()
            .expect("Deferred::completion called more than once")
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// [`Deferred`] specialized for a fallible result, giving separate
/// `resolve`/`reject` entry points as spec §4.1 names them.
pub struct DeferredResult<T, E> {
    inner: Deferred<Result<T, E>>,
}

impl<T, E> DeferredResult<T, E> {
    pub fn new() -> Self {
        DeferredResult {
            inner: Deferred::new(),
        }
    }

    pub fn resolve(&mut self, value: T) {
        self.inner.resolve(Ok(value));
    }

    pub fn reject(&mut self, err: E) {
        self.inner.resolve(Err(err));
    }

    pub fn completion(&mut self) -> oneshot::Receiver<Result<T, E>> {
        self.inner.completion()
    }
}

impl<T, E> Default for DeferredResult<T, E> {
    fn default() -> Self {
        Self::new()
    }
}
