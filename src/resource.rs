//! Scoped-cleanup helper for asynchronous resources (spec §4.7).
//!
//! Rust already has scope-based cleanup via `Drop`; the idiomatic
//! translation of "attach a cleanup step that runs when the owning scope
//! exits" is an RAII guard, not a manual try/finally. [`ScopeGuard`]
//! composes the way spec §4.7 requires: wrapping an existing guard with a
//! new cleanup step runs the new step first, then the one it wraps.

/// Runs `cleanup` when dropped, unless [`ScopeGuard::disarm`] was called.
pub struct ScopeGuard<F: FnOnce()> {
    cleanup: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub fn new(cleanup: F) -> Self {
        ScopeGuard {
            cleanup: Some(cleanup),
        }
    }

    /// Cancel the pending cleanup; used when ownership of the resource is
    /// being handed off rather than released here.
    pub fn disarm(mut self) {
        self.cleanup = None;
    }

    /// Compose: return a guard whose cleanup runs `extra` first, then the
    /// cleanup this guard already owned.
    pub fn and_then<G: FnOnce()>(mut self, extra: G) -> ScopeGuard<impl FnOnce()> {
        let inner = self.cleanup.take();
        ScopeGuard::new(move || {
            extra();
            if let Some(inner) = inner {
                inner();
            }
        })
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}
