use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use asyncval::deferred::Deferred;
use asyncval::error::CauseError;
use asyncval::{AsyncProducer, Encodable, ProducerStep};

/// A [`Deferred`]-backed [`AsyncProducer`] whose settlement is driven by a
/// separate [`FakePromiseResolver`] handle, so a test can interleave
/// resolving it with unrelated work (spec.md §8 scenario 6's nested
/// promise, or any test that wants to resolve out of registration order).
pub struct FakePromise {
    rx: Option<tokio::sync::oneshot::Receiver<Result<Encodable, CauseError>>>,
}

/// The other half of [`FakePromise::new`]: settles the promise exactly
/// once.
pub struct FakePromiseResolver {
    deferred: Arc<AsyncMutex<Deferred<Result<Encodable, CauseError>>>>,
}

impl FakePromise {
    pub fn new() -> (FakePromise, FakePromiseResolver) {
        let mut deferred = Deferred::new();
        let rx = deferred.completion();
        let deferred = Arc::new(AsyncMutex::new(deferred));
        (FakePromise { rx: Some(rx) }, FakePromiseResolver { deferred })
    }

    /// A promise already settled to a fulfilled value, for tests that don't
    /// need to control timing.
    pub fn ready(value: Encodable) -> FakePromise {
        let (promise, resolver) = FakePromise::new();
        // The resolver's mutex is never contended at construction time, so
        // this always completes immediately.
        futures::executor::block_on(resolver.resolve(value));
        promise
    }
}

impl FakePromiseResolver {
    pub async fn resolve(self, value: Encodable) {
        self.deferred.lock().await.resolve(Ok(value));
    }

    pub async fn reject(self, cause: CauseError) {
        self.deferred.lock().await.resolve(Err(cause));
    }
}

#[async_trait]
impl AsyncProducer for FakePromise {
    async fn step(&mut self) -> ProducerStep {
        let Some(rx) = self.rx.take() else {
            return ProducerStep::Return(Encodable::value(asyncval::Value::Null));
        };
        match rx.await {
            Ok(Ok(v)) => ProducerStep::Return(v),
            Ok(Err(e)) => ProducerStep::Error(e),
            Err(_) => ProducerStep::Error(Box::new(std::io::Error::other(
                "fake promise dropped without settling",
            ))),
        }
    }
}
