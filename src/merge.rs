//! Multiplexes an open-ended collection of [`AsyncSource`]s into one
//! asynchronous sequence (spec §4.3).
//!
//! Kept deliberately kind-agnostic: the merge engine knows nothing about
//! chunk ids, frames, or the promise/sequence/pull-stream distinction —
//! that belongs to [`crate::encoder`], which wraps each producer so its
//! `Yield` results are already-built body-frame values and its
//! `Return`/`Error` are purely internal bookkeeping (see the encoder's
//! `FrameProducer`). This mirrors the module boundary in spec §4: the
//! merge engine only ever sees "more values" vs. "this source is done".
//!
//! Driven by a single [`futures::stream::FuturesUnordered`] so the whole
//! engine runs as one logical task (spec §5's single-threaded cooperative
//! model) rather than spawning a task per source.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::error::AsyncvalError;
use crate::managed_iterator::{AsyncSource, ManagedIterator, StepOutcome};
use crate::value::Value;

type SourceId = u64;
type SharedIterator = Arc<AsyncMutex<ManagedIterator>>;

/// Handle used to register new producers; cheap to clone, can outlive the
/// consumer (late `add` calls after the consumer finishes are dropped
/// silently, matching a closed channel).
#[derive(Clone)]
pub struct MergeEngine {
    new_source_tx: mpsc::UnboundedSender<Box<dyn AsyncSource>>,
    consumed: Arc<AtomicBool>,
}

/// The single-consumer view produced by [`MergeEngine::consume`].
pub struct MergeConsumer {
    new_source_rx: mpsc::UnboundedReceiver<Box<dyn AsyncSource>>,
    live: HashMap<SourceId, SharedIterator>,
    inflight: FuturesUnordered<BoxFuture<'static, (SourceId, StepOutcome)>>,
    next_id: AtomicU64,
    channel_open: bool,
}

fn pull_future(id: SourceId, mi: SharedIterator) -> BoxFuture<'static, (SourceId, StepOutcome)> {
    Box::pin(async move {
        let outcome = mi
            .lock()
            .await
            .pull()
            .await
            .unwrap_or(StepOutcome::Return(Value::Null));
        (id, outcome)
    })
}

impl MergeEngine {
    pub fn new() -> (MergeEngine, MergeConsumer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = MergeEngine {
            new_source_tx: tx,
            consumed: Arc::new(AtomicBool::new(false)),
        };
        let consumer = MergeConsumer {
            new_source_rx: rx,
            live: HashMap::new(),
            inflight: FuturesUnordered::new(),
            next_id: AtomicU64::new(0),
            channel_open: true,
        };
        (engine, consumer)
    }

    /// Register a new source. Safe to call before, during, or after
    /// consumption starts; silently dropped once the consumer is gone.
    pub fn add(&self, source: Box<dyn AsyncSource>) {
        let _ = self.new_source_tx.send(source);
    }

    /// Take the single-consumer stream. Spec §4.3's "second concurrent
    /// consumption attempt is a fatal error" is enforced here: calling
    /// this a second time returns [`AsyncvalError::AlreadyConsuming`]
    /// synchronously rather than surfacing it through the stream.
    pub fn consume(&self, consumer: MergeConsumer) -> Result<MergeStream, AsyncvalError> {
        if self.consumed.swap(true, Ordering::SeqCst) {
            return Err(AsyncvalError::AlreadyConsuming);
        }
        Ok(MergeStream {
            consumer: Some(consumer),
            cleanup_started: false,
        })
    }
}

/// The merged stream of values. Yields `Ok(v)` for every `yield`/`error`
/// result bubbled up from a live source (an encoder-level error is turned
/// into a stream item, not a Rust panic, by [`crate::encoder`]'s
/// `FrameProducer` before it ever reaches here — see module docs).
///
/// Dropping this stream before it's exhausted — or it ending for any
/// reason — destroys every still-live source in parallel and aggregates
/// destruction failures into [`AsyncvalError::Composite`].
pub struct MergeStream {
    consumer: Option<MergeConsumer>,
    cleanup_started: bool,
}

impl MergeStream {
    async fn cleanup(consumer: &mut MergeConsumer) -> Option<AsyncvalError> {
        let mut causes = Vec::new();
        let live: Vec<SharedIterator> = consumer.live.drain().map(|(_, v)| v).collect();
        let destroys = live.into_iter().map(|mi| async move {
            mi.lock().await.destroy().await
        });
        for result in futures::future::join_all(destroys).await {
            if let Err(e) = result {
                causes.push(AsyncvalError::CauseNotEncodable(e.to_string()));
            }
        }
        consumer.inflight.clear();
        AsyncvalError::composite(causes)
    }
}

impl Stream for MergeStream {
    type Item = Result<Value, AsyncvalError>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        let this = self.get_mut();
        let Some(consumer) = this.consumer.as_mut() else {
            return Poll::Ready(None);
        };

        loop {
            // Drain newly-registered sources before waiting, so `add`
            // calls made while a step is in flight start immediately.
            while let Poll::Ready(maybe_src) = consumer.new_source_rx.poll_recv(cx) {
                match maybe_src {
                    Some(source) => {
                        let id = consumer.next_id.fetch_add(1, Ordering::SeqCst);
                        let mi = Arc::new(AsyncMutex::new(ManagedIterator::new(source)));
                        consumer.live.insert(id, mi.clone());
                        consumer.inflight.push(pull_future(id, mi));
                    }
                    None => {
                        consumer.channel_open = false;
                        break;
                    }
                }
            }

            if consumer.inflight.is_empty() {
                if consumer.channel_open {
                    // Nothing in flight but the registration channel is
                    // still open — wait for either a new source or a
                    // wake from `add` (poll_recv above registered the
                    // waker already).
                    return Poll::Pending;
                }
                // Fully drained and no more sources can ever arrive.
                let fut = Self::cleanup(consumer);
                futures::pin_mut!(fut);
                return match fut.as_mut().poll(cx) {
                    Poll::Ready(Some(err)) => {
                        this.consumer = None;
                        Poll::Ready(Some(Err(err)))
                    }
                    Poll::Ready(None) => {
                        this.consumer = None;
                        Poll::Ready(None)
                    }
                    Poll::Pending => Poll::Pending,
                };
            }

            match consumer.inflight.poll_next_unpin(cx) {
                Poll::Ready(Some((id, outcome))) => match outcome {
                    StepOutcome::Yield(v) => {
                        if let Some(mi) = consumer.live.get(&id) {
                            consumer.inflight.push(pull_future(id, mi.clone()));
                        }
                        return Poll::Ready(Some(Ok(v)));
                    }
                    StepOutcome::Return(_) => {
                        consumer.live.remove(&id);
                        continue;
                    }
                    StepOutcome::Error(e) => {
                        consumer.live.remove(&id);
                        return Poll::Ready(Some(Err(AsyncvalError::CauseNotEncodable(
                            e.to_string(),
                        ))));
                    }
                },
                // `FuturesUnordered` was non-empty by the check above, so
                // `Ready(None)` can't actually happen here; loop back to
                // the top (which re-checks emptiness) rather than assume.
                Poll::Ready(None) => continue,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for MergeStream {
    fn drop(&mut self) {
        if self.cleanup_started {
            return;
        }
        self.cleanup_started = true;
        if let Some(mut consumer) = self.consumer.take() {
            // Best-effort: spawn the cleanup so cancellation-on-drop still
            // destroys live sources even though `Drop` can't be async.
            tokio::spawn(async move {
                let _ = MergeStream::cleanup(&mut consumer).await;
            });
        }
    }
}
