//! Walks an [`Encodable`] tree, assigning a chunk-stream id to every async
//! leaf it discovers and registering each as a producer with a
//! [`MergeEngine`] (spec §4.4).
//!
//! [`Encodable`] already plays the role of "value handed to the base
//! codec with an extra reducer": reducing it to a wire [`Value`] and
//! replacing async leaves with `[name, id]` placeholders happens in one
//! pass ([`reduce`]), so there's no separate reducer-map lookup the way a
//! duck-typed host would need one.
//!
//! A promise never emits `unhandled rejection` the way it would on a host
//! with ambient promise tracking, so spec §4.4/§9's "attach a no-op
//! rejection sink" has no Rust counterpart — a producer's error simply
//! flows through [`ProducerStep::Error`] like any other result.

use std::error::Error as StdError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use tracing::{debug, info, instrument};

use crate::encodable::{AsyncProducer, Encodable, ProducerStep};
use crate::error::{AsyncvalError, CauseError, ValueCause};
use crate::frame::Frame;
use crate::kinds::{AsyncKind, ChunkId, ChunkStatus};
use crate::managed_iterator::{AsyncSource, StepOutcome};
use crate::merge::MergeEngine;
use crate::value::{self, Value};

/// An extractor that turns a thrown/rejected cause into an encodable
/// payload if it recognizes the concrete error type, mirroring spec
/// §4.4's user `reducers` map but scoped to causes (ordinary values never
/// need this — they're already [`Encodable`]).
pub type ErrorReducer = Box<dyn Fn(&(dyn StdError + 'static)) -> Option<Value> + Send + Sync>;

/// Replaces an unencodable cause with a fresh value to encode instead
/// (spec §4.4's `coerceError`, §8 scenario 4).
pub type CoerceError = Box<dyn Fn(&(dyn StdError + 'static)) -> Value + Send + Sync>;

/// Options for one [`encode`] call (spec §4.4, §6).
#[derive(Default)]
pub struct EncodeOptions {
    /// Named extractors tried in order against a producer's thrown cause.
    pub error_reducers: Vec<(String, ErrorReducer)>,
    /// Used to salvage a cause no `error_reducers` entry recognizes.
    pub coerce_error: Option<CoerceError>,
}

/// Shared state every [`FrameProducer`] needs to register nested async
/// leaves discovered inside its own body (spec §4.4's "nested async
/// values get their own ids, appended to the merge engine mid-stream").
/// Cheap to clone: the counter and option lists live behind `Arc`s so every
/// producer can hold its own copy without a `&mut Session` that concurrent
/// steps could never actually share.
#[derive(Clone)]
struct Ctx {
    engine: MergeEngine,
    next_id: Arc<AtomicU64>,
    error_reducers: Arc<Vec<(String, ErrorReducer)>>,
    coerce_error: Arc<Option<CoerceError>>,
}

impl Ctx {
    fn fresh_id(&self) -> ChunkId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        ChunkId::new(n).expect("counter starts at 1 and only increases")
    }
}

/// Reduce an [`Encodable`] tree to a wire [`Value`], registering a new
/// producer for every async leaf encountered (spec §4.4 step 1).
fn reduce(ctx: &Ctx, tree: Encodable) -> Value {
    match tree {
        Encodable::Value(v) => v,
        Encodable::Array(items) => {
            Value::Array(items.into_iter().map(|it| reduce(ctx, it)).collect())
        }
        Encodable::Object(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k, reduce(ctx, v)))
                .collect(),
        ),
        Encodable::Async(handle) => {
            let kind = handle.kind();
            let id = ctx.fresh_id();
            debug!(id = id.get(), kind = %kind, "registering async producer");
            ctx.engine.add(Box::new(FrameProducer {
                id,
                kind,
                inner: handle.into_producer(),
                ctx: ctx.clone(),
            }));
            Value::tagged(kind.tag_name(), Value::number(id.get() as f64))
        }
    }
}

/// `safe(cause)` from spec §4.4: try each registered error reducer, then
/// fall back to `coerce_error`. Only a total failure here tears down the
/// whole session (spec §7 kind 2) — per-id producer errors that *do*
/// encode successfully become an ordinary terminal body frame.
fn encode_cause(ctx: &Ctx, cause: CauseError) -> Result<Value, AsyncvalError> {
    for (name, reducer) in ctx.error_reducers.iter() {
        if let Some(payload) = reducer(cause.as_ref()) {
            return Ok(Value::tagged(name.clone(), payload));
        }
    }
    if let Some(coerce) = ctx.coerce_error.as_ref() {
        return Ok(coerce(cause.as_ref()));
    }
    Err(AsyncvalError::CauseNotEncodable(cause.to_string()))
}

fn body_triple(id: ChunkId, status: ChunkStatus, payload: Value) -> Value {
    Value::Array(vec![
        Value::number(id.get() as f64),
        Value::number(f64::from(status.wire_code())),
        payload,
    ])
}

/// Wraps one [`AsyncProducer`] so the [`MergeEngine`] sees already-encoded
/// body-frame triples (`[id, status, payload]`) rather than raw
/// [`Encodable`] steps, per the per-kind producer behavior in spec §4.4.
struct FrameProducer {
    id: ChunkId,
    kind: AsyncKind,
    inner: Box<dyn AsyncProducer>,
    ctx: Ctx,
}

#[async_trait]
impl AsyncSource for FrameProducer {
    async fn step(&mut self) -> StepOutcome {
        match self.inner.step().await {
            ProducerStep::Yield(enc) => {
                let payload = reduce(&self.ctx, enc);
                StepOutcome::Yield(body_triple(self.id, ChunkStatus::Yield, payload))
            }
            ProducerStep::Return(enc) => {
                let payload = reduce(&self.ctx, enc);
                // A promise's terminal frame is "fulfilled" (wire code 0);
                // a sequence/pull-stream's terminal frame is "return"
                // (wire code 2) — same `ProducerStep::Return`, different
                // wire code because the two kinds namespace status codes
                // differently (spec §3).
                let status = if self.kind == AsyncKind::Promise {
                    ChunkStatus::Yield
                } else {
                    ChunkStatus::Return
                };
                StepOutcome::Return(body_triple(self.id, status, payload))
            }
            ProducerStep::Error(cause) => match encode_cause(&self.ctx, cause) {
                Ok(payload) => {
                    StepOutcome::Return(body_triple(self.id, ChunkStatus::Error, payload))
                }
                Err(e) => StepOutcome::Error(Box::new(ValueCause(Value::str(e.to_string())))),
            },
        }
    }

    async fn cancel(&mut self) -> Result<(), CauseError> {
        self.inner.cancel().await
    }
}

/// Turn one merge-engine item (a `[id, status, payload]` triple built by
/// [`FrameProducer`]) into the exact text line for that body frame,
/// flattening the payload as its own independent node array (spec §6:
/// "payload is itself the base codec's serialization of the chunk's
/// value").
fn render_body_frame(v: Value) -> Result<String, AsyncvalError> {
    let Value::Array(items) = v else {
        return Err(AsyncvalError::MalformedFrame(
            "body frame is not a triple".into(),
        ));
    };
    let [id_v, status_v, payload_v]: [Value; 3] = items.try_into().map_err(|_| {
        AsyncvalError::MalformedFrame("body frame must have exactly 3 elements".into())
    })?;
    let id = match id_v {
        Value::Number(n) => ChunkId::new(n as u64)
            .ok_or_else(|| AsyncvalError::MalformedFrame("body frame id must be positive".into())),
        _ => Err(AsyncvalError::MalformedFrame(
            "body frame id must be numeric".into(),
        )),
    }?;
    let status = match status_v {
        Value::Number(n) => ChunkStatus::from_wire_code(n as u8).ok_or_else(|| {
            AsyncvalError::MalformedFrame("unknown body frame status".into())
        }),
        _ => Err(AsyncvalError::MalformedFrame(
            "body frame status must be numeric".into(),
        )),
    }?;
    let payload_json = value::flatten(&payload_v);
    Ok(Frame::body(id, status, payload_json).to_line())
}

/// Encode `root` as an async sequence of text frames (spec §6:
/// `encode(root, options) -> async-sequence-of-text-chunks`).
///
/// The header frame (spec §4.4 step 2) is produced before the returned
/// stream is ever polled for a body frame — the header walk itself is
/// synchronous, only the chunks it discovers are asynchronous. Body
/// frames (step 3) are drained from the [`MergeEngine`] every discovered
/// async leaf, including ones nested arbitrarily deep inside later
/// chunks, registers itself with.
#[instrument(skip_all)]
pub fn encode(
    root: Encodable,
    options: EncodeOptions,
) -> impl Stream<Item = Result<String, AsyncvalError>> {
    let (engine, consumer) = MergeEngine::new();
    let ctx = Ctx {
        engine: engine.clone(),
        next_id: Arc::new(AtomicU64::new(0)),
        error_reducers: Arc::new(options.error_reducers),
        coerce_error: Arc::new(options.coerce_error),
    };

    let header_value = reduce(&ctx, root);
    let header_json = value::flatten(&header_value);
    let header_line = Frame::header(header_json).to_line();
    info!("encoded header frame");

    let merge_stream = engine
        .consume(consumer)
        .expect("a freshly created engine has never been consumed");
    let body_lines = merge_stream.map(|item| item.and_then(render_body_frame));

    futures::stream::once(async move { Ok::<_, AsyncvalError>(header_line) }).chain(body_lines)
}
