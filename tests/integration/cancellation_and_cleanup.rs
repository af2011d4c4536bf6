//! spec.md §8's "every source receives exactly one cancellation, even when
//! the caller abandons the stream before it settles" property, exercised
//! through the public [`asyncval::encode`] surface rather than reaching
//! into the merge engine directly.

use std::time::Duration;

use asyncval::{encode, AsyncHandle, EncodeOptions, Encodable, Value};
use asyncval_test_support::{FakeSequence, ScriptedStep};
use futures::{pin_mut, StreamExt};

fn never_ending_script() -> Vec<ScriptedStep> {
    (0..1000)
        .map(|n| ScriptedStep::Yield(Encodable::value(Value::number(n as f64))))
        .collect()
}

#[tokio::test]
async fn abandoning_the_stream_cancels_every_still_live_source_exactly_once() {
    let a = FakeSequence::new(never_ending_script());
    let b = FakeSequence::new(never_ending_script());
    let a_cancels = a.cancel_count_handle();
    let b_cancels = b.cancel_count_handle();

    let root = Encodable::object([
        ("a", Encodable::Async(AsyncHandle::AsyncIterable(Box::new(a)))),
        ("b", Encodable::Async(AsyncHandle::AsyncIterable(Box::new(b)))),
    ]);

    {
        let frames = encode(root, EncodeOptions::default());
        pin_mut!(frames);
        // Header, plus a handful of body frames from whichever source wins
        // the race first -- never the full 2000-item script.
        for _ in 0..5 {
            frames.next().await.unwrap().unwrap();
        }
        // `frames` drops here, abandoning the merge stream mid-iteration.
    }

    // Cleanup on drop is spawned rather than awaited inline, so give it a
    // few scheduler turns to actually run before asserting.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let a_done = a_cancels.load(std::sync::atomic::Ordering::SeqCst) == 1;
        let b_done = b_cancels.load(std::sync::atomic::Ordering::SeqCst) == 1;
        if a_done && b_done {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "expected exactly one cancellation per source, got a={} b={}",
                a_cancels.load(std::sync::atomic::Ordering::SeqCst),
                b_cancels.load(std::sync::atomic::Ordering::SeqCst),
            );
        }
        tokio::task::yield_now().await;
    }

    // Still exactly one each a little later -- cleanup never double-cancels.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(a_cancels.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(b_cancels.load(std::sync::atomic::Ordering::SeqCst), 1);
}
