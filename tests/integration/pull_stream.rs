//! Scenario 5 (spec.md §8): a `ReadableStream`-kind leaf is revived as a
//! pull-based reader, not an async sequence; its terminal return payload is
//! ignored by the consumer.

use asyncval::{decode, encode, AsyncHandle, DecodeOptions, Decoded, EncodeOptions, Encodable, Value};
use asyncval_test_support::{FakeSequence, ScriptedStep};
use futures::{pin_mut, StreamExt};

#[tokio::test]
async fn pull_stream_reads_items_and_closes() {
    let s = FakeSequence::new(vec![
        ScriptedStep::Yield(Encodable::value(Value::str("hello"))),
        ScriptedStep::Yield(Encodable::value(Value::str("world"))),
        ScriptedStep::Return(Encodable::value(Value::str("ignored"))),
    ]);

    let root = Encodable::object([(
        "s",
        Encodable::Async(AsyncHandle::ReadableStream(Box::new(s))),
    )]);

    let frames = encode(root, EncodeOptions::default());
    pin_mut!(frames);
    let lines: Vec<String> = frames.map(|r| r.unwrap()).collect().await;

    let decoded = decode(
        futures::stream::iter(lines.into_iter().map(Ok)),
        DecodeOptions::default(),
    )
    .await
    .unwrap();

    let Decoded::Object(mut entries) = decoded else {
        panic!("expected object root");
    };
    let mut stream = entries.remove(0).1.into_pull_stream().unwrap();

    assert_eq!(
        stream.pull().await.unwrap().unwrap().into_value().unwrap(),
        Value::str("hello")
    );
    assert_eq!(
        stream.pull().await.unwrap().unwrap().into_value().unwrap(),
        Value::str("world")
    );
    assert!(stream.pull().await.is_none());
    // Closed: further pulls stay `None`, not a panic or a re-opened stream.
    assert!(stream.pull().await.is_none());
}
