//! Scenario 1 (spec.md §8): an async sequence that yields `-0, 1, 2` then
//! returns `"done"`, round-tripped through the full encode -> decode loop.
//! Exercises the header/body split plus the sentinel round-trip for `-0`.

use asyncval::{decode, encode, AsyncHandle, DecodeOptions, Decoded, EncodeOptions, Encodable, Value};
use asyncval_test_support::{FakeSequence, ScriptedStep};
use futures::{pin_mut, StreamExt};

#[tokio::test]
async fn collects_yields_and_observes_return_value() {
    let seq = FakeSequence::new(vec![
        ScriptedStep::Yield(Encodable::value(Value::number(-0.0))),
        ScriptedStep::Yield(Encodable::value(Value::number(1.0))),
        ScriptedStep::Yield(Encodable::value(Value::number(2.0))),
        ScriptedStep::Return(Encodable::value(Value::str("done"))),
    ]);

    let root = Encodable::object([(
        "seq",
        Encodable::Async(AsyncHandle::AsyncIterable(Box::new(seq))),
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
    let mut seq = entries.remove(0).1.into_sequence().unwrap();

    let mut items = Vec::new();
    while let Some(item) = seq.next().await {
        items.push(item.unwrap().into_value().unwrap());
    }

    assert_eq!(
        items,
        vec![Value::number(-0.0), Value::number(1.0), Value::number(2.0)]
    );
    assert_eq!(seq.return_value(), Some(&Value::str("done")));

    // -0 round-trips preserving sign: it must not collapse to plain 0.
    match &items[0] {
        Value::Sentinel(asyncval::value::Sentinel::NegZero) => {}
        other => panic!("expected negative-zero sentinel, got {other:?}"),
    }
}
