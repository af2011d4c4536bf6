//! Scenario 2 (spec.md §8): a root carrying both a promise and an async
//! sequence side by side. Order of the promise's resolution vs. the
//! sequence's frames is not asserted, only that both reach their expected
//! terminal state.

use asyncval::{decode, encode, AsyncHandle, DecodeOptions, Decoded, EncodeOptions, Encodable, Value};
use asyncval_test_support::{FakePromise, FakeSequence, ScriptedStep};
use futures::{pin_mut, StreamExt};

#[tokio::test]
async fn promise_and_sequence_both_settle() {
    let p = FakePromise::ready(Encodable::value(Value::str("hi")));
    let s = FakeSequence::new(vec![
        ScriptedStep::Yield(Encodable::value(Value::number(1.0))),
        ScriptedStep::Yield(Encodable::value(Value::number(2.0))),
        ScriptedStep::Yield(Encodable::value(Value::number(3.0))),
        ScriptedStep::Return(Encodable::value(Value::Null)),
    ]);

    let root = Encodable::object([
        ("p", Encodable::Async(AsyncHandle::Promise(Box::new(p)))),
        ("s", Encodable::Async(AsyncHandle::AsyncIterable(Box::new(s)))),
    ]);

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
    let s_handle = entries.pop().unwrap().1;
    let p_handle = entries.pop().unwrap().1;

    let promise = p_handle.into_promise().unwrap();
    let mut seq = s_handle.into_sequence().unwrap();

    assert_eq!(promise.get().await.unwrap().into_value().unwrap(), Value::str("hi"));

    let mut items = Vec::new();
    while let Some(item) = seq.next().await {
        items.push(item.unwrap().into_value().unwrap());
    }
    assert_eq!(
        items,
        vec![Value::number(1.0), Value::number(2.0), Value::number(3.0)]
    );
}
