//! Scenario 7 (spec.md §8): encode over an in-memory byte pipe, reframe it
//! with [`asyncval::framing::line_frames`], and decode on the other end —
//! exercising §4.6 end to end instead of feeding pre-split strings in.

use asyncval::framing::line_frames;
use asyncval::{decode, encode, AsyncHandle, DecodeOptions, Decoded, EncodeOptions, Encodable, Value};
use asyncval_test_support::{FakeSequence, ScriptedStep};
use futures::{pin_mut, StreamExt};
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn round_trips_through_a_duplex_byte_transport() {
    let s = FakeSequence::new(vec![
        ScriptedStep::Yield(Encodable::value(Value::number(10.0))),
        ScriptedStep::Yield(Encodable::value(Value::number(20.0))),
        ScriptedStep::Return(Encodable::value(Value::str("done"))),
    ]);
    let root = Encodable::object([(
        "s",
        Encodable::Async(AsyncHandle::AsyncIterable(Box::new(s))),
    )]);

    let (mut writer, reader) = tokio::io::duplex(8 * 1024);

    let frames = encode(root, EncodeOptions::default());
    let write_task = tokio::spawn(async move {
        pin_mut!(frames);
        while let Some(line) = frames.next().await {
            let line = line.expect("fake sequence never errors");
            writer
                .write_all(line.as_bytes())
                .await
                .expect("writing into an in-memory pipe never fails");
        }
        // Dropping `writer` here closes the pipe so the reader sees EOF.
    });

    let decoded = decode(line_frames(reader), DecodeOptions::default())
        .await
        .unwrap();
    write_task.await.unwrap();

    let Decoded::Object(mut entries) = decoded else {
        panic!("expected object root");
    };
    let mut seq = entries.remove(0).1.into_sequence().unwrap();

    let mut items = Vec::new();
    while let Some(item) = seq.next().await {
        items.push(item.unwrap().into_value().unwrap());
    }
    assert_eq!(items, vec![Value::number(10.0), Value::number(20.0)]);
    assert_eq!(seq.return_value(), Some(&Value::str("done")));
}
