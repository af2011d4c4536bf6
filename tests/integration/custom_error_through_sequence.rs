//! Scenario 3 (spec.md §8): a user-registered `MyErr` reducer/reviver pair
//! carries a thrown cause through a sequence's terminal error frame and
//! back into a typed error on the decode side.

use std::fmt;

use asyncval::error::CauseError;
use asyncval::{decode, encode, AsyncHandle, AsyncError, DecodeOptions, Decoded, EncodeOptions, Encodable, Value};
use asyncval_test_support::{FakeSequence, ScriptedStep};
use futures::{pin_mut, StreamExt};

#[derive(Debug)]
struct MyErr {
    message: String,
}

impl fmt::Display for MyErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MyErr {}

#[tokio::test]
async fn custom_error_round_trips_through_terminal_frame() {
    let s = FakeSequence::new(vec![
        ScriptedStep::Yield(Encodable::value(Value::number(0.0))),
        ScriptedStep::Yield(Encodable::value(Value::number(1.0))),
        ScriptedStep::Error(Box::new(MyErr {
            message: "boom".into(),
        })),
    ]);

    let root = Encodable::object([(
        "s",
        Encodable::Async(AsyncHandle::AsyncIterable(Box::new(s))),
    )]);

    let mut encode_opts = EncodeOptions::default();
    encode_opts.error_reducers.push((
        "MyErr".to_string(),
        Box::new(|cause: &(dyn std::error::Error + 'static)| {
            cause
                .downcast_ref::<MyErr>()
                .map(|e| Value::str(e.message.clone()))
        }),
    ));

    let frames = encode(root, encode_opts);
    pin_mut!(frames);
    let lines: Vec<String> = frames.map(|r| r.unwrap()).collect().await;

    let mut decode_opts = DecodeOptions::default();
    decode_opts.error_revivers.push((
        "MyErr".to_string(),
        Box::new(|payload: Value| -> CauseError {
            let message = match payload {
                Value::Str(s) => s,
                other => format!("{other:?}"),
            };
            Box::new(MyErr { message })
        }),
    ));

    let decoded = decode(
        futures::stream::iter(lines.into_iter().map(Ok)),
        decode_opts,
    )
    .await
    .unwrap();

    let Decoded::Object(mut entries) = decoded else {
        panic!("expected object root");
    };
    let mut seq = entries.remove(0).1.into_sequence().unwrap();

    let first = seq.next().await.unwrap().unwrap().into_value().unwrap();
    let second = seq.next().await.unwrap().unwrap().into_value().unwrap();
    assert_eq!(first, Value::number(0.0));
    assert_eq!(second, Value::number(1.0));

    let third = seq.next().await.unwrap();
    match third {
        Err(AsyncError::Cause(cause)) => {
            assert_eq!(cause.to_string(), "boom");
        }
        Err(AsyncError::Protocol(e)) => panic!("unexpected protocol error: {e}"),
        Ok(_) => panic!("expected a MyErr cause, got a successful yield"),
    }
}
