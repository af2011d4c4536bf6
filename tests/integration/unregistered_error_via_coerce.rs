//! Scenario 4 (spec.md §8): a promise rejects with a plain `io::Error` that
//! has no registered reducer. `coerce_error` salvages it into a
//! `WrappedErr`, which has its own reducer/reviver pair.

use asyncval::error::CauseError;
use asyncval::{decode, encode, AsyncError, AsyncHandle, DecodeOptions, Decoded, EncodeOptions, Encodable, Value};
use asyncval_test_support::{FakePromise, FakePromiseResolver};
use futures::{pin_mut, StreamExt};

#[derive(Debug)]
struct WrappedErr {
    message: String,
}

impl std::fmt::Display for WrappedErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "wrapped: {}", self.message)
    }
}

impl std::error::Error for WrappedErr {}

#[tokio::test]
async fn coerce_error_salvages_unregistered_cause() {
    let (promise, resolver): (FakePromise, FakePromiseResolver) = FakePromise::new();
    resolver
        .reject(Box::new(std::io::Error::other("x")))
        .await;

    let root = Encodable::object([(
        "p",
        Encodable::Async(AsyncHandle::Promise(Box::new(promise))),
    )]);

    let mut encode_opts = EncodeOptions::default();
    encode_opts.coerce_error = Some(Box::new(|cause: &(dyn std::error::Error + 'static)| {
        Value::tagged("WrappedErr", Value::str(cause.to_string()))
    }));

    let frames = encode(root, encode_opts);
    pin_mut!(frames);
    let lines: Vec<String> = frames.map(|r| r.unwrap()).collect().await;

    let mut decode_opts = DecodeOptions::default();
    decode_opts.error_revivers.push((
        "WrappedErr".to_string(),
        Box::new(|payload: Value| -> CauseError {
            let message = match payload {
                Value::Str(s) => s,
                other => format!("{other:?}"),
            };
            Box::new(WrappedErr { message })
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
    let promise = entries.remove(0).1.into_promise().unwrap();

    match promise.get().await {
        Err(AsyncError::Cause(cause)) => {
            assert_eq!(cause.to_string(), "wrapped: x");
        }
        Err(AsyncError::Protocol(e)) => panic!("unexpected protocol error: {e}"),
        Ok(_) => panic!("expected a WrappedErr cause, got a fulfilled value"),
    }
}
