//! Scenario 6 (spec.md §8): a promise resolving to an object that itself
//! contains another promise. Revival must recurse into the fulfilled
//! payload so the nested placeholder comes back as a still-live handle,
//! not an inert tagged value — exactly two chunk-stream ids are used.

use asyncval::{decode, encode, AsyncHandle, DecodeOptions, Decoded, EncodeOptions, Encodable, Value};
use asyncval_test_support::FakePromise;
use futures::{pin_mut, StreamExt};

#[tokio::test]
async fn nested_promise_is_revived_as_a_live_handle() {
    let comments = FakePromise::ready(Encodable::value(Value::Array(vec![
        Value::str("first"),
        Value::str("second"),
    ])));

    let post = FakePromise::ready(Encodable::object([
        (
            "comments",
            Encodable::Async(AsyncHandle::Promise(Box::new(comments))),
        ),
        ("id", Encodable::value(Value::number(1.0))),
    ]));

    let root = Encodable::object([(
        "post",
        Encodable::Async(AsyncHandle::Promise(Box::new(post))),
    )]);

    let frames = encode(root, EncodeOptions::default());
    pin_mut!(frames);
    let lines: Vec<String> = frames.map(|r| r.unwrap()).collect().await;

    // Header placeholder for `post`, plus one more for the nested
    // `comments` promise once it's discovered while draining `post`'s
    // fulfillment — exactly two ids, never more.
    assert_eq!(lines.len(), 3, "header + post's settle frame + comments' settle frame");

    let decoded = decode(
        futures::stream::iter(lines.into_iter().map(Ok)),
        DecodeOptions::default(),
    )
    .await
    .unwrap();

    let Decoded::Object(mut entries) = decoded else {
        panic!("expected object root");
    };
    let post = entries.remove(0).1.into_promise().unwrap();

    let fulfilled = post.get().await.unwrap();
    let Decoded::Object(mut post_fields) = fulfilled else {
        panic!("post resolves to an object");
    };
    // Field order follows encode order: comments first, then id.
    let id = post_fields.pop().unwrap().1.into_value().unwrap();
    let comments_handle = post_fields.pop().unwrap().1;
    assert_eq!(id, Value::number(1.0));

    // Still a live promise, not an inert tagged placeholder.
    let comments = comments_handle
        .into_promise()
        .expect("nested promise is revived, not left as a tagged value");
    let comments = comments.get().await.unwrap().into_value().unwrap();
    assert_eq!(
        comments,
        Value::Array(vec![Value::str("first"), Value::str("second")])
    );
}
