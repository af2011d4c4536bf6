//! Manual smoke-test binary: builds a sample value containing a promise and
//! an async sequence, pipes it through [`asyncval::encode`] to stdout, then
//! feeds the same frames back through [`asyncval::decode`] and prints the
//! reconstructed result. The over-stdio analogue of spec.md §8 scenario 7's
//! HTTP round-trip (no HTTP server is in scope here).

use async_trait::async_trait;
use futures::{pin_mut, StreamExt};
use tracing::info;

use asyncval::error::CauseError;
use asyncval::{
    decode, encode, AsyncHandle, AsyncProducer, DecodeOptions, Decoded, EncodeOptions, Encodable,
    ProducerStep, Value,
};

struct Countdown {
    remaining: Vec<i64>,
}

#[async_trait]
impl AsyncProducer for Countdown {
    async fn step(&mut self) -> ProducerStep {
        if self.remaining.is_empty() {
            ProducerStep::Return(Encodable::value(Value::str("liftoff")))
        } else {
            ProducerStep::Yield(Encodable::value(Value::number(self.remaining.remove(0) as f64)))
        }
    }
}

struct Greeting;

#[async_trait]
impl AsyncProducer for Greeting {
    async fn step(&mut self) -> ProducerStep {
        ProducerStep::Return(Encodable::value(Value::str("hello from asyncval")))
    }

    async fn cancel(&mut self) -> Result<(), CauseError> {
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "asyncval-demo starting");

    let root = Encodable::object([
        (
            "greeting",
            Encodable::Async(AsyncHandle::Promise(Box::new(Greeting))),
        ),
        (
            "countdown",
            Encodable::Async(AsyncHandle::AsyncIterable(Box::new(Countdown {
                remaining: vec![3, 2, 1],
            }))),
        ),
    ]);

    let frames = encode(root, EncodeOptions::default());
    pin_mut!(frames);
    let mut lines = Vec::new();
    while let Some(line) = frames.next().await {
        let line = line.expect("demo producers never fail");
        print!("{line}");
        lines.push(line);
    }

    let source = futures::stream::iter(lines.into_iter().map(Ok));
    let decoded = decode(source, DecodeOptions::default())
        .await
        .expect("demo frames are well-formed");

    let Decoded::Object(mut entries) = decoded else {
        panic!("root is always an object in this demo");
    };
    let countdown = entries.pop().unwrap().1.into_sequence().unwrap();
    let greeting = entries.pop().unwrap().1.into_promise().unwrap();

    let hello = greeting
        .get()
        .await
        .expect("greeting never rejects")
        .into_value()
        .expect("greeting resolves to a plain string");
    println!("# greeting resolved to: {hello:?}");

    let mut countdown = countdown;
    let mut items = Vec::new();
    while let Some(item) = countdown.next().await {
        let item = item
            .expect("countdown never errors")
            .into_value()
            .expect("countdown yields plain numbers");
        items.push(item);
    }
    println!("# countdown yielded: {items:?}");
    println!("# countdown returned: {:?}", countdown.return_value());
}
