//! Scripted async sources for integration tests, playing the role
//! `MockWsServer`/`MockWsClient` play for the wire-protocol suite: build
//! test fixtures without spinning up real I/O.

mod fake_promise;
mod fake_sequence;

pub use fake_promise::{FakePromise, FakePromiseResolver};
pub use fake_sequence::{FakeSequence, ScriptedStep};
