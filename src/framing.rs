//! Turns a raw byte transport into whole text lines (spec §4.6).
//!
//! `tokio_util::codec::LinesCodec` looks like an obvious fit but differs
//! from the spec in one detail: at EOF it emits a final line even when
//! the trailing buffer has no newline, whereas the protocol here treats a
//! non-empty trailing partial as silently discarded (well-formed streams
//! always end with a trailing newline after the last frame). So this
//! hand-rolls the buffer-append-and-split loop the spec describes,
//! built on `futures::stream::unfold` over plain `AsyncRead` reads.

use bytes::BytesMut;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::AsyncvalError;

struct FramingState<R> {
    transport: R,
    buffer: BytesMut,
    ended: bool,
}

/// Wraps an [`AsyncRead`] byte transport into a stream of whole lines
/// (newline stripped), suitable for feeding straight into
/// [`crate::decoder::decode`].
pub fn line_frames<R>(transport: R) -> impl Stream<Item = Result<String, AsyncvalError>>
where
    R: AsyncRead + Unpin,
{
    let state = FramingState {
        transport,
        buffer: BytesMut::new(),
        ended: false,
    };
    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|&b| b == b'\n') {
                let line = state.buffer.split_to(pos);
                let _ = state.buffer.split_to(1); // drop the newline itself
                let text = match String::from_utf8(line.to_vec()) {
                    Ok(t) => Ok(t),
                    Err(e) => Err(AsyncvalError::Transport(e.to_string())),
                };
                return Some((text, state));
            }
            if state.ended {
                return None;
            }
            let mut chunk = [0u8; 8 * 1024];
            match state.transport.read(&mut chunk).await {
                Ok(0) => {
                    state.ended = true;
                }
                Ok(n) => state.buffer.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    state.ended = true;
                    return Some((Err(AsyncvalError::Io(e)), state));
                }
            }
        }
    })
}
