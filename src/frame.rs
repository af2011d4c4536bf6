//! The wire-level frame shapes (spec §6): one header frame followed by a
//! stream of body frames, each one whole newline-delimited JSON line.

use serde_json::Value as Json;

use crate::error::AsyncvalError;
use crate::kinds::{ChunkId, ChunkStatus};

/// One parsed line of the wire protocol.
#[derive(Debug, Clone)]
pub enum Frame {
    /// The base codec's serialization of the root value. Always the first
    /// frame, and there is exactly one per session.
    Header(Json),
    /// `[id, status, payload]`.
    Body {
        id: ChunkId,
        status: ChunkStatus,
        payload: Json,
    },
}

impl Frame {
    /// Render as the exact text that goes on the wire, including the
    /// trailing newline.
    pub fn to_line(&self) -> String {
        let mut s = match self {
            Frame::Header(root) => root.to_string(),
            Frame::Body {
                id,
                status,
                payload,
            } => Json::Array(vec![
                Json::from(id.get()),
                Json::from(status.wire_code()),
                payload.clone(),
            ])
            .to_string(),
        };
        s.push('\n');
        s
    }

    pub fn header(root: Json) -> Frame {
        Frame::Header(root)
    }

    pub fn body(id: ChunkId, status: ChunkStatus, payload: Json) -> Frame {
        Frame::Body {
            id,
            status,
            payload,
        }
    }

    /// Parse a single already-dechunked line (no trailing newline) as a
    /// body frame. The header frame is never ambiguous with a body frame
    /// shape-wise, but which one a line *is* depends on stream position,
    /// so callers track that themselves; this only validates the
    /// `[id, status, payload]` triple shape (spec §7's "structural
    /// error... treated as a transport error").
    pub fn parse_body(line: &str) -> Result<Frame, AsyncvalError> {
        let parsed: Json = serde_json::from_str(line)?;
        let items = parsed
            .as_array()
            .ok_or_else(|| AsyncvalError::MalformedFrame("body frame is not an array".into()))?;
        let [id, status, payload] = items.as_slice() else {
            return Err(AsyncvalError::MalformedFrame(format!(
                "body frame has {} elements, expected 3",
                items.len()
            )));
        };
        let id = id
            .as_u64()
            .and_then(ChunkId::new)
            .ok_or_else(|| AsyncvalError::MalformedFrame("body frame id must be a positive integer".into()))?;
        let status = status
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .and_then(ChunkStatus::from_wire_code)
            .ok_or_else(|| AsyncvalError::MalformedFrame("unknown body frame status".into()))?;
        Ok(Frame::Body {
            id,
            status,
            payload: payload.clone(),
        })
    }

    pub fn parse_header(line: &str) -> Result<Frame, AsyncvalError> {
        Ok(Frame::Header(serde_json::from_str(line)?))
    }
}
