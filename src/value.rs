//! The structural value model this crate treats as its "base codec"
//! collaborator (spec §1: assumed external, out of scope beyond the
//! surface the encoder/decoder actually call).
//!
//! [`Value`] is deliberately scoped to what the protocol needs: cyclic/
//! shared references *within one flatten pass*, numeric sentinels,
//! arbitrary-precision integers, calendar values, regex literals,
//! ordered/set-like collections, and tagged placeholders for custom and
//! async reducers. It is not a general `serde` replacement.
//!
//! `flatten`/`unflatten` implement the same node-array wire scheme the
//! wire format examples rely on: the output is a JSON array whose index 0
//! is the root, and every reference from a parent to a child is the
//! child's index into that same array. This is what lets the same chunk
//! id (or the same shared sub-value) appear more than once in the graph
//! without duplicating its serialized form, and is the mechanism behind
//! the "one id, two placeholders" dedup property.

use serde_json::{Map, Number};
use std::collections::HashMap;

use crate::error::AsyncvalError;

/// A structural value flowing through the header/body frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// A finite IEEE-754 double. Non-finite doubles and negative zero are
    /// carried as [`Value::Sentinel`] instead, since plain JSON numbers
    /// can't represent them.
    Number(f64),
    Sentinel(Sentinel),
    Str(String),
    /// Arbitrary-precision integer, stored as its decimal text form.
    BigInt(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    Regex {
        pattern: String,
        flags: String,
    },
    Array(Vec<Value>),
    /// An ordered keyed collection (object / `Map` with string keys).
    Object(Vec<(String, Value)>),
    /// A set-like collection.
    Set(Vec<Value>),
    /// An unordered keyed collection with arbitrary-typed keys.
    Map(Vec<(Value, Value)>),
    /// A tagged placeholder produced by a reducer: `[name, payload]` on
    /// the wire. Async chunk placeholders (`Promise`/`AsyncIterable`/
    /// `ReadableStream`) are ordinary tagged nodes whose payload is the
    /// chunk-stream id.
    Tagged { name: String, payload: Box<Value> },
}

/// Sentinel numeric values the base codec is specified to carry (spec §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    NaN,
    PosInfinity,
    NegInfinity,
    NegZero,
}

impl Sentinel {
    fn wire_tag(self) -> &'static str {
        match self {
            Sentinel::NaN => "nan",
            Sentinel::PosInfinity => "+inf",
            Sentinel::NegInfinity => "-inf",
            Sentinel::NegZero => "-0",
        }
    }

    fn from_wire_tag(tag: &str) -> Option<Sentinel> {
        match tag {
            "nan" => Some(Sentinel::NaN),
            "+inf" => Some(Sentinel::PosInfinity),
            "-inf" => Some(Sentinel::NegInfinity),
            "-0" => Some(Sentinel::NegZero),
            _ => None,
        }
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn object(entries: impl IntoIterator<Item = (impl Into<String>, Value)>) -> Value {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn tagged(name: impl Into<String>, payload: Value) -> Value {
        Value::Tagged {
            name: name.into(),
            payload: Box::new(payload),
        }
    }

    /// Construct a finite number, routing non-finite/negative-zero inputs
    /// to their sentinel form automatically.
    pub fn number(n: f64) -> Value {
        if n.is_nan() {
            Value::Sentinel(Sentinel::NaN)
        } else if n == f64::INFINITY {
            Value::Sentinel(Sentinel::PosInfinity)
        } else if n == f64::NEG_INFINITY {
            Value::Sentinel(Sentinel::NegInfinity)
        } else if n == 0.0 && n.is_sign_negative() {
            Value::Sentinel(Sentinel::NegZero)
        } else {
            Value::Number(n)
        }
    }

    pub fn as_tagged(&self) -> Option<(&str, &Value)> {
        match self {
            Value::Tagged { name, payload } => Some((name.as_str(), payload)),
            _ => None,
        }
    }
}

const RESERVED_BIGINT: &str = "$bigint";
const RESERVED_DATE: &str = "$date";
const RESERVED_REGEX: &str = "$regex";
const RESERVED_SET: &str = "$set";
const RESERVED_MAP: &str = "$map";
const RESERVED_SENTINEL: &str = "$n";

/// Flatten `root` into the node-array wire form (spec §6's header/body
/// payload shape) and return it as already-serialized JSON.
///
/// Node indices are assigned pre-order (a container reserves its own slot
/// before visiting its children), so a value's index is always stable
/// once assigned and earlier than any child that only it refers to — but a
/// child can still be referenced from more than one place by repeating its
/// index, which is how dedup (the same chunk id appearing twice) and
/// shared sub-values are represented.
pub fn flatten(root: &Value) -> serde_json::Value {
    let mut nodes: Vec<serde_json::Value> = Vec::new();
    visit(root, &mut nodes);
    serde_json::Value::Array(nodes)
}

fn visit(v: &Value, nodes: &mut Vec<serde_json::Value>) -> usize {
    let idx = nodes.len();
    nodes.push(serde_json::Value::Null);
    let shape = match v {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Sentinel(s) => {
            let mut m = Map::new();
            m.insert(
                RESERVED_SENTINEL.to_owned(),
                serde_json::Value::String(s.wire_tag().to_owned()),
            );
            serde_json::Value::Object(m)
        }
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::BigInt(digits) => {
            let mut m = Map::new();
            m.insert(
                RESERVED_BIGINT.to_owned(),
                serde_json::Value::String(digits.clone()),
            );
            serde_json::Value::Object(m)
        }
        Value::Date(ms) => {
            let mut m = Map::new();
            m.insert(RESERVED_DATE.to_owned(), serde_json::Value::from(*ms));
            serde_json::Value::Object(m)
        }
        Value::Regex { pattern, flags } => {
            let mut m = Map::new();
            m.insert(
                RESERVED_REGEX.to_owned(),
                serde_json::Value::Array(vec![
                    serde_json::Value::String(pattern.clone()),
                    serde_json::Value::String(flags.clone()),
                ]),
            );
            serde_json::Value::Object(m)
        }
        Value::Array(items) => {
            let refs: Vec<serde_json::Value> = items
                .iter()
                .map(|it| serde_json::Value::from(visit(it, nodes)))
                .collect();
            serde_json::Value::Array(refs)
        }
        Value::Object(entries) => {
            let mut m = Map::new();
            for (k, val) in entries {
                let r = visit(val, nodes);
                m.insert(k.clone(), serde_json::Value::from(r));
            }
            serde_json::Value::Object(m)
        }
        Value::Set(items) => {
            let refs: Vec<serde_json::Value> = items
                .iter()
                .map(|it| serde_json::Value::from(visit(it, nodes)))
                .collect();
            let mut m = Map::new();
            m.insert(RESERVED_SET.to_owned(), serde_json::Value::Array(refs));
            serde_json::Value::Object(m)
        }
        Value::Map(entries) => {
            let refs: Vec<serde_json::Value> = entries
                .iter()
                .map(|(k, val)| {
                    let kr = visit(k, nodes);
                    let vr = visit(val, nodes);
                    serde_json::Value::Array(vec![kr.into(), vr.into()])
                })
                .collect();
            let mut m = Map::new();
            m.insert(RESERVED_MAP.to_owned(), serde_json::Value::Array(refs));
            serde_json::Value::Object(m)
        }
        Value::Tagged { name, payload } => {
            let r = visit(payload, nodes);
            serde_json::Value::Array(vec![serde_json::Value::String(name.clone()), r.into()])
        }
    };
    nodes[idx] = shape;
    idx
}

/// Parse a flattened node array (as produced by [`flatten`]) back into a
/// [`Value`] tree, resolving index references and memoizing repeated
/// indices so shared sub-values are only decoded once.
pub fn unflatten(wire: &serde_json::Value) -> Result<Value, AsyncvalError> {
    let nodes = wire
        .as_array()
        .ok_or_else(|| AsyncvalError::MalformedFrame("header is not a node array".into()))?;
    if nodes.is_empty() {
        return Ok(Value::Null);
    }
    let mut cache = HashMap::new();
    resolve(nodes, 0, &mut cache)
}

fn resolve(
    nodes: &[serde_json::Value],
    idx: usize,
    cache: &mut HashMap<usize, Value>,
) -> Result<Value, AsyncvalError> {
    if let Some(v) = cache.get(&idx) {
        return Ok(v.clone());
    }
    let node = nodes.get(idx).ok_or_else(|| {
        AsyncvalError::MalformedFrame(format!("node index {idx} out of range"))
    })?;
    // Reserve a placeholder before recursing so a genuine self-reference
    // (should the producer ever emit one) terminates instead of looping.
    cache.insert(idx, Value::Null);
    let value = decode_node(nodes, node, cache)?;
    cache.insert(idx, value.clone());
    Ok(value)
}

fn ref_index(v: &serde_json::Value) -> Result<usize, AsyncvalError> {
    v.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| AsyncvalError::MalformedFrame("expected a node reference".into()))
}

fn decode_node(
    nodes: &[serde_json::Value],
    node: &serde_json::Value,
    cache: &mut HashMap<usize, Value>,
) -> Result<Value, AsyncvalError> {
    match node {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => Ok(Value::Number(n.as_f64().unwrap_or_default())),
        serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
        serde_json::Value::Array(items) => {
            if items.len() == 2 {
                if let serde_json::Value::String(name) = &items[0] {
                    if items[1].is_number() {
                        let r = ref_index(&items[1])?;
                        let payload = resolve(nodes, r, cache)?;
                        return Ok(Value::Tagged {
                            name: name.clone(),
                            payload: Box::new(payload),
                        });
                    }
                }
            }
            let mut out = Vec::with_capacity(items.len());
            for it in items {
                let r = ref_index(it)?;
                out.push(resolve(nodes, r, cache)?);
            }
            Ok(Value::Array(out))
        }
        serde_json::Value::Object(map) => decode_object(nodes, map, cache),
    }
}

fn decode_object(
    nodes: &[serde_json::Value],
    map: &Map<String, serde_json::Value>,
    cache: &mut HashMap<usize, Value>,
) -> Result<Value, AsyncvalError> {
    if map.len() == 1 {
        if let Some(tag) = map.get(RESERVED_SENTINEL).and_then(|v| v.as_str()) {
            return Sentinel::from_wire_tag(tag)
                .map(Value::Sentinel)
                .ok_or_else(|| AsyncvalError::MalformedFrame(format!("unknown sentinel {tag}")));
        }
        if let Some(digits) = map.get(RESERVED_BIGINT).and_then(|v| v.as_str()) {
            return Ok(Value::BigInt(digits.to_owned()));
        }
        if let Some(ms) = map.get(RESERVED_DATE).and_then(|v| v.as_i64()) {
            return Ok(Value::Date(ms));
        }
        if let Some(pair) = map.get(RESERVED_REGEX).and_then(|v| v.as_array()) {
            if let [serde_json::Value::String(pattern), serde_json::Value::String(flags)] =
                pair.as_slice()
            {
                return Ok(Value::Regex {
                    pattern: pattern.clone(),
                    flags: flags.clone(),
                });
            }
        }
        if let Some(items) = map.get(RESERVED_SET).and_then(|v| v.as_array()) {
            let mut out = Vec::with_capacity(items.len());
            for it in items {
                let r = ref_index(it)?;
                out.push(resolve(nodes, r, cache)?);
            }
            return Ok(Value::Set(out));
        }
        if let Some(items) = map.get(RESERVED_MAP).and_then(|v| v.as_array()) {
            let mut out = Vec::with_capacity(items.len());
            for pair in items {
                let kv = pair
                    .as_array()
                    .ok_or_else(|| AsyncvalError::MalformedFrame("malformed $map entry".into()))?;
                let [k, v] = kv.as_slice() else {
                    return Err(AsyncvalError::MalformedFrame("malformed $map entry".into()));
                };
                let key = resolve(nodes, ref_index(k)?, cache)?;
                let val = resolve(nodes, ref_index(v)?, cache)?;
                out.push((key, val));
            }
            return Ok(Value::Map(out));
        }
    }
    let mut entries = Vec::with_capacity(map.len());
    for (k, v) in map {
        let r = ref_index(v)?;
        entries.push((k.clone(), resolve(nodes, r, cache)?));
    }
    Ok(Value::Object(entries))
}
