//! Value encoding for crossing the process boundary.
//!
//! Values travel as strict base64 over JSON so that neither the embedded
//! literals nor the result payload can collide with Ruby quoting or with the
//! payload markers.

use base64::{engine::general_purpose::STANDARD, Engine};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolViolation, Result};

/// Structured result written by the trailer: the evaluated value plus the
/// final value of every input binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub result: Value,
    pub locals: IndexMap<String, Value>,
}

/// Encode a value as the base64 text of a one-element JSON array.
///
/// Wrapping in an array keeps scalars parseable by every JSON parser on the
/// other side, including ones that reject bare top-level scalars.
pub fn encode_literal(value: &Value) -> String {
    let wrapped = Value::Array(vec![value.clone()]);
    STANDARD.encode(wrapped.to_string())
}

/// Encode a payload the same way the trailer does.
pub fn encode_payload(payload: &Payload) -> String {
    let json = serde_json::to_vec(payload).unwrap_or_default();
    STANDARD.encode(json)
}

/// Decode the text found between the payload markers.
pub fn decode_payload(text: &str) -> Result<Payload> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| ProtocolViolation::Undecodable(format!("invalid base64: {}", e)))?;
    let payload: Payload = serde_json::from_slice(&bytes)
        .map_err(|e| ProtocolViolation::Undecodable(format!("unexpected shape: {}", e)))?;
    Ok(payload)
}

/// Quote text as a single-quoted Ruby string literal.
///
/// Single quotes disable interpolation, so only `\` and `'` need escaping.
pub fn ruby_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
