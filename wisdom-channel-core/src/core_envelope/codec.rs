//! Envelope construction and verification
//!
//! The tag is HMAC-SHA256 over the canonical JSON of `{body, id, op}`:
//! object keys sorted at every depth, no insignificant whitespace. Both
//! sides canonicalize, so the wire JSON may use any key order.
//!
//! Numbers keep the text they had on the wire (serde_json
//! `arbitrary_precision`), so the tag covers `1e-07` and `1e-7` as
//! different values and a float never changes on a parse/print cycle.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use uuid::Uuid;

use super::{Envelope, EnvelopeError, EnvelopeResult, Operation, WireEnvelope};

type HmacSha256 = Hmac<Sha256>;

/// Rebuild `value` with object keys in sorted order at every depth
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Bytes covered by the tag
pub fn canonical_bytes(id: &str, op: &str, body: &Value) -> EnvelopeResult<Vec<u8>> {
    let mut map = Map::new();
    map.insert("body".to_string(), canonicalize(body));
    map.insert("id".to_string(), Value::String(id.to_string()));
    map.insert("op".to_string(), Value::String(op.to_string()));
    serde_json::to_vec(&Value::Object(map)).map_err(|e| EnvelopeError::Serialization(e.to_string()))
}

fn mac(key: &[u8]) -> EnvelopeResult<HmacSha256> {
    HmacSha256::new_from_slice(key).map_err(|_| EnvelopeError::InvalidKey)
}

/// Build a tagged envelope with a fresh id
pub fn encode(op: Operation, body: Value, signing_key: &[u8]) -> EnvelopeResult<Envelope> {
    let id = Uuid::new_v4().to_string();
    let canonical = canonical_bytes(&id, op.as_str(), &body)?;

    let mut mac = mac(signing_key)?;
    mac.update(&canonical);
    let hmac = STANDARD.encode(mac.finalize().into_bytes());

    Ok(Envelope { id, op, body, hmac })
}

/// Parse wire bytes and check the tag against `expected_key`
///
/// Any tag problem, including a tag that is not valid base64, is reported
/// as `Integrity` and the body is discarded.
pub fn decode_and_verify(wire: &[u8], expected_key: &[u8]) -> EnvelopeResult<Envelope> {
    let raw: WireEnvelope =
        serde_json::from_slice(wire).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    let tag = STANDARD.decode(raw.hmac.as_bytes()).map_err(|_| EnvelopeError::Integrity)?;
    let canonical = canonical_bytes(&raw.id, &raw.op, &raw.body)?;

    let mut mac = mac(expected_key)?;
    mac.update(&canonical);
    mac.verify_slice(&tag).map_err(|_| EnvelopeError::Integrity)?;

    Ok(Envelope {
        op: Operation::parse(&raw.op),
        id: raw.id,
        body: raw.body,
        hmac: raw.hmac,
    })
}
