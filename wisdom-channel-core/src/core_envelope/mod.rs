//! Message envelopes
//!
//! Every message is a JSON object `{id, op, body, hmac}`. The codec builds
//! and verifies them; this module holds the types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod codec;
mod operation;
#[cfg(test)]
mod proptests;

pub use codec::{decode_and_verify, encode};
pub use operation::Operation;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    /// Tag mismatch; the body must not be used
    #[error("Envelope integrity check failed")]
    Integrity,

    #[error("Invalid signing key")]
    InvalidKey,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// Exact wire shape; unknown fields are rejected
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct WireEnvelope {
    pub id: String,
    pub op: String,
    pub body: Value,
    pub hmac: String,
}

/// A tagged message
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    id: String,
    op: Operation,
    body: Value,
    hmac: String,
}

impl Envelope {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn op(&self) -> &Operation {
        &self.op
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn hmac(&self) -> &str {
        &self.hmac
    }

    pub fn into_body(self) -> Value {
        self.body
    }

    /// JSON bytes placed inside the encrypted slot value
    pub fn to_wire(&self) -> EnvelopeResult<Vec<u8>> {
        let wire = WireEnvelope {
            id: self.id.clone(),
            op: self.op.as_str().to_string(),
            body: self.body.clone(),
            hmac: self.hmac.clone(),
        };
        serde_json::to_vec(&wire).map_err(|e| EnvelopeError::Serialization(e.to_string()))
    }
}
