//! Public identities
//!
//! A node is identified by its X25519 public key. The textual form is
//! unpadded URL-safe base64, which is what profiles, config values and
//! the secret map use as keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::IdentityError;

/// Length of a public identity in bytes
pub const PUBLIC_ID_LEN: usize = 32;

/// X25519 public key identifying a node
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicId([u8; PUBLIC_ID_LEN]);

impl PublicId {
    pub fn from_bytes(bytes: [u8; PUBLIC_ID_LEN]) -> Self {
        PublicId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_ID_LEN] {
        &self.0
    }

    /// Short prefix for log fields
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(8);
        s
    }
}

impl TryFrom<&[u8]> for PublicId {
    type Error = IdentityError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; PUBLIC_ID_LEN] = bytes.try_into().map_err(|_| {
            IdentityError::InvalidPublicId(format!(
                "expected {} bytes, got {}",
                PUBLIC_ID_LEN,
                bytes.len()
            ))
        })?;
        Ok(PublicId(arr))
    }
}

impl fmt::Display for PublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for PublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicId({})", self.short())
    }
}

impl FromStr for PublicId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|e| IdentityError::InvalidPublicId(e.to_string()))?;
        PublicId::try_from(bytes.as_slice())
    }
}

impl Serialize for PublicId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublicId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
