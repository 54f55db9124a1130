//! Channel key schedule
//!
//! Both the envelope tag and the slot encryption are keyed from one piece
//! of channel material. Which material is used is selected by
//! `AuthKeySource`:
//!
//! - `LocalSecret` keys the channel from the node's own X25519 secret.
//!   Both sides must then hold the same secret, which is how existing
//!   deployments were provisioned. It is the default for that reason and
//!   is reported with a warning at startup.
//! - `PeerSecret` keys the channel from the pairwise shared secret
//!   produced by `derive-secret`.

use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

use super::{CryptoError, CryptoResult};

const TAG_KEY_INFO: &[u8] = b"wisdom-channel/envelope-tag/v1";
const TRANSPORT_KEY_INFO: &[u8] = b"wisdom-channel/transport/v1";

/// Which secret keys the envelope tag and the transport cipher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthKeySource {
    /// This node's own secret key. Two nodes can only talk if they hold
    /// the same keypair.
    #[default]
    LocalSecret,
    /// The pairwise secret stored by `derive_shared_secret`
    PeerSecret,
}

impl AuthKeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthKeySource::LocalSecret => "local-secret",
            AuthKeySource::PeerSecret => "peer-secret",
        }
    }
}

impl fmt::Display for AuthKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthKeySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "local-secret" => Ok(AuthKeySource::LocalSecret),
            "peer" | "peer-secret" => Ok(AuthKeySource::PeerSecret),
            other => Err(format!("unknown auth key source '{}'", other)),
        }
    }
}

/// Subkeys for one channel
pub struct ChannelKeys {
    tag_key: Zeroizing<[u8; 32]>,
    transport_key: Zeroizing<[u8; 32]>,
}

impl ChannelKeys {
    /// Expand channel material into independent tag and transport keys
    pub fn derive(material: &[u8]) -> CryptoResult<Self> {
        let hk = Hkdf::<Sha256>::new(None, material);
        let mut tag_key = Zeroizing::new([0u8; 32]);
        let mut transport_key = Zeroizing::new([0u8; 32]);
        hk.expand(TAG_KEY_INFO, tag_key.as_mut_slice())
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        hk.expand(TRANSPORT_KEY_INFO, transport_key.as_mut_slice())
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(ChannelKeys { tag_key, transport_key })
    }

    pub fn tag_key(&self) -> &[u8] {
        self.tag_key.as_slice()
    }

    pub fn transport_key(&self) -> &[u8] {
        self.transport_key.as_slice()
    }
}

impl fmt::Debug for ChannelKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelKeys([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subkeys_are_independent_and_deterministic() {
        let a = ChannelKeys::derive(&[1u8; 32]).unwrap();
        let b = ChannelKeys::derive(&[1u8; 32]).unwrap();
        let c = ChannelKeys::derive(&[2u8; 32]).unwrap();

        assert_ne!(a.tag_key(), a.transport_key());
        assert_eq!(a.tag_key(), b.tag_key());
        assert_eq!(a.transport_key(), b.transport_key());
        assert_ne!(a.tag_key(), c.tag_key());
    }

    #[test]
    fn test_auth_key_source_names() {
        assert_eq!(AuthKeySource::default(), AuthKeySource::LocalSecret);
        assert_eq!("peer".parse::<AuthKeySource>().unwrap(), AuthKeySource::PeerSecret);
        assert_eq!(
            serde_json::to_string(&AuthKeySource::PeerSecret).unwrap(),
            "\"peer-secret\""
        );
        assert!("shared".parse::<AuthKeySource>().is_err());
    }
}
