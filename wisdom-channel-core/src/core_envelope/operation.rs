use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::core_identity::Role;

/// Message operation carried by an envelope
///
/// Tags outside the known set parse to `Unknown` instead of failing, so
/// the worker can log and drop them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    Speak,
    Defer,
    Memory,
    Observe,
    Correction,
    Unknown(String),
}

impl Operation {
    pub const KNOWN: [Operation; 5] = [
        Operation::Speak,
        Operation::Defer,
        Operation::Memory,
        Operation::Observe,
        Operation::Correction,
    ];

    pub fn parse(tag: &str) -> Self {
        match tag {
            "SPEAK" => Operation::Speak,
            "DEFER" => Operation::Defer,
            "MEMORY" => Operation::Memory,
            "OBSERVE" => Operation::Observe,
            "CORRECTION" => Operation::Correction,
            other => Operation::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Operation::Speak => "SPEAK",
            Operation::Defer => "DEFER",
            Operation::Memory => "MEMORY",
            Operation::Observe => "OBSERVE",
            Operation::Correction => "CORRECTION",
            Operation::Unknown(tag) => tag,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Operation::Unknown(_))
    }

    /// Role allowed to originate this operation
    pub fn sender_role(&self) -> Option<Role> {
        match self {
            Operation::Speak | Operation::Defer | Operation::Memory => Some(Role::Agent),
            Operation::Observe | Operation::Correction => Some(Role::WisdomAuthority),
            Operation::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Operation {
    fn from(tag: &str) -> Self {
        Operation::parse(tag)
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Operation::parse(&tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tags_round_trip() {
        for op in Operation::KNOWN {
            assert_eq!(Operation::parse(op.as_str()), op);
            assert!(op.is_known());
        }
    }

    #[test]
    fn test_unknown_tag_is_preserved() {
        let op = Operation::parse("PING");
        assert_eq!(op, Operation::Unknown("PING".to_string()));
        assert_eq!(op.to_string(), "PING");
        assert_eq!(op.sender_role(), None);
        // tags are case sensitive
        assert!(!Operation::parse("speak").is_known());
    }

    #[test]
    fn test_direction() {
        assert_eq!(Operation::Speak.sender_role(), Some(Role::Agent));
        assert_eq!(Operation::Memory.sender_role(), Some(Role::Agent));
        assert_eq!(Operation::Correction.sender_role(), Some(Role::WisdomAuthority));
    }
}
