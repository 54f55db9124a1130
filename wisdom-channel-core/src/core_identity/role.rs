//! Node roles
//!
//! Exactly two roles share a mailbox record. Each role owns one slot it
//! writes and polls the slot owned by its counterpart.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::IdentityError;
use crate::core_mailbox::Slot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "agent")]
    Agent,
    #[serde(rename = "wa", alias = "wisdom-authority")]
    WisdomAuthority,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::WisdomAuthority => "wa",
        }
    }

    /// The role on the other end of the channel
    pub fn counterpart(&self) -> Role {
        match self {
            Role::Agent => Role::WisdomAuthority,
            Role::WisdomAuthority => Role::Agent,
        }
    }

    /// Slot this role writes to
    pub fn outbound_slot(&self) -> Slot {
        match self {
            Role::Agent => Slot::AGENT_TO_WA,
            Role::WisdomAuthority => Slot::WA_TO_AGENT,
        }
    }

    /// Slot this role polls
    pub fn inbound_slot(&self) -> Slot {
        self.counterpart().outbound_slot()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "agent" => Ok(Role::Agent),
            "wa" | "wisdom-authority" | "wisdom_authority" => Ok(Role::WisdomAuthority),
            other => Err(IdentityError::InvalidRole(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_mirrored() {
        assert_eq!(Role::Agent.outbound_slot(), Role::WisdomAuthority.inbound_slot());
        assert_eq!(Role::WisdomAuthority.outbound_slot(), Role::Agent.inbound_slot());
        assert_ne!(Role::Agent.inbound_slot(), Role::Agent.outbound_slot());
        assert_eq!(Role::Agent.outbound_slot(), Slot::new(0));
    }

    #[test]
    fn test_parse_roles() {
        assert_eq!("agent".parse::<Role>().unwrap(), Role::Agent);
        assert_eq!("WA".parse::<Role>().unwrap(), Role::WisdomAuthority);
        assert_eq!("wisdom-authority".parse::<Role>().unwrap(), Role::WisdomAuthority);
        assert!("observer".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_names() {
        assert_eq!(serde_json::to_string(&Role::WisdomAuthority).unwrap(), "\"wa\"");
        let role: Role = serde_json::from_str("\"agent\"").unwrap();
        assert_eq!(role, Role::Agent);
    }
}
