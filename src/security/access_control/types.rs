//! Access-control-specific types (Security specification v1.1, sec. 8.4.2).

pub use crate::security::types::{PermissionsHandle, PermissionsToken};
use crate::security::types::SecurityAttributes;

/// Participant-level security attributes as returned by
/// `get_participant_sec_attributes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParticipantSecurityAttributes {
  pub attributes: SecurityAttributes,
  pub allow_unauthenticated_participants: bool,
}

/// Endpoint-level security attributes as returned by
/// `get_{writer,reader}_sec_attributes`. Owns the rule from §4.4: "if
/// submessage- or payload-protected, register with crypto; otherwise leave
/// null."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointSecurityAttributes {
  pub attributes: SecurityAttributes,
  pub is_key_protected: bool,
}

impl EndpointSecurityAttributes {
  pub fn requires_crypto_registration(&self) -> bool {
    self.attributes.is_payload_protected() || self.attributes.is_submessage_protected()
  }
}
