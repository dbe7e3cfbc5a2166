use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

/// 12-byte participant-unique prefix of a [`GUID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GuidPrefix(pub [u8; 12]);

impl GuidPrefix {
  pub const UNKNOWN: GuidPrefix = GuidPrefix([0; 12]);

  pub fn new(bytes: [u8; 12]) -> Self {
    Self(bytes)
  }
}

impl fmt::Display for GuidPrefix {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for b in self.0 {
      write!(f, "{b:02x}")?;
    }
    Ok(())
  }
}

/// 4-byte entity identifier within a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EntityId(pub [u8; 4]);

impl EntityId {
  /// Reserved entity-id for the participant itself.
  pub const PARTICIPANT: EntityId = EntityId([0x00, 0x00, 0x01, 0xc1]);
  pub const UNKNOWN: EntityId = EntityId([0, 0, 0, 0]);
}

/// 16-byte GUID: 12-byte prefix + 4-byte entity-id. Equality is bitwise;
/// ordering is lexicographic over (prefix, entity_id) and is the canonical
/// key ordering used by every map in this crate (EMT, ProxyBack, etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GUID {
  pub prefix: GuidPrefix,
  pub entity_id: EntityId,
}

impl GUID {
  pub fn new(prefix: GuidPrefix, entity_id: EntityId) -> Self {
    Self { prefix, entity_id }
  }

  pub fn participant_guid(prefix: GuidPrefix) -> Self {
    Self::new(prefix, EntityId::PARTICIPANT)
  }

  pub fn is_participant(&self) -> bool {
    self.entity_id == EntityId::PARTICIPANT
  }
}

impl PartialOrd for GUID {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for GUID {
  fn cmp(&self, other: &Self) -> Ordering {
    (self.prefix, self.entity_id).cmp(&(other.prefix, other.entity_id))
  }
}

impl fmt::Display for GUID {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{:02x?}", self.prefix, self.entity_id.0)
  }
}

/// A directed pair of GUIDs, the canonical EMT key. Ordering on the pair is
/// lexicographic over (src, dst), matching §3's "ordered by the
/// concatenated GUID pair".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuidPair {
  pub src: GUID,
  pub dst: GUID,
}

impl GuidPair {
  pub fn new(src: GUID, dst: GUID) -> Self {
    Self { src, dst }
  }
}

/// Opaque 64-bit integer issued by a plugin. `0` is reserved as nil.
/// Handles are owned by the plugin that issued them; the core must return
/// each handle to its origin exactly once before releasing the owning
/// record -- see [`crate::security::handle_guard::HandleGuard`].
pub type RawHandle = u64;
pub const NIL_HANDLE: RawHandle = 0;

macro_rules! handle_newtype {
  ($name:ident) => {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct $name(pub RawHandle);

    impl $name {
      pub const NIL: $name = $name(NIL_HANDLE);

      pub fn is_nil(&self) -> bool {
        self.0 == NIL_HANDLE
      }
    }

    impl From<RawHandle> for $name {
      fn from(v: RawHandle) -> Self {
        Self(v)
      }
    }
  };
}

handle_newtype!(IdentityHandle);
handle_newtype!(HandshakeHandle);
handle_newtype!(PermissionsHandle);
handle_newtype!(ParticipantCryptoHandle);
handle_newtype!(EndpointCryptoHandle);

/// Shared secret resulting from a successful handshake.
pub type SharedSecret = bytes::Bytes;

#[derive(Clone)]
pub struct SharedSecretHandle {
  pub shared_secret: SharedSecret,
  pub challenge1: bytes::Bytes,
  pub challenge2: bytes::Bytes,
}

impl fmt::Debug for SharedSecretHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SharedSecretHandle")
      .field("shared_secret", &"<redacted>")
      .finish()
  }
}

/// Per-call plugin exception: a numeric code and message, never thrown --
/// always returned as an out-parameter-equivalent `Result::Err`. See §7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityException {
  pub code: i32,
  pub message: String,
}

impl SecurityException {
  pub fn new(code: i32, message: impl Into<String>) -> Self {
    Self {
      code,
      message: message.into(),
    }
  }
}

impl fmt::Display for SecurityException {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}] {}", self.code, self.message)
  }
}

/// Error code used by `decode_datawriter_submessage`/`decode_datareader_submessage`
/// to signal "this receiver is not the intended recipient, try the next
/// candidate ParticipantMatch" (§4.5 RTPS-message decode paragraph).
pub const INVALID_CRYPTO_RECEIVER_SIGN_CODE: i32 = -11;

/// A single named property, as carried inside a [`DataHolder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
  pub name: String,
  pub value: String,
  pub propagate: bool,
}

/// A named binary property, as carried inside a [`DataHolder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryProperty {
  pub name: String,
  pub value: bytes::Bytes,
  pub propagate: bool,
}

/// The plugin-opaque serializable envelope that every security token wraps
/// (identity, permissions, handshake, auth-request, credential). Matches
/// `DataHolder` from the Security specification (sec. 7.2.5).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataHolder {
  pub class_id: String,
  pub properties: Vec<Property>,
  pub binary_properties: Vec<BinaryProperty>,
}

impl DataHolder {
  pub fn with_class_id(class_id: impl Into<String>) -> Self {
    Self {
      class_id: class_id.into(),
      ..Default::default()
    }
  }

  /// Mock value used by the builtin plugin test doubles and by tests.
  pub fn dummy() -> Self {
    Self::with_class_id("DDS:Auth:Dummy")
  }

  pub fn binary_property(&self, name: &str) -> Option<&bytes::Bytes> {
    self
      .binary_properties
      .iter()
      .find(|p| p.name == name)
      .map(|p| &p.value)
  }
}

macro_rules! dataholder_token {
  ($name:ident) => {
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct $name {
      pub data_holder: DataHolder,
    }

    impl From<DataHolder> for $name {
      fn from(value: DataHolder) -> Self {
        Self { data_holder: value }
      }
    }

    impl $name {
      pub fn class_id(&self) -> &str {
        &self.data_holder.class_id
      }

      pub fn dummy() -> Self {
        Self {
          data_holder: DataHolder::dummy(),
        }
      }
    }
  };
}

dataholder_token!(IdentityToken);
dataholder_token!(IdentityStatusToken);
dataholder_token!(PermissionsToken);
dataholder_token!(PermissionsCredentialToken);
dataholder_token!(AuthRequestMessageToken);
dataholder_token!(HandshakeMessageToken);
dataholder_token!(AuthenticatedPeerCredentialToken);

/// Crypto token exchanged over discovery conveying key material for a
/// directed (src, dst) pair. Ownership: single-owner, transferred into the
/// EMT entry on insert (§4.2).
pub type CryptoToken = DataHolder;
pub type CryptoTokenSeq = Vec<CryptoToken>;

/// A pair of 32-bit bitfields: the spec-defined field carries a validity
/// bit plus protection flags; the plugin-defined field is opaque to the
/// core. Two sets are *compatible* iff equal OR at least one side has the
/// validity bit clear (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecurityAttributes {
  pub security_attributes: u32,
  pub plugin_security_attributes: u32,
}

pub const ATTR_FLAG_VALID: u32 = 1 << 31;
pub const ATTR_FLAG_RTPS_PROTECTED: u32 = 1 << 0;
pub const ATTR_FLAG_DISCOVERY_PROTECTED: u32 = 1 << 1;
pub const ATTR_FLAG_LIVELINESS_PROTECTED: u32 = 1 << 2;
pub const ATTR_FLAG_KEY_PROTECTED: u32 = 1 << 3;
pub const ATTR_FLAG_PAYLOAD_PROTECTED: u32 = 1 << 4;
pub const ATTR_FLAG_SUBMESSAGE_PROTECTED: u32 = 1 << 5;
pub const ATTR_FLAG_READ_PROTECTED: u32 = 1 << 6;
pub const ATTR_FLAG_WRITE_PROTECTED: u32 = 1 << 7;

impl SecurityAttributes {
  pub fn is_valid(&self) -> bool {
    self.security_attributes & ATTR_FLAG_VALID != 0
  }

  fn has(&self, flag: u32) -> bool {
    self.security_attributes & flag != 0
  }

  pub fn is_rtps_protected(&self) -> bool {
    self.has(ATTR_FLAG_RTPS_PROTECTED)
  }
  pub fn is_discovery_protected(&self) -> bool {
    self.has(ATTR_FLAG_DISCOVERY_PROTECTED)
  }
  pub fn is_liveliness_protected(&self) -> bool {
    self.has(ATTR_FLAG_LIVELINESS_PROTECTED)
  }
  pub fn is_key_protected(&self) -> bool {
    self.has(ATTR_FLAG_KEY_PROTECTED)
  }
  pub fn is_payload_protected(&self) -> bool {
    self.has(ATTR_FLAG_PAYLOAD_PROTECTED)
  }
  pub fn is_submessage_protected(&self) -> bool {
    self.has(ATTR_FLAG_SUBMESSAGE_PROTECTED)
  }
  pub fn is_read_protected(&self) -> bool {
    self.has(ATTR_FLAG_READ_PROTECTED)
  }
  pub fn is_write_protected(&self) -> bool {
    self.has(ATTR_FLAG_WRITE_PROTECTED)
  }

  /// Two attribute sets are compatible iff equal OR at least one side has
  /// the validity bit clear (§3 DATA MODEL, §8 invariant 5 requires this
  /// relation to be symmetric -- it is, by construction).
  pub fn compatible_with(&self, other: &SecurityAttributes) -> bool {
    self == other || !self.is_valid() || !other.is_valid()
  }
}

#[cfg(test)]
mod tests {
  use test_case::test_case;

  use super::*;

  #[test]
  fn guid_ordering_is_lexicographic() {
    let a = GUID::new(GuidPrefix([0; 12]), EntityId([0, 0, 0, 1]));
    let b = GUID::new(GuidPrefix([0; 12]), EntityId([0, 0, 0, 2]));
    let c = GUID::new(GuidPrefix([1; 12]), EntityId([0, 0, 0, 0]));
    assert!(a < b);
    assert!(b < c);
  }

  #[test]
  fn handle_nil_is_zero() {
    assert!(IdentityHandle::NIL.is_nil());
    assert!(!IdentityHandle::from(1).is_nil());
  }

  // §3 DATA MODEL: "compatible iff equal OR at least one side has the
  // validity bit clear." §8 invariant 5 requires the relation to be
  // symmetric, so every case is checked both ways.
  #[test_case(ATTR_FLAG_VALID | ATTR_FLAG_PAYLOAD_PROTECTED, ATTR_FLAG_VALID | ATTR_FLAG_PAYLOAD_PROTECTED, true; "equal valid sets")]
  #[test_case(ATTR_FLAG_VALID | ATTR_FLAG_PAYLOAD_PROTECTED, ATTR_FLAG_VALID, false; "both valid but unequal")]
  #[test_case(ATTR_FLAG_VALID, 0, true; "one side invalid")]
  #[test_case(0, 0, true; "both invalid")]
  fn attribute_compatibility_is_symmetric(a_flags: u32, b_flags: u32, expected: bool) {
    let a = SecurityAttributes {
      security_attributes: a_flags,
      plugin_security_attributes: 0,
    };
    let b = SecurityAttributes {
      security_attributes: b_flags,
      plugin_security_attributes: 0,
    };
    assert_eq!(a.compatible_with(&b), expected);
    assert_eq!(a.compatible_with(&b), b.compatible_with(&a));
  }
}
