//! Cryptographic-plugin-specific types (Security specification v1.1, sec.
//! 9.5), covering the builtin AES128/256-GCM/GMAC transform used by
//! [`super::builtin::CryptographicBuiltin`].

use bytes::Bytes;

pub use crate::security::types::{EndpointCryptoHandle, ParticipantCryptoHandle};

/// Generic message class IDs for crypto token exchange (Security spec sec.
/// 7.4.3.5), carried over `ParticipantVolatileMessageSecure`.
pub const GMCLASSID_SECURITY_PARTICIPANT_CRYPTO_TOKENS: &str = "dds.sec.participant_crypto_tokens";
pub const GMCLASSID_SECURITY_DATAWRITER_CRYPTO_TOKENS: &str = "dds.sec.datawriter_crypto_tokens";
pub const GMCLASSID_SECURITY_DATAREADER_CRYPTO_TOKENS: &str = "dds.sec.datareader_crypto_tokens";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCryptoTransformationKind {
  None,
  Aes128Gmac,
  Aes256Gmac,
  Aes128Gcm,
  Aes256Gcm,
}

impl BuiltinCryptoTransformationKind {
  pub fn is_encrypted(self) -> bool {
    matches!(self, Self::Aes128Gcm | Self::Aes256Gcm)
  }

  pub fn key_len(self) -> usize {
    match self {
      Self::None => 0,
      Self::Aes128Gmac | Self::Aes128Gcm => 16,
      Self::Aes256Gmac | Self::Aes256Gcm => 32,
    }
  }

  pub fn to_wire(self) -> u8 {
    match self {
      Self::None => 0,
      Self::Aes128Gmac => 1,
      Self::Aes256Gmac => 2,
      Self::Aes128Gcm => 3,
      Self::Aes256Gcm => 4,
    }
  }

  pub fn from_wire(v: u8) -> Option<Self> {
    Some(match v {
      0 => Self::None,
      1 => Self::Aes128Gmac,
      2 => Self::Aes256Gmac,
      3 => Self::Aes128Gcm,
      4 => Self::Aes256Gcm,
      _ => return None,
    })
  }
}

/// `cat` from §4.5: what kind of submessage the preprocess step found
/// underneath a `SEC_PREFIX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureSubmessageCategory {
  DatawriterSubmessage,
  DatareaderSubmessage,
  InfoSubmessage,
}

/// The `SEC_PREFIX` payload: transform kind, session id, and the per-message
/// initialization-vector suffix (the counter half of the nonce; the prefix
/// half comes from the session key material).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinCryptoHeader {
  pub transformation_kind: BuiltinCryptoTransformationKind,
  pub session_id: u32,
  pub init_vector_suffix: u64,
}

impl BuiltinCryptoHeader {
  pub const WIRE_LEN: usize = 1 + 3 + 4 + 8; // kind + pad + session_id + iv_suffix

  pub fn to_bytes(self) -> [u8; Self::WIRE_LEN] {
    let mut out = [0u8; Self::WIRE_LEN];
    out[0] = self.transformation_kind.to_wire();
    out[4..8].copy_from_slice(&self.session_id.to_be_bytes());
    out[8..16].copy_from_slice(&self.init_vector_suffix.to_be_bytes());
    out
  }

  pub fn from_bytes(buf: &[u8]) -> Option<Self> {
    if buf.len() < Self::WIRE_LEN {
      return None;
    }
    let transformation_kind = BuiltinCryptoTransformationKind::from_wire(buf[0])?;
    let session_id = u32::from_be_bytes(buf[4..8].try_into().ok()?);
    let init_vector_suffix = u64::from_be_bytes(buf[8..16].try_into().ok()?);
    Some(Self {
      transformation_kind,
      session_id,
      init_vector_suffix,
    })
  }
}

/// A single receiver-specific MAC: the low 4 bytes of the receiver's crypto
/// handle plus its 16-byte GMAC/GCM tag, used to authenticate a submessage
/// to one specific reader when several local readers share a writer.
#[derive(Debug, Clone)]
pub struct ReceiverSpecificMac {
  pub receiver_handle_suffix: [u8; 4],
  pub mac: [u8; 16],
}

/// The `SEC_POSTFIX` payload: the common MAC/tag plus zero or more
/// receiver-specific MACs.
#[derive(Debug, Clone)]
pub struct BuiltinCryptoFooter {
  pub common_mac: [u8; 16],
  pub receiver_specific_macs: Vec<ReceiverSpecificMac>,
}

/// Key material for one session: a master sender key plus the current
/// session key derived from it, matching the builtin transform's
/// session-based key schedule (§4.5 concurrency note: encode may be called
/// concurrently for unrelated entities, so each entity owns its own
/// `KeyMaterial`).
#[derive(Clone)]
pub struct KeyMaterial {
  pub transformation_kind: BuiltinCryptoTransformationKind,
  pub master_salt: Bytes,
  pub master_sender_key: Bytes,
  pub sender_key_id: u32,
  pub master_receiver_specific_key: Option<Bytes>,
  pub receiver_specific_key_id: u32,
}

impl std::fmt::Debug for KeyMaterial {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("KeyMaterial")
      .field("transformation_kind", &self.transformation_kind)
      .field("sender_key_id", &self.sender_key_id)
      .finish()
  }
}
