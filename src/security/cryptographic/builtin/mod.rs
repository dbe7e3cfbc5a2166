//! The builtin `DDS:Crypto:AES-GCM-GMAC` plugin: the only `CryptoKeyFactory`
//! + `CryptoKeyExchange` + `CryptoTransform` implementation this crate
//! ships, mirroring the teacher's `CryptographicBuiltin`. Key material is
//! generated locally with `rand` and exchanged as opaque [`DataHolder`]
//! tokens over discovery (§4.3); actual sealing is done by
//! [`key_material`].

mod crypto_transform;
mod key_material;
mod tokens;

use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
  },
};

use rand::RngCore;

use super::types::{BuiltinCryptoTransformationKind, KeyMaterial, SecureSubmessageCategory};
use crate::security::{
  access_control::types::{EndpointSecurityAttributes, ParticipantSecurityAttributes},
  authentication::types::SharedSecretHandle,
  types::{EndpointCryptoHandle, ParticipantCryptoHandle, SecurityException},
};

pub struct CryptographicBuiltin {
  next_handle: AtomicU64,
  participant_keys: Mutex<HashMap<ParticipantCryptoHandle, KeyMaterial>>,
  endpoint_keys: Mutex<HashMap<EndpointCryptoHandle, KeyMaterial>>,
  remote_participant_keys: Mutex<HashMap<(ParticipantCryptoHandle, ParticipantCryptoHandle), KeyMaterial>>,
  remote_endpoint_keys: Mutex<HashMap<(EndpointCryptoHandle, EndpointCryptoHandle), KeyMaterial>>,
  /// Per-handle send-side IV suffix counter, keyed by the raw handle value
  /// (participant and endpoint handle spaces never collide in practice
  /// since both are allocated from the same counter).
  iv_counters: Mutex<HashMap<u64, u64>>,
  /// Which participant crypto handle owns each endpoint crypto handle, for
  /// `preprocess_secure_submessage`'s category/handle resolution.
  endpoint_owner: Mutex<HashMap<EndpointCryptoHandle, ParticipantCryptoHandle>>,
  /// Whether each endpoint crypto handle was issued for a writer or a
  /// reader, also for `preprocess_secure_submessage`.
  endpoint_role: Mutex<HashMap<EndpointCryptoHandle, SecureSubmessageCategory>>,
}

impl Default for CryptographicBuiltin {
  fn default() -> Self {
    Self::new()
  }
}

impl CryptographicBuiltin {
  pub fn new() -> Self {
    Self {
      next_handle: AtomicU64::new(1),
      participant_keys: Mutex::new(HashMap::new()),
      endpoint_keys: Mutex::new(HashMap::new()),
      remote_participant_keys: Mutex::new(HashMap::new()),
      remote_endpoint_keys: Mutex::new(HashMap::new()),
      iv_counters: Mutex::new(HashMap::new()),
      endpoint_owner: Mutex::new(HashMap::new()),
      endpoint_role: Mutex::new(HashMap::new()),
    }
  }

  /// Any endpoint crypto handle this plugin has registered (local or
  /// matched-remote) under the given owning participant. Used by
  /// `preprocess_secure_submessage` to resolve a participant-scoped pair
  /// into the endpoint-scoped pair the decode calls need; endpoint
  /// resolution by receiver-specific MAC suffix is the fully general path,
  /// but the common case of one endpoint per participant is resolved
  /// directly.
  fn endpoints_owned_by(&self, owner: ParticipantCryptoHandle) -> Vec<EndpointCryptoHandle> {
    self
      .endpoint_owner
      .lock()
      .unwrap()
      .iter()
      .filter(|(_, p)| **p == owner)
      .map(|(e, _)| *e)
      .collect()
  }

  fn alloc_raw(&self) -> u64 {
    self.next_handle.fetch_add(1, Ordering::SeqCst)
  }

  fn next_iv_suffix(&self, raw_handle: u64) -> u64 {
    let mut counters = self.iv_counters.lock().unwrap();
    let counter = counters.entry(raw_handle).or_insert(0);
    let value = *counter;
    *counter += 1;
    value
  }

  fn fresh_key_material(kind: BuiltinCryptoTransformationKind, key_id: u32) -> KeyMaterial {
    let mut rng = rand::thread_rng();
    let mut salt = vec![0u8; 16];
    rng.fill_bytes(&mut salt);
    let mut key = vec![0u8; kind.key_len().max(1)];
    rng.fill_bytes(&mut key);
    KeyMaterial {
      transformation_kind: kind,
      master_salt: salt.into(),
      master_sender_key: key.into(),
      sender_key_id: key_id,
      master_receiver_specific_key: None,
      receiver_specific_key_id: 0,
    }
  }

  fn participant_kind(attrs: &ParticipantSecurityAttributes) -> BuiltinCryptoTransformationKind {
    if attrs.attributes.is_rtps_protected() {
      BuiltinCryptoTransformationKind::Aes128Gcm
    } else {
      BuiltinCryptoTransformationKind::Aes128Gmac
    }
  }

  fn endpoint_kind(attrs: &EndpointSecurityAttributes) -> BuiltinCryptoTransformationKind {
    if attrs.attributes.is_payload_protected() || attrs.attributes.is_submessage_protected() {
      if attrs.attributes.is_payload_protected() {
        BuiltinCryptoTransformationKind::Aes128Gcm
      } else {
        BuiltinCryptoTransformationKind::Aes128Gmac
      }
    } else {
      BuiltinCryptoTransformationKind::None
    }
  }
}

mod factory {
  use super::*;
  use crate::security::cryptographic::plugin::CryptoKeyFactory;

  impl CryptoKeyFactory for CryptographicBuiltin {
    fn register_local_participant(
      &self,
      attributes: ParticipantSecurityAttributes,
    ) -> Result<ParticipantCryptoHandle, SecurityException> {
      let handle = ParticipantCryptoHandle::from(self.alloc_raw());
      let km = Self::fresh_key_material(Self::participant_kind(&attributes), handle.0 as u32);
      self.participant_keys.lock().unwrap().insert(handle, km);
      Ok(handle)
    }

    fn register_matched_remote_participant(
      &self,
      local_participant_crypto_handle: ParticipantCryptoHandle,
      _shared_secret: &SharedSecretHandle,
    ) -> Result<ParticipantCryptoHandle, SecurityException> {
      let local_km = self
        .participant_keys
        .lock()
        .unwrap()
        .get(&local_participant_crypto_handle)
        .cloned()
        .ok_or_else(|| SecurityException::new(-1, "unknown local participant crypto handle"))?;
      let handle = ParticipantCryptoHandle::from(self.alloc_raw());
      // Placeholder until the remote's own key arrives via crypto tokens.
      self.participant_keys.lock().unwrap().insert(handle, local_km);
      Ok(handle)
    }

    fn register_local_datawriter(
      &self,
      participant_crypto_handle: ParticipantCryptoHandle,
      attributes: EndpointSecurityAttributes,
    ) -> Result<EndpointCryptoHandle, SecurityException> {
      let handle = EndpointCryptoHandle::from(self.alloc_raw());
      let km = Self::fresh_key_material(Self::endpoint_kind(&attributes), handle.0 as u32);
      self.endpoint_keys.lock().unwrap().insert(handle, km);
      self
        .endpoint_owner
        .lock()
        .unwrap()
        .insert(handle, participant_crypto_handle);
      self
        .endpoint_role
        .lock()
        .unwrap()
        .insert(handle, SecureSubmessageCategory::DatawriterSubmessage);
      Ok(handle)
    }

    fn register_matched_remote_datareader(
      &self,
      local_datawriter_crypto_handle: EndpointCryptoHandle,
      remote_participant_crypto_handle: ParticipantCryptoHandle,
      _shared_secret: &SharedSecretHandle,
    ) -> Result<EndpointCryptoHandle, SecurityException> {
      let local_km = self
        .endpoint_keys
        .lock()
        .unwrap()
        .get(&local_datawriter_crypto_handle)
        .cloned()
        .ok_or_else(|| SecurityException::new(-1, "unknown local datawriter crypto handle"))?;
      let handle = EndpointCryptoHandle::from(self.alloc_raw());
      self.endpoint_keys.lock().unwrap().insert(handle, local_km);
      self
        .endpoint_owner
        .lock()
        .unwrap()
        .insert(handle, remote_participant_crypto_handle);
      Ok(handle)
    }

    fn register_local_datareader(
      &self,
      participant_crypto_handle: ParticipantCryptoHandle,
      attributes: EndpointSecurityAttributes,
    ) -> Result<EndpointCryptoHandle, SecurityException> {
      let handle = EndpointCryptoHandle::from(self.alloc_raw());
      let km = Self::fresh_key_material(Self::endpoint_kind(&attributes), handle.0 as u32);
      self.endpoint_keys.lock().unwrap().insert(handle, km);
      self
        .endpoint_owner
        .lock()
        .unwrap()
        .insert(handle, participant_crypto_handle);
      Ok(handle)
    }

    fn register_matched_remote_datawriter(
      &self,
      local_datareader_crypto_handle: EndpointCryptoHandle,
      remote_participant_crypto_handle: ParticipantCryptoHandle,
      _shared_secret: &SharedSecretHandle,
    ) -> Result<EndpointCryptoHandle, SecurityException> {
      let local_km = self
        .endpoint_keys
        .lock()
        .unwrap()
        .get(&local_datareader_crypto_handle)
        .cloned()
        .ok_or_else(|| SecurityException::new(-1, "unknown local datareader crypto handle"))?;
      let handle = EndpointCryptoHandle::from(self.alloc_raw());
      self.endpoint_keys.lock().unwrap().insert(handle, local_km);
      self
        .endpoint_owner
        .lock()
        .unwrap()
        .insert(handle, remote_participant_crypto_handle);
      Ok(handle)
    }

    fn unregister_participant(&self, handle: ParticipantCryptoHandle) -> Result<(), SecurityException> {
      self.participant_keys.lock().unwrap().remove(&handle);
      self
        .remote_participant_keys
        .lock()
        .unwrap()
        .retain(|(l, r), _| *l != handle && *r != handle);
      Ok(())
    }

    fn unregister_datawriter(&self, handle: EndpointCryptoHandle) -> Result<(), SecurityException> {
      self.endpoint_keys.lock().unwrap().remove(&handle);
      self
        .remote_endpoint_keys
        .lock()
        .unwrap()
        .retain(|(l, r), _| *l != handle && *r != handle);
      self.endpoint_owner.lock().unwrap().remove(&handle);
      Ok(())
    }

    fn unregister_datareader(&self, handle: EndpointCryptoHandle) -> Result<(), SecurityException> {
      self.endpoint_keys.lock().unwrap().remove(&handle);
      self
        .remote_endpoint_keys
        .lock()
        .unwrap()
        .retain(|(l, r), _| *l != handle && *r != handle);
      self.endpoint_owner.lock().unwrap().remove(&handle);
      Ok(())
    }
  }
}

mod exchange {
  use super::*;
  use crate::security::{cryptographic::plugin::CryptoKeyExchange, types::CryptoTokenSeq};

  impl CryptoKeyExchange for CryptographicBuiltin {
    fn create_local_participant_crypto_tokens(
      &self,
      local_handle: ParticipantCryptoHandle,
      _remote_handle: ParticipantCryptoHandle,
    ) -> Result<CryptoTokenSeq, SecurityException> {
      let km = self
        .participant_keys
        .lock()
        .unwrap()
        .get(&local_handle)
        .cloned()
        .ok_or_else(|| SecurityException::new(-1, "unknown local participant crypto handle"))?;
      Ok(vec![tokens::key_material_to_token(&km)])
    }

    fn set_remote_participant_crypto_tokens(
      &self,
      local_handle: ParticipantCryptoHandle,
      remote_handle: ParticipantCryptoHandle,
      tokens: CryptoTokenSeq,
    ) -> Result<(), SecurityException> {
      let holder = tokens
        .first()
        .ok_or_else(|| SecurityException::new(-1, "empty participant crypto token sequence"))?;
      let km = tokens::token_to_key_material(holder)?;
      self
        .remote_participant_keys
        .lock()
        .unwrap()
        .insert((local_handle, remote_handle), km);
      Ok(())
    }

    fn create_local_datawriter_crypto_tokens(
      &self,
      local_handle: EndpointCryptoHandle,
      _remote_handle: EndpointCryptoHandle,
    ) -> Result<CryptoTokenSeq, SecurityException> {
      let km = self
        .endpoint_keys
        .lock()
        .unwrap()
        .get(&local_handle)
        .cloned()
        .ok_or_else(|| SecurityException::new(-1, "unknown local datawriter crypto handle"))?;
      Ok(vec![tokens::key_material_to_token(&km)])
    }

    fn set_remote_datawriter_crypto_tokens(
      &self,
      local_reader_handle: EndpointCryptoHandle,
      remote_writer_handle: EndpointCryptoHandle,
      tokens: CryptoTokenSeq,
    ) -> Result<(), SecurityException> {
      let holder = tokens
        .first()
        .ok_or_else(|| SecurityException::new(-1, "empty datawriter crypto token sequence"))?;
      let km = tokens::token_to_key_material(holder)?;
      self
        .remote_endpoint_keys
        .lock()
        .unwrap()
        .insert((local_reader_handle, remote_writer_handle), km);
      Ok(())
    }

    fn create_local_datareader_crypto_tokens(
      &self,
      local_handle: EndpointCryptoHandle,
      _remote_handle: EndpointCryptoHandle,
    ) -> Result<CryptoTokenSeq, SecurityException> {
      let km = self
        .endpoint_keys
        .lock()
        .unwrap()
        .get(&local_handle)
        .cloned()
        .ok_or_else(|| SecurityException::new(-1, "unknown local datareader crypto handle"))?;
      Ok(vec![tokens::key_material_to_token(&km)])
    }

    fn set_remote_datareader_crypto_tokens(
      &self,
      local_writer_handle: EndpointCryptoHandle,
      remote_reader_handle: EndpointCryptoHandle,
      tokens: CryptoTokenSeq,
    ) -> Result<(), SecurityException> {
      let holder = tokens
        .first()
        .ok_or_else(|| SecurityException::new(-1, "empty datareader crypto token sequence"))?;
      let km = tokens::token_to_key_material(holder)?;
      self
        .remote_endpoint_keys
        .lock()
        .unwrap()
        .insert((local_writer_handle, remote_reader_handle), km);
      Ok(())
    }
  }
}

pub use crypto_transform::*;
