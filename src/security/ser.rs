//! Secure Endpoint Registry (§4.4): per-writer and per-reader crypto state,
//! and the admission sequence that matches a local endpoint against a
//! discovered remote counterpart. Built the same way as `pss` -- an
//! `Arc`-keyed table behind one lock per local endpoint, plus the shared
//! [`EntityMatchTable`] for the remote side of each match.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
};

use crate::{
  error::SecurityResult,
  map_required,
  security::{
    access_control::types::EndpointSecurityAttributes,
    authentication::types::SharedSecretHandle,
    emt::EntityMatchTable,
    security_plugins::SecurityPluginsHandle,
    types::{CryptoTokenSeq, EndpointCryptoHandle, ParticipantCryptoHandle, GUID},
  },
};

/// Which side of a writer/reader pair a [`LocalEndpointSecurity`] plays.
/// Drives which crypto-factory/key-exchange methods get called on match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
  Writer,
  Reader,
}

/// Security state for one local endpoint (writer or reader), registered at
/// creation time if its attributes demand crypto at all.
pub struct LocalEndpointSecurity {
  pub guid: GUID,
  pub kind: EndpointKind,
  pub participant_crypto_handle: ParticipantCryptoHandle,
  pub attributes: EndpointSecurityAttributes,
  /// Nil unless `is_payload_protected || is_submessage_protected`.
  pub crypto_handle: EndpointCryptoHandle,
  /// §4.4 "if is_key_protected, set a flag that forces key-hash inclusion
  /// in the sample inline-qos."
  pub force_key_hash: bool,
  /// Crypto handles for every matched remote counterpart, keyed by the
  /// remote endpoint's GUID.
  matches: Mutex<HashMap<GUID, EndpointCryptoHandle>>,
}

impl LocalEndpointSecurity {
  pub fn matched_handles(&self) -> Vec<EndpointCryptoHandle> {
    self.matches.lock().unwrap().values().copied().collect()
  }

  pub fn matched_handle_for(&self, remote_guid: GUID) -> Option<EndpointCryptoHandle> {
    self.matches.lock().unwrap().get(&remote_guid).copied()
  }

  fn insert_match(&self, remote_guid: GUID, handle: EndpointCryptoHandle) {
    self.matches.lock().unwrap().insert(remote_guid, handle);
  }

  fn remove_match(&self, remote_guid: GUID) -> Option<EndpointCryptoHandle> {
    self.matches.lock().unwrap().remove(&remote_guid)
  }
}

/// Outcome of a `match_remote_*_enabled` call: whether the match required
/// crypto registration at all, so the caller can decide whether to proceed
/// with ordinary (non-secure) discovery matching instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
  /// Endpoint is unsecured, or protection level needs no crypto handle.
  AcceptedUnprotected,
  /// Incompatible security info; the remote must not be matched.
  Rejected,
  /// Remote participant is unauthenticated but the local endpoint demands
  /// protection.
  RejectedUnauthenticated,
  /// Crypto registration succeeded (or was already cached); matched.
  Matched,
}

/// The registry itself: owns every locally created endpoint's security
/// state, and the volatile-secure builtin pair marker used to skip token
/// exchange for the one pairing whose keys come from the handshake
/// directly rather than a crypto-token round trip.
pub struct SecureEndpointRegistry {
  plugins: SecurityPluginsHandle,
  emt: Arc<EntityMatchTable>,
  endpoints: Mutex<HashMap<GUID, Arc<LocalEndpointSecurity>>>,
  /// GUIDs of the two builtin ParticipantVolatileMessageSecure endpoints,
  /// whose matches never carry crypto tokens (§4.4 step 7 exception).
  volatile_secure: Mutex<Vec<GUID>>,
}

impl SecureEndpointRegistry {
  pub fn new(plugins: SecurityPluginsHandle, emt: Arc<EntityMatchTable>) -> Self {
    Self {
      plugins,
      emt,
      endpoints: Mutex::new(HashMap::new()),
      volatile_secure: Mutex::new(Vec::new()),
    }
  }

  pub fn mark_volatile_secure(&self, guid: GUID) {
    self.volatile_secure.lock().unwrap().push(guid);
  }

  fn is_volatile_secure(&self, guid: GUID) -> bool {
    self.volatile_secure.lock().unwrap().contains(&guid)
  }

  pub fn local(&self, guid: GUID) -> Option<Arc<LocalEndpointSecurity>> {
    self.endpoints.lock().unwrap().get(&guid).cloned()
  }

  /// §4.4 `register_writer`/`register_reader`, unified over
  /// [`EndpointKind`]: fetch attributes, register with the crypto key
  /// factory only if payload or submessage protection is required.
  pub fn register_endpoint(
    &self,
    kind: EndpointKind,
    guid: GUID,
    participant_crypto_handle: ParticipantCryptoHandle,
    permissions_handle: crate::security::access_control::types::PermissionsHandle,
    topic_name: &str,
    partitions: &[String],
  ) -> SecurityResult<Arc<LocalEndpointSecurity>> {
    let access = self.plugins.access_control()?;
    let crypto = self.plugins.cryptographic()?;

    let attributes = match kind {
      EndpointKind::Writer => map_required!(
        access.get_writer_sec_attributes(permissions_handle, topic_name, partitions),
        PermissionsRejected,
        "get_writer_sec_attributes"
      )?,
      EndpointKind::Reader => map_required!(
        access.get_reader_sec_attributes(permissions_handle, topic_name, partitions),
        PermissionsRejected,
        "get_reader_sec_attributes"
      )?,
    };

    let crypto_handle = if attributes.requires_crypto_registration() {
      match kind {
        EndpointKind::Writer => map_required!(
          crypto.register_local_datawriter(participant_crypto_handle, attributes),
          CryptoRegistrationFailed,
          "register_local_datawriter"
        )?,
        EndpointKind::Reader => map_required!(
          crypto.register_local_datareader(participant_crypto_handle, attributes),
          CryptoRegistrationFailed,
          "register_local_datareader"
        )?,
      }
    } else {
      EndpointCryptoHandle::NIL
    };

    let endpoint = Arc::new(LocalEndpointSecurity {
      guid,
      kind,
      participant_crypto_handle,
      attributes,
      crypto_handle,
      force_key_hash: attributes.is_key_protected,
      matches: Mutex::new(HashMap::new()),
    });
    self.endpoints.lock().unwrap().insert(guid, endpoint.clone());
    Ok(endpoint)
  }

  /// §4.4 remote-writer admission for a local reader, and (symmetrically)
  /// remote-reader admission for a local writer. `remote_kind` names the
  /// role of `local`; the remote plays the opposite role.
  #[allow(clippy::too_many_arguments)]
  pub fn match_remote_endpoint_enabled(
    &self,
    local: &Arc<LocalEndpointSecurity>,
    remote_guid: GUID,
    remote_attributes: EndpointSecurityAttributes,
    remote_participant_authenticated: bool,
    remote_participant_crypto_handle: ParticipantCryptoHandle,
    shared_secret_handle: &SharedSecretHandle,
  ) -> SecurityResult<(MatchOutcome, Option<CryptoTokenSeq>)> {
    // Step 1: unsecured local endpoint accepts unconditionally.
    if !local.attributes.attributes.is_valid() {
      return Ok((MatchOutcome::AcceptedUnprotected, None));
    }

    // Step 2: compatibility check.
    if !local
      .attributes
      .attributes
      .compatible_with(&remote_attributes.attributes)
    {
      return Ok((MatchOutcome::Rejected, None));
    }

    // Step 3: no crypto needed at all.
    if !local.attributes.requires_crypto_registration() {
      return Ok((MatchOutcome::AcceptedUnprotected, None));
    }

    // Step 4: unauthenticated remote participant, protected local endpoint.
    if !remote_participant_authenticated {
      return Ok((MatchOutcome::RejectedUnauthenticated, None));
    }

    let (src, dst) = match local.kind {
      EndpointKind::Reader => (remote_guid, local.guid),
      EndpointKind::Writer => (local.guid, remote_guid),
    };

    // Step 5: already matched -- cached handle is authoritative.
    if let Some(existing) = self.emt.find(src, dst) {
      if existing.is_matched() {
        return Ok((MatchOutcome::Matched, None));
      }
    }

    // Step 6: register the matched remote endpoint with the crypto factory.
    let crypto = self.plugins.cryptographic()?;
    let remote_crypto_handle = match local.kind {
      EndpointKind::Reader => map_required!(
        crypto.register_matched_remote_datawriter(
          local.crypto_handle,
          remote_participant_crypto_handle,
          shared_secret_handle
        ),
        CryptoRegistrationFailed,
        "register_matched_remote_datawriter"
      )?,
      EndpointKind::Writer => map_required!(
        crypto.register_matched_remote_datareader(
          local.crypto_handle,
          remote_participant_crypto_handle,
          shared_secret_handle
        ),
        CryptoRegistrationFailed,
        "register_matched_remote_datareader"
      )?,
    };
    local.insert_match(remote_guid, remote_crypto_handle);

    // Step 7: builtin volatile-secure pair skips token exchange entirely --
    // its key material comes from the handshake, not a crypto-token round
    // trip.
    if self.is_volatile_secure(local.guid) && self.is_volatile_secure(remote_guid) {
      self.emt.with_entry_mut(src, dst, |entry| {
        entry.crypto_handle = remote_crypto_handle.0;
        entry.matched = true;
        entry.pending_tokens = None;
      });
      return Ok((MatchOutcome::Matched, None));
    }

    let pending = self.emt.with_entry_mut(src, dst, |entry| {
      entry.crypto_handle = remote_crypto_handle.0;
      if entry.matched {
        None
      } else {
        entry.pending_tokens.take()
      }
    });
    if let Some(tokens) = pending {
      // Step 7: peer's tokens already arrived -- install them now.
      self.apply_tokens(local, remote_crypto_handle, tokens, src, dst)?;
      return Ok((MatchOutcome::Matched, None));
    }

    // Step 8: no pending tokens to install -- produce this endpoint's own
    // tokens for the caller to send to the remote writer/reader.
    let local_tokens = self.create_local_tokens(local, remote_crypto_handle)?;
    Ok((MatchOutcome::Matched, Some(local_tokens)))
  }

  /// §4.4 step 8: `create_local_datawriter_crypto_tokens`/
  /// `create_local_datareader_crypto_tokens`, mirroring
  /// `secure_discovery::start_key_exchange_with_remote`'s participant-level
  /// token producer at the endpoint level. The caller is responsible for
  /// transmitting the returned sequence to the remote endpoint.
  fn create_local_tokens(
    &self,
    local: &Arc<LocalEndpointSecurity>,
    remote_crypto_handle: EndpointCryptoHandle,
  ) -> SecurityResult<CryptoTokenSeq> {
    let crypto = self.plugins.cryptographic()?;
    match local.kind {
      EndpointKind::Reader => map_required!(
        crypto.create_local_datareader_crypto_tokens(local.crypto_handle, remote_crypto_handle),
        CryptoRegistrationFailed,
        "create_local_datareader_crypto_tokens"
      ),
      EndpointKind::Writer => map_required!(
        crypto.create_local_datawriter_crypto_tokens(local.crypto_handle, remote_crypto_handle),
        CryptoRegistrationFailed,
        "create_local_datawriter_crypto_tokens"
      ),
    }
  }

  fn apply_tokens(
    &self,
    local: &Arc<LocalEndpointSecurity>,
    remote_crypto_handle: EndpointCryptoHandle,
    tokens: CryptoTokenSeq,
    src: GUID,
    dst: GUID,
  ) -> SecurityResult<()> {
    let crypto = self.plugins.cryptographic()?;
    match local.kind {
      EndpointKind::Reader => map_required!(
        crypto.set_remote_datawriter_crypto_tokens(local.crypto_handle, remote_crypto_handle, tokens),
        TokenApplyFailed,
        "set_remote_datawriter_crypto_tokens"
      )?,
      EndpointKind::Writer => map_required!(
        crypto.set_remote_datareader_crypto_tokens(local.crypto_handle, remote_crypto_handle, tokens),
        TokenApplyFailed,
        "set_remote_datareader_crypto_tokens"
      )?,
    };
    self.emt.with_entry_mut(src, dst, |entry| {
      entry.matched = true;
      entry.pending_tokens = None;
    });
    Ok(())
  }

  /// §4.4 `set_*_crypto_tokens` entry point: tokens arriving for
  /// (src=remote, dst=local) before or after the match itself.
  pub fn set_remote_crypto_tokens(
    &self,
    local: &Arc<LocalEndpointSecurity>,
    remote_guid: GUID,
    tokens: CryptoTokenSeq,
  ) -> SecurityResult<()> {
    let (src, dst) = match local.kind {
      EndpointKind::Reader => (remote_guid, local.guid),
      EndpointKind::Writer => (local.guid, remote_guid),
    };
    match local.matched_handle_for(remote_guid) {
      None => {
        self.emt.with_entry_mut(src, dst, |entry| {
          entry.pending_tokens = Some(tokens);
        });
        Ok(())
      }
      Some(remote_crypto_handle) => self.apply_tokens(local, remote_crypto_handle, tokens, src, dst),
    }
  }

  /// §4.4 deregistration: unregister the endpoint's own crypto handle and
  /// every per-match crypto handle, logging and continuing past plugin
  /// failures rather than blocking entity destruction.
  pub fn deregister_endpoint(&self, guid: GUID) {
    let endpoint = self.endpoints.lock().unwrap().remove(&guid);
    let Some(endpoint) = endpoint else { return };

    let crypto = match self.plugins.cryptographic() {
      Ok(crypto) => crypto,
      Err(_) => return,
    };

    for handle in endpoint.matched_handles() {
      let result = match endpoint.kind {
        EndpointKind::Reader => crypto.unregister_datawriter(handle),
        EndpointKind::Writer => crypto.unregister_datareader(handle),
      };
      if let Err(e) = result {
        log::warn!("deregister_endpoint: failed to unregister matched remote handle: {e}");
      }
    }

    if !endpoint.crypto_handle.is_nil() {
      let result = match endpoint.kind {
        EndpointKind::Writer => crypto.unregister_datawriter(endpoint.crypto_handle),
        EndpointKind::Reader => crypto.unregister_datareader(endpoint.crypto_handle),
      };
      if let Err(e) = result {
        log::warn!("deregister_endpoint: failed to unregister own handle: {e}");
      }
    }
  }

  pub fn remove_match(&self, local: &Arc<LocalEndpointSecurity>, remote_guid: GUID) -> Option<EndpointCryptoHandle> {
    local.remove_match(remote_guid)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::security::{
    access_control::{builtin::AccessControlBuiltin, types::PermissionsHandle},
    authentication::builtin::AuthenticationBuiltin,
    security_plugins::SecurityPlugins,
    types::{DataHolder, EntityId, GuidPrefix},
    CryptographicBuiltin,
  };

  fn make_registry() -> (SecureEndpointRegistry, SecurityPluginsHandle, ParticipantCryptoHandle) {
    let mut plugins = SecurityPlugins::new();
    plugins.load(
      Arc::new(AuthenticationBuiltin::default()),
      Arc::new(AccessControlBuiltin::default()),
      Arc::new(CryptographicBuiltin::default()),
    );
    let handle = SecurityPluginsHandle::new(plugins);
    let participant_crypto_handle = handle
      .cryptographic()
      .unwrap()
      .register_local_participant(Default::default())
      .unwrap();
    (
      SecureEndpointRegistry::new(handle.clone(), Arc::new(EntityMatchTable::new())),
      handle,
      participant_crypto_handle,
    )
  }

  fn writer_guid(byte: u8) -> GUID {
    GUID::new(GuidPrefix([byte; 12]), EntityId([0, 0, 0, 2]))
  }

  fn reader_guid(byte: u8) -> GUID {
    GUID::new(GuidPrefix([byte; 12]), EntityId([0, 0, 0, 3]))
  }

  #[test]
  fn unprotected_writer_registers_without_crypto_handle() {
    let (registry, plugins, participant) = make_registry();
    let permissions = plugins
      .access_control()
      .unwrap()
      .validate_local_permissions(0.into(), 0, &DataHolder::dummy())
      .unwrap();
    let writer = registry
      .register_endpoint(
        EndpointKind::Writer,
        writer_guid(1),
        participant,
        permissions,
        "topic",
        &[],
      )
      .unwrap();
    assert!(writer.crypto_handle.is_nil());
  }

  #[test]
  fn unprotected_endpoints_match_without_registration() {
    let (registry, plugins, participant) = make_registry();
    let permissions = plugins
      .access_control()
      .unwrap()
      .validate_local_permissions(0.into(), 0, &DataHolder::dummy())
      .unwrap();
    let reader = registry
      .register_endpoint(
        EndpointKind::Reader,
        reader_guid(1),
        participant,
        permissions,
        "topic",
        &[],
      )
      .unwrap();
    let remote_attrs = reader.attributes;
    let shared_secret = crate::security::authentication::types::SharedSecretHandle {
      shared_secret: bytes::Bytes::new(),
      challenge1: bytes::Bytes::new(),
      challenge2: bytes::Bytes::new(),
    };
    let (outcome, tokens) = registry
      .match_remote_endpoint_enabled(&reader, writer_guid(2), remote_attrs, true, participant, &shared_secret)
      .unwrap();
    assert_eq!(outcome, MatchOutcome::AcceptedUnprotected);
    assert!(tokens.is_none());
  }

  #[test]
  fn protected_fresh_match_produces_local_tokens_to_send() {
    let mut plugins = SecurityPlugins::new();
    plugins.load(
      Arc::new(AuthenticationBuiltin::default()),
      Arc::new(AccessControlBuiltin::default().with_protected_topic("secure-topic")),
      Arc::new(CryptographicBuiltin::default()),
    );
    let handle = SecurityPluginsHandle::new(plugins);
    let participant = handle
      .cryptographic()
      .unwrap()
      .register_local_participant(Default::default())
      .unwrap();
    let registry = SecureEndpointRegistry::new(handle.clone(), Arc::new(EntityMatchTable::new()));
    let permissions = handle
      .access_control()
      .unwrap()
      .validate_local_permissions(0.into(), 0, &DataHolder::dummy())
      .unwrap();
    let reader = registry
      .register_endpoint(
        EndpointKind::Reader,
        reader_guid(1),
        participant,
        permissions,
        "secure-topic",
        &[],
      )
      .unwrap();
    assert!(!reader.crypto_handle.is_nil());
    let shared_secret = crate::security::authentication::types::SharedSecretHandle {
      shared_secret: bytes::Bytes::new(),
      challenge1: bytes::Bytes::new(),
      challenge2: bytes::Bytes::new(),
    };
    let (outcome, tokens) = registry
      .match_remote_endpoint_enabled(
        &reader,
        writer_guid(2),
        reader.attributes,
        true,
        participant,
        &shared_secret,
      )
      .unwrap();
    assert_eq!(outcome, MatchOutcome::Matched);
    let tokens = tokens.expect("step 8 must produce local-reader crypto tokens to send to the remote writer");
    assert!(!tokens.is_empty());
    // No peer tokens arrived yet, so this side's own EMT entry isn't
    // marked matched until `set_remote_crypto_tokens` installs them.
    assert!(!reader.matched_handle_for(writer_guid(2)).unwrap().is_nil());
  }

  #[test]
  fn deregister_unknown_endpoint_is_a_no_op() {
    let (registry, _plugins, _participant) = make_registry();
    registry.deregister_endpoint(writer_guid(9));
  }

  #[test]
  fn remove_match_on_unknown_remote_returns_none() {
    let (registry, plugins, participant) = make_registry();
    let permissions = plugins
      .access_control()
      .unwrap()
      .validate_local_permissions(0.into(), 0, &DataHolder::dummy())
      .unwrap();
    let writer = registry
      .register_endpoint(
        EndpointKind::Writer,
        writer_guid(1),
        participant,
        permissions,
        "topic",
        &[],
      )
      .unwrap();
    assert!(registry.remove_match(&writer, reader_guid(5)).is_none());
  }
}
