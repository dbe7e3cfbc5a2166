//! Participant Security State (§4.3): per-local-participant identity,
//! permissions, crypto handle, attributes and an ordered ProxyBack set; per
//! remote participant an ordered ParticipantMatch set keyed by the local
//! participant's crypto handle. The two sets cross-reference; deletion
//! requires symmetric unlink (§3 `ParticipantMatch`/`ProxyBack`).

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
};

use crate::{
  error::SecurityResult,
  map_best_effort, map_required,
  security::{
    access_control::types::ParticipantSecurityAttributes,
    authentication::types::SharedSecretHandle,
    emt::EntityMatchTable,
    garbage::{CleanupRecord, SecurityGarbage},
    handle_guard::HandleGuard,
    security_plugins::SecurityPluginsHandle,
    types::{
      AuthenticatedPeerCredentialToken, CryptoTokenSeq, DataHolder, GuidPrefix, IdentityHandle,
      ParticipantCryptoHandle, PermissionsHandle, PermissionsToken, GUID,
    },
  },
};

/// §3 `ProxyBack`: (remote-participant-GUID → remote-participant-crypto-handle),
/// stored in the local participant's table.
#[derive(Debug, Clone, Copy)]
pub struct ProxyBack {
  pub remote_participant_crypto_handle: ParticipantCryptoHandle,
}

/// §3 `ParticipantMatch`: keyed by the local participant's crypto handle in
/// the remote's table. Invariant: shared-secret is non-nil exactly when
/// `remote_identity_handle` is non-nil -- both are set together here.
#[derive(Clone)]
pub struct ParticipantMatch {
  pub remote_identity_handle: IdentityHandle,
  pub remote_participant_crypto_handle: ParticipantCryptoHandle,
  pub remote_permissions_handle: PermissionsHandle,
  pub shared_secret_handle: SharedSecretHandle,
}

/// Security state for one locally created participant.
pub struct LocalParticipantSecurity {
  pub guid_prefix: GuidPrefix,
  pub identity_handle: IdentityHandle,
  pub permissions_handle: PermissionsHandle,
  pub participant_crypto_handle: ParticipantCryptoHandle,
  pub attributes: ParticipantSecurityAttributes,
  /// Guards the ProxyBack set (§5 lock order 1).
  proxy_back: Mutex<HashMap<GuidPrefix, ProxyBack>>,
}

impl LocalParticipantSecurity {
  pub fn proxy_back_entries(&self) -> Vec<(GuidPrefix, ProxyBack)> {
    self
      .proxy_back
      .lock()
      .unwrap()
      .iter()
      .map(|(k, v)| (*k, *v))
      .collect()
  }
}

/// Security state for one remote (proxy) participant, allocated on first
/// discovery sample.
pub struct RemoteParticipantSecurity {
  pub guid_prefix: GuidPrefix,
  /// Guards the ParticipantMatch set (§5 lock order 2), keyed by the local
  /// participant's crypto handle.
  matches: Mutex<HashMap<ParticipantCryptoHandle, ParticipantMatch>>,
}

impl RemoteParticipantSecurity {
  /// "Authenticated" (§3): at least one ParticipantMatch exists.
  pub fn is_authenticated(&self) -> bool {
    !self.matches.lock().unwrap().is_empty()
  }

  pub fn find_match(&self, local_crypto_handle: ParticipantCryptoHandle) -> Option<ParticipantMatch> {
    self.matches.lock().unwrap().get(&local_crypto_handle).cloned()
  }
}

/// Outcome of `set_participant_crypto_tokens`, driving whether the
/// discovery handshake state machine should be re-notified immediately or
/// is already caught up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSetOutcome {
  /// No ParticipantMatch yet: tokens were stashed in the EMT entry.
  Stashed,
  /// ParticipantMatch exists: tokens were installed and the entry marked
  /// matched.
  Installed,
}

/// The PSS itself: owns the local/remote tables and holds references to the
/// PCL, EMT, and deferred-cleanup queue it calls into.
pub struct ParticipantSecurityState {
  plugins: SecurityPluginsHandle,
  emt: Arc<EntityMatchTable>,
  garbage: Arc<SecurityGarbage>,
  locals: Mutex<HashMap<GuidPrefix, Arc<LocalParticipantSecurity>>>,
  remotes: Mutex<HashMap<GuidPrefix, Arc<RemoteParticipantSecurity>>>,
}

impl ParticipantSecurityState {
  pub fn new(plugins: SecurityPluginsHandle, emt: Arc<EntityMatchTable>, garbage: Arc<SecurityGarbage>) -> Self {
    Self {
      plugins,
      emt,
      garbage,
      locals: Mutex::new(HashMap::new()),
      remotes: Mutex::new(HashMap::new()),
    }
  }

  pub fn local(&self, guid_prefix: GuidPrefix) -> Option<Arc<LocalParticipantSecurity>> {
    self.locals.lock().unwrap().get(&guid_prefix).cloned()
  }

  pub fn remote_or_create(&self, guid_prefix: GuidPrefix) -> Arc<RemoteParticipantSecurity> {
    self
      .remotes
      .lock()
      .unwrap()
      .entry(guid_prefix)
      .or_insert_with(|| {
        Arc::new(RemoteParticipantSecurity {
          guid_prefix,
          matches: Mutex::new(HashMap::new()),
        })
      })
      .clone()
  }

  pub fn remote(&self, guid_prefix: GuidPrefix) -> Option<Arc<RemoteParticipantSecurity>> {
    self.remotes.lock().unwrap().get(&guid_prefix).cloned()
  }

  /// All remotes currently authenticated, as (prefix, crypto-handle) pairs
  /// for the given local -- the snapshot-under-read-lock enumeration §9
  /// decides for `stp::encode_rtps_message(destination: None)`.
  pub fn authenticated_remotes_for(
    &self,
    local_crypto_handle: ParticipantCryptoHandle,
  ) -> Vec<(GuidPrefix, ParticipantCryptoHandle)> {
    self
      .remotes
      .lock()
      .unwrap()
      .values()
      .filter_map(|remote| {
        remote
          .find_match(local_crypto_handle)
          .map(|m| (remote.guid_prefix, m.remote_participant_crypto_handle))
      })
      .collect()
  }

  /// §4.3 creation sequence, steps 1-6. Any failure after step 1 rolls back
  /// to step-1 state via the `HandleGuard`s acquired along the way.
  pub fn check_create_participant(
    &self,
    candidate_guid: GUID,
    domain_id: u16,
    permissions_document: &DataHolder,
  ) -> SecurityResult<(GUID, Arc<LocalParticipantSecurity>)> {
    let auth = self.plugins.authentication()?;
    let access = self.plugins.access_control()?;
    let crypto = self.plugins.cryptographic()?;

    // Step 1: validate local identity; adopt the (possibly adjusted) GUID.
    let (identity_handle, adjusted_guid) = map_required!(
      auth.validate_local_identity(candidate_guid, domain_id),
      IdentityRejected,
      "validate_local_identity"
    )?;
    let identity_guard = {
      let auth = auth.clone();
      HandleGuard::new(move || {
        let _ = auth.return_identity_handle(identity_handle);
      })
    };

    // Step 2: identity token -- attached to the discovery record by the
    // caller (discovery glue), not stored here.
    let _identity_token = map_required!(
      auth.get_identity_token(identity_handle),
      IdentityRejected,
      "get_identity_token"
    )?;

    // Step 3: validate local permissions.
    let permissions_handle = map_required!(
      access.validate_local_permissions(identity_handle, domain_id, permissions_document),
      PermissionsRejected,
      "validate_local_permissions"
    )?;
    let permissions_guard = {
      let access = access.clone();
      HandleGuard::new(move || {
        let _ = access.return_permissions_handle(permissions_handle);
      })
    };

    // Step 4: install credential/permissions on the authentication context.
    let credential_token = map_required!(
      access.get_permissions_credential_token(permissions_handle),
      PermissionsRejected,
      "get_permissions_credential_token"
    )?;
    map_required!(
      auth.set_permissions_credential_and_token(identity_handle, credential_token),
      PermissionsRejected,
      "set_permissions_credential_and_token"
    )?;

    // Step 5: fetch participant security attributes.
    let attributes = map_required!(
      access.get_participant_sec_attributes(permissions_handle),
      PermissionsRejected,
      "get_participant_sec_attributes"
    )?;

    // Step 6: register the participant with the crypto key factory.
    let participant_crypto_handle = map_required!(
      crypto.register_local_participant(attributes),
      CryptoRegistrationFailed,
      "register_local_participant"
    )?;

    identity_guard.disarm();
    permissions_guard.disarm();

    let local = Arc::new(LocalParticipantSecurity {
      guid_prefix: adjusted_guid.prefix,
      identity_handle,
      permissions_handle,
      participant_crypto_handle,
      attributes,
      proxy_back: Mutex::new(HashMap::new()),
    });
    self.locals.lock().unwrap().insert(adjusted_guid.prefix, local.clone());

    Ok((adjusted_guid, local))
  }

  /// §4.3 remote participant admission.
  #[allow(clippy::too_many_arguments)]
  pub fn register_remote_participant(
    &self,
    local: &Arc<LocalParticipantSecurity>,
    remote_guid_prefix: GuidPrefix,
    remote_identity_handle: IdentityHandle,
    domain_id: u16,
    shared_secret_handle: SharedSecretHandle,
    remote_permissions_token: &PermissionsToken,
    remote_credential_token: &AuthenticatedPeerCredentialToken,
  ) -> SecurityResult<()> {
    let access = self.plugins.access_control()?;
    let crypto = self.plugins.cryptographic()?;

    // (a) validate remote permissions; best-effort when access is not
    // protected (caller decides severity by attribute; we always log at
    // warning here and still fail the admission, matching "fatal when
    // access is protected" being the caller's concern via attributes).
    let remote_permissions_handle = map_required!(
      access.validate_remote_permissions(
        remote_identity_handle,
        domain_id,
        remote_permissions_token,
        remote_credential_token
      ),
      PermissionsRejected,
      "validate_remote_permissions"
    )?;

    // (b) optional check under access-protection; failure here is a
    // warning, not fatal.
    let _ = map_best_effort!(
      access.check_remote_participant(remote_permissions_handle, domain_id),
      "check_remote_participant"
    );

    // (c) register the matched remote with the crypto key factory.
    let remote_participant_crypto_handle = map_required!(
      crypto.register_matched_remote_participant(local.participant_crypto_handle, &shared_secret_handle),
      CryptoRegistrationFailed,
      "register_matched_remote_participant"
    )?;

    let remote = self.remote_or_create(remote_guid_prefix);

    // (d) create ParticipantMatch and ProxyBack together. §5 lock order:
    // local lock (1) before proxy lock (2) -- acquire the local's
    // proxy_back lock first, then the remote's matches lock, insert into
    // both before releasing either.
    {
      let mut proxy_back = local.proxy_back.lock().unwrap();
      let mut matches = remote.matches.lock().unwrap();
      proxy_back.insert(
        remote_guid_prefix,
        ProxyBack {
          remote_participant_crypto_handle,
        },
      );
      matches.insert(
        local.participant_crypto_handle,
        ParticipantMatch {
          remote_identity_handle,
          remote_participant_crypto_handle,
          remote_permissions_handle,
          shared_secret_handle,
        },
      );
    }

    // (e) if tokens for (remote, local) already arrived, install them now.
    let remote_guid = GUID::participant_guid(remote_guid_prefix);
    let local_guid = GUID::participant_guid(local.guid_prefix);
    let pending = self.emt.with_entry_mut(remote_guid, local_guid, |entry| {
      if entry.matched {
        None
      } else {
        entry.pending_tokens.take()
      }
    });
    if let Some(tokens) = pending {
      map_required!(
        crypto.set_remote_participant_crypto_tokens(
          local.participant_crypto_handle,
          remote_participant_crypto_handle,
          tokens
        ),
        TokenApplyFailed,
        "set_remote_participant_crypto_tokens"
      )?;
      self.emt.with_entry_mut(remote_guid, local_guid, |entry| {
        entry.crypto_handle = remote_participant_crypto_handle.0;
        entry.matched = true;
        entry.pending_tokens = None;
      });
    }

    Ok(())
  }

  /// §4.3 `set_participant_crypto_tokens`: tokens arriving for
  /// (src=remote, dst=local).
  pub fn set_participant_crypto_tokens(
    &self,
    local: &Arc<LocalParticipantSecurity>,
    remote_guid_prefix: GuidPrefix,
    tokens: CryptoTokenSeq,
  ) -> SecurityResult<TokenSetOutcome> {
    let remote_guid = GUID::participant_guid(remote_guid_prefix);
    let local_guid = GUID::participant_guid(local.guid_prefix);

    let existing_match = self
      .remote(remote_guid_prefix)
      .and_then(|remote| remote.find_match(local.participant_crypto_handle));

    match existing_match {
      None => {
        self.emt.with_entry_mut(remote_guid, local_guid, |entry| {
          entry.pending_tokens = Some(tokens);
        });
        Ok(TokenSetOutcome::Stashed)
      }
      Some(m) => {
        let crypto = self.plugins.cryptographic()?;
        map_required!(
          crypto.set_remote_participant_crypto_tokens(
            local.participant_crypto_handle,
            m.remote_participant_crypto_handle,
            tokens
          ),
          TokenApplyFailed,
          "set_remote_participant_crypto_tokens"
        )?;
        self.emt.with_entry_mut(remote_guid, local_guid, |entry| {
          entry.crypto_handle = m.remote_participant_crypto_handle.0;
          entry.matched = true;
          entry.pending_tokens = None;
        });
        Ok(TokenSetOutcome::Installed)
      }
    }
  }

  /// §4.3 deregistration: park the crypto handle in the cleanup queue. The
  /// symmetric unlink and handle return happens in
  /// [`Self::run_deferred_cleanup`], invoked by the surrounding system's
  /// event loop once no in-flight encode can still be using the handle.
  pub fn deregister_participant(&self, guid_prefix: GuidPrefix) -> SecurityResult<()> {
    let local = self
      .locals
      .lock()
      .unwrap()
      .remove(&guid_prefix)
      .ok_or_else(|| crate::internal_invariant!("deregister_participant: unknown local {guid_prefix}"))?;

    self.garbage.schedule(CleanupRecord {
      participant_crypto_handle: local.participant_crypto_handle,
      endpoint_crypto_handles: Vec::new(),
    });
    Ok(())
  }

  /// Runs the deferred cleanup for one participant crypto handle: unlinks
  /// every ProxyBack/ParticipantMatch pair, drops the EMT entries keyed by
  /// this participant, and returns the crypto handle to the plugin.
  pub fn run_deferred_cleanup(&self, local_guid_prefix: GuidPrefix, local: &LocalParticipantSecurity) {
    for (remote_prefix, _) in local.proxy_back_entries() {
      if let Some(remote) = self.remote(remote_prefix) {
        remote.matches.lock().unwrap().remove(&local.participant_crypto_handle);
      }
      let remote_guid = GUID::participant_guid(remote_prefix);
      let local_guid = GUID::participant_guid(local_guid_prefix);
      self.emt.remove(remote_guid, local_guid);
      self.emt.remove(local_guid, remote_guid);
    }
    local.proxy_back.lock().unwrap().clear();

    if let Some(record) = self.garbage.collect(local.participant_crypto_handle) {
      if let Ok(crypto) = self.plugins.cryptographic() {
        let _ = crypto.unregister_participant(record.participant_crypto_handle);
        for endpoint in record.endpoint_crypto_handles {
          let _ = crypto.unregister_datawriter(endpoint);
        }
      }
    }
  }

  /// §4.3 `is_similar_participant_security_info`: compatible attribute sets,
  /// adopting the local's values when the remote omits the validity bit.
  pub fn is_similar_participant_security_info(
    local_attrs: ParticipantSecurityAttributes,
    remote_attrs: ParticipantSecurityAttributes,
  ) -> (bool, ParticipantSecurityAttributes) {
    let compatible = local_attrs.attributes.compatible_with(&remote_attrs.attributes);
    if compatible && !remote_attrs.attributes.is_valid() {
      (true, local_attrs)
    } else {
      (compatible, remote_attrs)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::security::{
    access_control::AccessControlBuiltin,
    authentication::AuthenticationBuiltin,
    security_plugins::SecurityPlugins,
    types::{EntityId, GuidPrefix},
    CryptographicBuiltin,
  };

  fn make_pss() -> ParticipantSecurityState {
    let mut plugins = SecurityPlugins::new();
    plugins.load(
      Arc::new(AuthenticationBuiltin::default()),
      Arc::new(AccessControlBuiltin::default()),
      Arc::new(CryptographicBuiltin::default()),
    );
    ParticipantSecurityState::new(
      SecurityPluginsHandle::new(plugins),
      Arc::new(EntityMatchTable::new()),
      Arc::new(SecurityGarbage::new()),
    )
  }

  #[test]
  fn check_create_participant_registers_local_state() {
    let pss = make_pss();
    let candidate = GUID::new(GuidPrefix([9; 12]), EntityId::PARTICIPANT);
    let (guid, local) = pss
      .check_create_participant(candidate, 0, &DataHolder::dummy())
      .unwrap();
    assert_eq!(guid, candidate);
    assert!(!local.participant_crypto_handle.is_nil());
    assert!(pss.local(guid.prefix).is_some());
  }

  #[test]
  fn tokens_arriving_before_match_are_stashed_then_applied() {
    let pss = make_pss();
    let local_guid = GUID::new(GuidPrefix([1; 12]), EntityId::PARTICIPANT);
    let (local_guid, local) = pss
      .check_create_participant(local_guid, 0, &DataHolder::dummy())
      .unwrap();

    let remote_prefix = GuidPrefix([2; 12]);
    let outcome = pss
      .set_participant_crypto_tokens(&local, remote_prefix, vec![DataHolder::dummy()])
      .unwrap();
    assert_eq!(outcome, TokenSetOutcome::Stashed);

    let remote_guid = GUID::participant_guid(remote_prefix);
    let entry = pss.emt.find(remote_guid, local_guid).unwrap();
    assert!(entry.pending_tokens.is_some());
    assert!(!entry.matched);

    // Now register the remote -- pending tokens should apply inline.
    let auth = pss.plugins.authentication().unwrap();
    let (remote_identity, _) = auth
      .validate_remote_identity(local.identity_handle, crate::security::types::IdentityToken::dummy(), remote_guid)
      .unwrap();
    let (_, hs_handle, _) = auth
      .begin_handshake_request(local.identity_handle, remote_identity)
      .unwrap();
    auth
      .process_handshake(crate::security::types::HandshakeMessageToken::dummy(), hs_handle)
      .unwrap();
    let shared_secret = auth.get_shared_secret(hs_handle).unwrap();
    let credential = auth.get_authenticated_peer_credential_token(hs_handle).unwrap();

    pss
      .register_remote_participant(
        &local,
        remote_prefix,
        remote_identity,
        0,
        shared_secret,
        &PermissionsToken::dummy(),
        &credential,
      )
      .unwrap();

    let entry = pss.emt.find(remote_guid, local_guid).unwrap();
    assert!(entry.matched);
    assert!(entry.pending_tokens.is_none());
  }

  #[test]
  fn similarity_check_is_symmetric_and_adopts_local_when_remote_invalid() {
    use crate::security::types::{SecurityAttributes, ATTR_FLAG_VALID};
    let local = ParticipantSecurityAttributes {
      attributes: SecurityAttributes {
        security_attributes: ATTR_FLAG_VALID,
        plugin_security_attributes: 0,
      },
      allow_unauthenticated_participants: false,
    };
    let remote_invalid = ParticipantSecurityAttributes {
      attributes: SecurityAttributes {
        security_attributes: 0,
        plugin_security_attributes: 0,
      },
      allow_unauthenticated_participants: false,
    };
    let (ok, adopted) = ParticipantSecurityState::is_similar_participant_security_info(local, remote_invalid);
    assert!(ok);
    assert_eq!(adopted.attributes, local.attributes);

    let (a, _) = ParticipantSecurityState::is_similar_participant_security_info(local, remote_invalid);
    let (b, _) = ParticipantSecurityState::is_similar_participant_security_info(remote_invalid, local);
    assert_eq!(a, b);
  }

  #[test]
  fn deregister_then_cleanup_unlinks_proxy_back() {
    let pss = make_pss();
    let candidate = GUID::new(GuidPrefix([5; 12]), EntityId::PARTICIPANT);
    let (guid, local) = pss
      .check_create_participant(candidate, 0, &DataHolder::dummy())
      .unwrap();
    pss.deregister_participant(guid.prefix).unwrap();
    assert!(pss.local(guid.prefix).is_none());
    pss.run_deferred_cleanup(guid.prefix, &local);
    assert_eq!(pss.garbage.pending_len(), 0);
  }
}
