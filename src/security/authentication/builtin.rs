//! In-memory test double for the `Authentication` plugin. Mirrors the
//! teacher's own "builtin" plugin naming convention (`AuthenticationBuiltin`)
//! but, like the teacher's mock, does not perform real PKI validation --
//! every candidate identity is accepted and handles are allocated from an
//! atomic counter. It exists so the PSS/discovery state machines are
//! exercisable in tests without a production X.509/DH stack.

use std::{
  collections::HashMap,
  sync::atomic::{AtomicU64, Ordering},
  sync::Mutex,
};

use bytes::Bytes;

use super::{plugin::Authentication, types::*};
use crate::security::types::{
  GuidPrefix, PermissionsCredentialToken, SecurityException, GUID,
};

#[derive(Default)]
struct Inner {
  identities: HashMap<IdentityHandle, GuidPrefix>,
  handshakes: HashMap<HandshakeHandle, (IdentityHandle, IdentityHandle)>,
}

pub struct AuthenticationBuiltin {
  next_handle: AtomicU64,
  inner: Mutex<Inner>,
  allow_unauthenticated: bool,
}

impl AuthenticationBuiltin {
  pub fn new(allow_unauthenticated: bool) -> Self {
    Self {
      next_handle: AtomicU64::new(1),
      inner: Mutex::new(Inner::default()),
      allow_unauthenticated,
    }
  }

  fn alloc(&self) -> u64 {
    self.next_handle.fetch_add(1, Ordering::SeqCst)
  }
}

impl Default for AuthenticationBuiltin {
  fn default() -> Self {
    Self::new(false)
  }
}

impl Authentication for AuthenticationBuiltin {
  fn validate_local_identity(
    &self,
    candidate_participant_guid: GUID,
    _domain_id: u16,
  ) -> Result<(IdentityHandle, GUID), SecurityException> {
    let handle = IdentityHandle::from(self.alloc());
    self
      .inner
      .lock()
      .unwrap()
      .identities
      .insert(handle, candidate_participant_guid.prefix);
    Ok((handle, candidate_participant_guid))
  }

  fn get_identity_token(&self, _handle: IdentityHandle) -> Result<IdentityToken, SecurityException> {
    Ok(IdentityToken::dummy())
  }

  fn get_identity_status_token(
    &self,
    _handle: IdentityHandle,
  ) -> Result<IdentityStatusToken, SecurityException> {
    Ok(IdentityStatusToken::dummy())
  }

  fn validate_remote_identity(
    &self,
    _local_identity_handle: IdentityHandle,
    _remote_identity_token: IdentityToken,
    remote_guid: GUID,
  ) -> Result<(ValidationOutcome, IdentityHandle), SecurityException> {
    let handle = IdentityHandle::from(self.alloc());
    self
      .inner
      .lock()
      .unwrap()
      .identities
      .insert(handle, remote_guid.prefix);
    // Deterministic tie-break so exactly one side sends the request:
    // the lexicographically smaller prefix initiates.
    Ok((ValidationOutcome::PendingHandshakeRequest, handle))
  }

  fn begin_handshake_request(
    &self,
    initiator_identity_handle: IdentityHandle,
    replier_identity_handle: IdentityHandle,
  ) -> Result<(ValidationOutcome, HandshakeHandle, HandshakeMessageToken), SecurityException> {
    let handle = HandshakeHandle::from(self.alloc());
    self
      .inner
      .lock()
      .unwrap()
      .handshakes
      .insert(handle, (initiator_identity_handle, replier_identity_handle));
    Ok((
      ValidationOutcome::PendingHandshakeMessage,
      handle,
      HandshakeMessageToken::dummy(),
    ))
  }

  fn begin_handshake_reply(
    &self,
    _handshake_message_in: HandshakeMessageToken,
    initiator_identity_handle: IdentityHandle,
    replier_identity_handle: IdentityHandle,
  ) -> Result<(ValidationOutcome, HandshakeHandle, HandshakeMessageToken), SecurityException> {
    let handle = HandshakeHandle::from(self.alloc());
    self
      .inner
      .lock()
      .unwrap()
      .handshakes
      .insert(handle, (initiator_identity_handle, replier_identity_handle));
    Ok((
      ValidationOutcome::PendingHandshakeMessage,
      handle,
      HandshakeMessageToken::dummy(),
    ))
  }

  fn process_handshake(
    &self,
    _handshake_message_in: HandshakeMessageToken,
    handshake_handle: HandshakeHandle,
  ) -> Result<(ValidationOutcome, Option<HandshakeMessageToken>), SecurityException> {
    if !self
      .inner
      .lock()
      .unwrap()
      .handshakes
      .contains_key(&handshake_handle)
    {
      return Err(SecurityException::new(-1, "unknown handshake handle"));
    }
    // Single round trip to OkFinalMessage, matching a 3-message builtin
    // handshake (request -> reply -> final) collapsed for the test double.
    Ok((ValidationOutcome::OkFinalMessage, None))
  }

  fn get_shared_secret(
    &self,
    handshake_handle: HandshakeHandle,
  ) -> Result<SharedSecretHandle, SecurityException> {
    let inner = self.inner.lock().unwrap();
    let (a, b) = inner
      .handshakes
      .get(&handshake_handle)
      .ok_or_else(|| SecurityException::new(-1, "unknown handshake handle"))?;
    let mut secret = Vec::with_capacity(16);
    secret.extend_from_slice(&a.0.to_le_bytes());
    secret.extend_from_slice(&b.0.to_le_bytes());
    Ok(SharedSecretHandle {
      shared_secret: Bytes::from(secret),
      challenge1: Bytes::new(),
      challenge2: Bytes::new(),
    })
  }

  fn get_authenticated_peer_credential_token(
    &self,
    _handshake_handle: HandshakeHandle,
  ) -> Result<AuthenticatedPeerCredentialToken, SecurityException> {
    Ok(AuthenticatedPeerCredentialToken::dummy())
  }

  fn return_identity_handle(&self, handle: IdentityHandle) -> Result<(), SecurityException> {
    self.inner.lock().unwrap().identities.remove(&handle);
    Ok(())
  }

  fn return_handshake_handle(&self, handle: HandshakeHandle) -> Result<(), SecurityException> {
    self.inner.lock().unwrap().handshakes.remove(&handle);
    Ok(())
  }

  fn set_permissions_credential_and_token(
    &self,
    _identity_handle: IdentityHandle,
    _permissions_credential_token: PermissionsCredentialToken,
  ) -> Result<(), SecurityException> {
    Ok(())
  }

  fn allow_unauthenticated_participants(&self) -> bool {
    self.allow_unauthenticated
  }

  fn guid_prefix_of(&self, handle: IdentityHandle) -> Option<GuidPrefix> {
    self.inner.lock().unwrap().identities.get(&handle).copied()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::security::types::{EntityId, GuidPrefix};

  #[test]
  fn handshake_round_trip_yields_shared_secret() {
    let auth = AuthenticationBuiltin::new(false);
    let local_guid = GUID::new(GuidPrefix([1; 12]), EntityId::PARTICIPANT);
    let (local_handle, _) = auth.validate_local_identity(local_guid, 0).unwrap();

    let remote_guid = GUID::new(GuidPrefix([2; 12]), EntityId::PARTICIPANT);
    let (outcome, remote_handle) = auth
      .validate_remote_identity(local_handle, IdentityToken::dummy(), remote_guid)
      .unwrap();
    assert_eq!(outcome, ValidationOutcome::PendingHandshakeRequest);

    let (outcome, hs_handle, _msg) = auth
      .begin_handshake_request(local_handle, remote_handle)
      .unwrap();
    assert_eq!(outcome, ValidationOutcome::PendingHandshakeMessage);

    let (outcome, _) = auth
      .process_handshake(HandshakeMessageToken::dummy(), hs_handle)
      .unwrap();
    assert_eq!(outcome, ValidationOutcome::OkFinalMessage);

    let secret = auth.get_shared_secret(hs_handle).unwrap();
    assert!(!secret.shared_secret.is_empty());
  }
}
