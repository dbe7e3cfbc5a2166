//! The `Authentication` plugin interface: the injected capability that
//! validates local/remote identity and drives the handshake. This is one of
//! the three "external collaborators with named interfaces" from §1 --
//! expressed here as a fixed operation vocabulary (a trait) rather than a
//! concrete implementation. [`super::builtin::AuthenticationBuiltin`] is a
//! test double, not a production PKI stack.

use crate::{
  error::SecurityResult,
  security::{
    authentication::types::*,
    types::{GuidPrefix, SecurityException, GUID},
  },
};

pub trait Authentication: Send + Sync {
  /// Validate the local identity. The plugin may adjust the candidate GUID
  /// (e.g. deriving it from a certificate digest); the core must adopt
  /// whatever GUID comes back for all subsequent discovery (§4.3 step 1).
  fn validate_local_identity(
    &self,
    candidate_participant_guid: GUID,
    domain_id: u16,
  ) -> Result<(IdentityHandle, GUID), SecurityException>;

  /// Obtain the identity token to attach to the participant discovery
  /// record (§4.3 step 2).
  fn get_identity_token(&self, handle: IdentityHandle) -> Result<IdentityToken, SecurityException>;

  fn get_identity_status_token(
    &self,
    handle: IdentityHandle,
  ) -> Result<IdentityStatusToken, SecurityException>;

  /// Validate the remote identity given its identity token, beginning or
  /// continuing the handshake. Returns the outcome and, once available, a
  /// handshake handle to drive further exchange.
  fn validate_remote_identity(
    &self,
    local_identity_handle: IdentityHandle,
    remote_identity_token: IdentityToken,
    remote_guid: GUID,
  ) -> Result<(ValidationOutcome, IdentityHandle), SecurityException>;

  fn begin_handshake_request(
    &self,
    initiator_identity_handle: IdentityHandle,
    replier_identity_handle: IdentityHandle,
  ) -> Result<(ValidationOutcome, HandshakeHandle, HandshakeMessageToken), SecurityException>;

  fn begin_handshake_reply(
    &self,
    handshake_message_in: HandshakeMessageToken,
    initiator_identity_handle: IdentityHandle,
    replier_identity_handle: IdentityHandle,
  ) -> Result<(ValidationOutcome, HandshakeHandle, HandshakeMessageToken), SecurityException>;

  fn process_handshake(
    &self,
    handshake_message_in: HandshakeMessageToken,
    handshake_handle: HandshakeHandle,
  ) -> Result<(ValidationOutcome, Option<HandshakeMessageToken>), SecurityException>;

  fn get_shared_secret(
    &self,
    handshake_handle: HandshakeHandle,
  ) -> Result<SharedSecretHandle, SecurityException>;

  fn get_authenticated_peer_credential_token(
    &self,
    handshake_handle: HandshakeHandle,
  ) -> Result<AuthenticatedPeerCredentialToken, SecurityException>;

  /// Return a handle previously issued by this plugin. Required by §3's
  /// ownership rule: "the core must return each handle to its origin
  /// exactly once before releasing an entity."
  fn return_identity_handle(&self, handle: IdentityHandle) -> Result<(), SecurityException>;
  fn return_handshake_handle(&self, handle: HandshakeHandle) -> Result<(), SecurityException>;

  fn set_permissions_credential_and_token(
    &self,
    identity_handle: IdentityHandle,
    permissions_credential_token: crate::security::types::PermissionsCredentialToken,
  ) -> Result<(), SecurityException>;

  /// Used by `discovery` to decide which remote participants may be
  /// admitted without completing a handshake at all.
  fn allow_unauthenticated_participants(&self) -> bool;

  fn guid_prefix_of(&self, handle: IdentityHandle) -> Option<GuidPrefix>;
}

pub type AuthenticationResult<T> = SecurityResult<T>;
