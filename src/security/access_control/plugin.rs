//! The `AccessControl` plugin interface: the injected capability that
//! validates permissions documents and authorizes remote participants,
//! writers, and readers against governance/permissions rules. One of the
//! three "external collaborators with named interfaces" from §1.

use crate::security::{
  access_control::types::*,
  authentication::types::{AuthenticatedPeerCredentialToken, IdentityHandle},
  types::{DataHolder, SecurityException, GUID},
};

pub trait AccessControl: Send + Sync {
  /// Validate local permissions; obtain a permissions handle, permissions
  /// token, and credential token (§4.3 step 3).
  fn validate_local_permissions(
    &self,
    identity_handle: IdentityHandle,
    domain_id: u16,
    permissions_document: &DataHolder,
  ) -> Result<PermissionsHandle, SecurityException>;

  fn get_permissions_token(
    &self,
    handle: PermissionsHandle,
  ) -> Result<PermissionsToken, SecurityException>;

  fn get_permissions_credential_token(
    &self,
    handle: PermissionsHandle,
  ) -> Result<crate::security::types::PermissionsCredentialToken, SecurityException>;

  /// Validate remote permissions given the peer's permissions token and
  /// authenticated peer credential token (§4.3 remote participant
  /// admission step (a)).
  fn validate_remote_permissions(
    &self,
    remote_identity_handle: IdentityHandle,
    domain_id: u16,
    remote_permissions_token: &PermissionsToken,
    remote_credential_token: &AuthenticatedPeerCredentialToken,
  ) -> Result<PermissionsHandle, SecurityException>;

  /// Check remote participant data under access-protection (§4.3 remote
  /// participant admission step (b), optional/best-effort).
  fn check_remote_participant(
    &self,
    permissions_handle: PermissionsHandle,
    domain_id: u16,
  ) -> Result<(), SecurityException>;

  fn check_remote_datawriter(
    &self,
    permissions_handle: PermissionsHandle,
    domain_id: u16,
    topic_name: &str,
  ) -> Result<(), SecurityException>;

  fn check_remote_datareader(
    &self,
    permissions_handle: PermissionsHandle,
    domain_id: u16,
    topic_name: &str,
  ) -> Result<(), SecurityException>;

  fn get_participant_sec_attributes(
    &self,
    permissions_handle: PermissionsHandle,
  ) -> Result<ParticipantSecurityAttributes, SecurityException>;

  fn get_writer_sec_attributes(
    &self,
    permissions_handle: PermissionsHandle,
    topic_name: &str,
    partitions: &[String],
  ) -> Result<EndpointSecurityAttributes, SecurityException>;

  fn get_reader_sec_attributes(
    &self,
    permissions_handle: PermissionsHandle,
    topic_name: &str,
    partitions: &[String],
  ) -> Result<EndpointSecurityAttributes, SecurityException>;

  fn is_topic_discovery_protected(
    &self,
    permissions_handle: PermissionsHandle,
    topic_name: &str,
  ) -> bool;

  fn return_permissions_handle(&self, handle: PermissionsHandle) -> Result<(), SecurityException>;

  /// Access-controlled check before honoring a remote participant deletion
  /// request that did not arrive over the secure discovery channel (§3
  /// remote participant lifecycle).
  fn participant_deletion_allowed(&self, remote_guid: GUID) -> bool {
    let _ = remote_guid;
    false
  }
}
