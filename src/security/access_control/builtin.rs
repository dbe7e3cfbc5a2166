//! In-memory test double for the `AccessControl` plugin. Like the teacher's
//! own mock, this grants every request: no governance/permissions XML is
//! parsed. `protected_topics` lets tests opt specific topics into
//! submessage/payload protection without a real governance document.

use std::{
  collections::{HashMap, HashSet},
  sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
  },
};

use super::{plugin::AccessControl, types::*};
use crate::security::{
  authentication::types::{AuthenticatedPeerCredentialToken, IdentityHandle},
  types::{
    PermissionsCredentialToken, SecurityException, ATTR_FLAG_PAYLOAD_PROTECTED,
    ATTR_FLAG_SUBMESSAGE_PROTECTED, ATTR_FLAG_VALID, GUID,
  },
};

pub struct AccessControlBuiltin {
  next_handle: AtomicU64,
  protected_topics: HashSet<String>,
  discovery_protected_topics: HashSet<String>,
  issued: Mutex<HashMap<PermissionsHandle, ()>>,
}

impl AccessControlBuiltin {
  pub fn new() -> Self {
    Self {
      next_handle: AtomicU64::new(1),
      protected_topics: HashSet::new(),
      discovery_protected_topics: HashSet::new(),
      issued: Mutex::new(HashMap::new()),
    }
  }

  pub fn with_protected_topic(mut self, topic: impl Into<String>) -> Self {
    self.protected_topics.insert(topic.into());
    self
  }

  pub fn with_discovery_protected_topic(mut self, topic: impl Into<String>) -> Self {
    self.discovery_protected_topics.insert(topic.into());
    self
  }

  fn alloc(&self) -> PermissionsHandle {
    let h = PermissionsHandle::from(self.next_handle.fetch_add(1, Ordering::SeqCst));
    self.issued.lock().unwrap().insert(h, ());
    h
  }
}

impl Default for AccessControlBuiltin {
  fn default() -> Self {
    Self::new()
  }
}

impl AccessControl for AccessControlBuiltin {
  fn validate_local_permissions(
    &self,
    _identity_handle: IdentityHandle,
    _domain_id: u16,
    _permissions_document: &crate::security::types::DataHolder,
  ) -> Result<PermissionsHandle, SecurityException> {
    Ok(self.alloc())
  }

  fn get_permissions_token(
    &self,
    _handle: PermissionsHandle,
  ) -> Result<PermissionsToken, SecurityException> {
    Ok(PermissionsToken::dummy())
  }

  fn get_permissions_credential_token(
    &self,
    _handle: PermissionsHandle,
  ) -> Result<PermissionsCredentialToken, SecurityException> {
    Ok(PermissionsCredentialToken::dummy())
  }

  fn validate_remote_permissions(
    &self,
    _remote_identity_handle: IdentityHandle,
    _domain_id: u16,
    _remote_permissions_token: &PermissionsToken,
    _remote_credential_token: &AuthenticatedPeerCredentialToken,
  ) -> Result<PermissionsHandle, SecurityException> {
    Ok(self.alloc())
  }

  fn check_remote_participant(
    &self,
    _permissions_handle: PermissionsHandle,
    _domain_id: u16,
  ) -> Result<(), SecurityException> {
    Ok(())
  }

  fn check_remote_datawriter(
    &self,
    _permissions_handle: PermissionsHandle,
    _domain_id: u16,
    _topic_name: &str,
  ) -> Result<(), SecurityException> {
    Ok(())
  }

  fn check_remote_datareader(
    &self,
    _permissions_handle: PermissionsHandle,
    _domain_id: u16,
    _topic_name: &str,
  ) -> Result<(), SecurityException> {
    Ok(())
  }

  fn get_participant_sec_attributes(
    &self,
    _permissions_handle: PermissionsHandle,
  ) -> Result<ParticipantSecurityAttributes, SecurityException> {
    Ok(ParticipantSecurityAttributes {
      attributes: crate::security::types::SecurityAttributes {
        security_attributes: ATTR_FLAG_VALID,
        plugin_security_attributes: 0,
      },
      allow_unauthenticated_participants: false,
    })
  }

  fn get_writer_sec_attributes(
    &self,
    _permissions_handle: PermissionsHandle,
    topic_name: &str,
    _partitions: &[String],
  ) -> Result<EndpointSecurityAttributes, SecurityException> {
    Ok(self.endpoint_attributes_for(topic_name))
  }

  fn get_reader_sec_attributes(
    &self,
    _permissions_handle: PermissionsHandle,
    topic_name: &str,
    _partitions: &[String],
  ) -> Result<EndpointSecurityAttributes, SecurityException> {
    Ok(self.endpoint_attributes_for(topic_name))
  }

  fn is_topic_discovery_protected(
    &self,
    _permissions_handle: PermissionsHandle,
    topic_name: &str,
  ) -> bool {
    self.discovery_protected_topics.contains(topic_name)
  }

  fn return_permissions_handle(&self, handle: PermissionsHandle) -> Result<(), SecurityException> {
    self.issued.lock().unwrap().remove(&handle);
    Ok(())
  }

  fn participant_deletion_allowed(&self, _remote_guid: GUID) -> bool {
    false
  }
}

impl AccessControlBuiltin {
  fn endpoint_attributes_for(&self, topic_name: &str) -> EndpointSecurityAttributes {
    let mut security_attributes = ATTR_FLAG_VALID;
    if self.protected_topics.contains(topic_name) {
      security_attributes |= ATTR_FLAG_PAYLOAD_PROTECTED | ATTR_FLAG_SUBMESSAGE_PROTECTED;
    }
    EndpointSecurityAttributes {
      attributes: crate::security::types::SecurityAttributes {
        security_attributes,
        plugin_security_attributes: 0,
      },
      is_key_protected: false,
    }
  }
}
