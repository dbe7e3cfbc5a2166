//! Deferred handle reclamation (§3 `CleanupRecord`, §4.3 deregistration,
//! §4.6 "cleanup is always driven through the deferred CleanupRecord path to
//! avoid use-after-free on in-flight crypto operations"). A participant
//! crypto handle stays valid for any in-flight encode until the surrounding
//! system's event loop drains this queue and calls `collect`.

use std::{
  collections::HashMap,
  sync::Mutex,
};

use crate::security::types::ParticipantCryptoHandle;

/// One participant's worth of deferred cleanup: the crypto handle to
/// unregister plus any endpoint crypto handles that rode along with it.
pub struct CleanupRecord {
  pub participant_crypto_handle: ParticipantCryptoHandle,
  pub endpoint_crypto_handles: Vec<crate::security::types::EndpointCryptoHandle>,
}

/// §5: "Global `security_garbage.lock` ... leaves; acquire last if at all."
/// Keyed by participant crypto handle so a second `schedule` for the same
/// handle replaces rather than duplicates the pending record.
#[derive(Default)]
pub struct SecurityGarbage {
  pending: Mutex<HashMap<ParticipantCryptoHandle, CleanupRecord>>,
}

impl SecurityGarbage {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn schedule(&self, record: CleanupRecord) {
    self
      .pending
      .lock()
      .unwrap()
      .insert(record.participant_crypto_handle, record);
  }

  /// Number of records awaiting collection; used by tests and diagnostics.
  pub fn pending_len(&self) -> usize {
    self.pending.lock().unwrap().len()
  }

  /// Drain every pending record. The caller (the surrounding system's event
  /// loop) is expected to have already confirmed no in-flight encode holds
  /// the handle before invoking this.
  pub fn collect_all(&self) -> Vec<CleanupRecord> {
    self.pending.lock().unwrap().drain().map(|(_, v)| v).collect()
  }

  /// Collect a single record by handle, if still pending.
  pub fn collect(&self, handle: ParticipantCryptoHandle) -> Option<CleanupRecord> {
    self.pending.lock().unwrap().remove(&handle)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scheduled_record_is_collectible_once() {
    let garbage = SecurityGarbage::new();
    let handle = ParticipantCryptoHandle::from(7);
    garbage.schedule(CleanupRecord {
      participant_crypto_handle: handle,
      endpoint_crypto_handles: vec![],
    });
    assert_eq!(garbage.pending_len(), 1);
    assert!(garbage.collect(handle).is_some());
    assert!(garbage.collect(handle).is_none());
  }

  #[test]
  fn rescheduling_same_handle_replaces_record() {
    let garbage = SecurityGarbage::new();
    let handle = ParticipantCryptoHandle::from(3);
    garbage.schedule(CleanupRecord {
      participant_crypto_handle: handle,
      endpoint_crypto_handles: vec![],
    });
    garbage.schedule(CleanupRecord {
      participant_crypto_handle: handle,
      endpoint_crypto_handles: vec![crate::security::types::EndpointCryptoHandle::from(1)],
    });
    assert_eq!(garbage.pending_len(), 1);
    let record = garbage.collect(handle).unwrap();
    assert_eq!(record.endpoint_crypto_handles.len(), 1);
  }
}
