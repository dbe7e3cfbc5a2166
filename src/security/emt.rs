//! Entity Match Table (§4.2): an ordered mapping keyed by (src-GUID,
//! dst-GUID) pairs, caching the crypto handle the crypto plugin produced for
//! that directed pair and a pending token sequence that arrived before the
//! peer was locally known. The rendezvous point between "remote endpoint
//! discovered" and "peer tokens received".

use std::{
  collections::BTreeMap,
  sync::{Mutex, MutexGuard},
};

use crate::security::types::{CryptoTokenSeq, GuidPair, RawHandle, GUID};

/// One entry, keyed by [`GuidPair`]. `crypto_handle` is `0` until a crypto
/// registration completes; `matched` is monotonic false→true (invariant 2:
/// `matched == true` implies non-zero handle and empty pending sequence).
#[derive(Debug, Clone, Default)]
pub struct EntityMatchEntry {
  pub crypto_handle: RawHandle,
  pub matched: bool,
  pub pending_tokens: Option<CryptoTokenSeq>,
}

impl EntityMatchEntry {
  pub fn is_matched(&self) -> bool {
    self.matched
  }
}

/// The table itself. Every operation takes the table lock; the lock is
/// never held across a plugin call (§5 rule 3). `BTreeMap` gives the
/// "ordered by the concatenated GUID pair" storage §4.2 describes.
#[derive(Default)]
pub struct EntityMatchTable {
  entries: Mutex<BTreeMap<GuidPair, EntityMatchEntry>>,
}

impl EntityMatchTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the entry for (src,dst), creating an empty one if absent.
  /// Concurrent calls for the same key serialize on the table lock and
  /// observe the same entry.
  pub fn find_or_create(&self, src: GUID, dst: GUID) -> EntityMatchEntry {
    let key = GuidPair::new(src, dst);
    let mut entries = self.entries.lock().unwrap();
    entries.entry(key).or_default().clone()
  }

  pub fn find(&self, src: GUID, dst: GUID) -> Option<EntityMatchEntry> {
    let key = GuidPair::new(src, dst);
    self.entries.lock().unwrap().get(&key).cloned()
  }

  /// Idempotent: a second `remove` for the same key returns `None`.
  /// Pending-token ownership transfers back to the caller, who must release
  /// it via the PCL (return the crypto tokens to the crypto key-exchange
  /// plugin) rather than simply dropping it.
  pub fn remove(&self, src: GUID, dst: GUID) -> Option<EntityMatchEntry> {
    let key = GuidPair::new(src, dst);
    self.entries.lock().unwrap().remove(&key)
  }

  pub fn destroy_all(&self) -> Vec<(GuidPair, EntityMatchEntry)> {
    self.entries.lock().unwrap().drain(..).collect()
  }

  /// Apply a mutation under the table lock without handing out a guard
  /// across a plugin call -- used by PSS/SER to set the crypto handle or
  /// stash/consume pending tokens atomically with the lookup.
  pub fn with_entry_mut<R>(
    &self,
    src: GUID,
    dst: GUID,
    f: impl FnOnce(&mut EntityMatchEntry) -> R,
  ) -> R {
    let key = GuidPair::new(src, dst);
    let mut entries = self.entries.lock().unwrap();
    f(entries.entry(key).or_default())
  }

  pub fn remove_all_for_guid(&self, guid: GUID) -> Vec<(GuidPair, EntityMatchEntry)> {
    let mut entries = self.entries.lock().unwrap();
    let keys: Vec<GuidPair> = entries
      .keys()
      .filter(|k| k.src == guid || k.dst == guid)
      .copied()
      .collect();
    keys
      .into_iter()
      .filter_map(|k| entries.remove(&k).map(|v| (k, v)))
      .collect()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[cfg(test)]
  fn lock_for_test(&self) -> MutexGuard<'_, BTreeMap<GuidPair, EntityMatchEntry>> {
    self.entries.lock().unwrap()
  }
}

#[cfg(test)]
mod tests {
  use anyhow::Context;

  use super::*;
  use crate::security::types::{EntityId, GuidPrefix};

  fn guid(byte: u8) -> GUID {
    GUID::new(GuidPrefix([byte; 12]), EntityId([0, 0, 0, 1]))
  }

  #[test]
  fn find_or_create_is_idempotent_for_same_key() {
    let emt = EntityMatchTable::new();
    let (src, dst) = (guid(1), guid(2));
    emt.with_entry_mut(src, dst, |e| e.crypto_handle = 42);
    let entry = emt.find_or_create(src, dst);
    assert_eq!(entry.crypto_handle, 42);
    assert_eq!(emt.lock_for_test().len(), 1);
  }

  #[test]
  fn remove_is_idempotent() {
    let emt = EntityMatchTable::new();
    let (src, dst) = (guid(1), guid(2));
    emt.find_or_create(src, dst);
    assert!(emt.remove(src, dst).is_some());
    assert!(emt.remove(src, dst).is_none());
  }

  #[test]
  fn matched_entry_has_nonzero_handle_and_no_pending_tokens() {
    let emt = EntityMatchTable::new();
    let (src, dst) = (guid(1), guid(2));
    emt.with_entry_mut(src, dst, |e| {
      e.crypto_handle = 7;
      e.pending_tokens = None;
      e.matched = true;
    });
    let entry = emt.find(src, dst).unwrap();
    assert!(entry.is_matched());
    assert_ne!(entry.crypto_handle, 0);
    assert!(entry.pending_tokens.is_none());
  }

  #[test]
  fn pending_tokens_transfer_ownership_on_remove() -> anyhow::Result<()> {
    let emt = EntityMatchTable::new();
    let (src, dst) = (guid(1), guid(2));
    emt.with_entry_mut(src, dst, |e| {
      e.pending_tokens = Some(vec![crate::security::types::DataHolder::dummy()]);
    });
    let removed = emt.remove(src, dst).context("entry inserted above must still be present")?;
    let tokens = removed
      .pending_tokens
      .context("pending tokens must transfer to the caller on remove, not be dropped")?;
    assert_eq!(tokens.len(), 1);
    Ok(())
  }

  #[test]
  fn remove_all_for_guid_clears_both_directions() {
    let emt = EntityMatchTable::new();
    let (a, b, c) = (guid(1), guid(2), guid(3));
    emt.find_or_create(a, b);
    emt.find_or_create(b, c);
    emt.find_or_create(a, c);
    let removed = emt.remove_all_for_guid(b);
    assert_eq!(removed.len(), 2);
    assert_eq!(emt.len(), 1);
  }
}
