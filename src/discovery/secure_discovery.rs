//! Discovery-side glue that drives the handshake/token-exchange state
//! machine from discovery events. This is not an RTPS discovery
//! implementation: it tracks per-remote-participant authentication state
//! and, once a remote reaches `Authenticated`, kicks off crypto token
//! exchange against the builtin endpoint set, mirroring the role the
//! teacher's own discovery glue plays between SPDP and the security core.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
};

use crate::{
  error::SecurityResult,
  security::{
    logging::{log_handshake_resent, log_remote_authenticated, log_remote_dropped},
    pss::ParticipantSecurityState,
    security_plugins::SecurityPluginsHandle,
    types::{CryptoTokenSeq, GuidPrefix},
  },
};

/// Per-remote-participant progress along the discover -> identify ->
/// authenticate edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationStatus {
  Authenticating,
  Authenticated,
  Unauthenticated,
  Rejected,
}

/// Bound on handshake resends before a stalled remote is dropped instead
/// of retried forever.
pub const STORED_AUTH_MESSAGE_MAX_RESEND_COUNT: u32 = 5;

struct RemoteProgress {
  status: AuthenticationStatus,
  resend_count: u32,
}

/// Tracks authentication status per remote participant and drives key
/// exchange once a remote authenticates. One instance per local
/// participant.
pub struct SecureDiscovery {
  plugins: SecurityPluginsHandle,
  pss: Arc<ParticipantSecurityState>,
  remotes: Mutex<HashMap<GuidPrefix, RemoteProgress>>,
}

impl SecureDiscovery {
  pub fn new(plugins: SecurityPluginsHandle, pss: Arc<ParticipantSecurityState>) -> Self {
    Self {
      plugins,
      pss,
      remotes: Mutex::new(HashMap::new()),
    }
  }

  /// Records a remote as newly discovered, pending identity validation.
  pub fn on_remote_discovered(&self, remote_guid_prefix: GuidPrefix) {
    self.remotes.lock().unwrap().entry(remote_guid_prefix).or_insert(RemoteProgress {
      status: AuthenticationStatus::Authenticating,
      resend_count: 0,
    });
  }

  pub fn status_of(&self, remote_guid_prefix: GuidPrefix) -> Option<AuthenticationStatus> {
    self.remotes.lock().unwrap().get(&remote_guid_prefix).map(|p| p.status)
  }

  /// Called once `ParticipantSecurityState::register_remote_participant`
  /// has succeeded for this remote: flips the tracked status and triggers
  /// key exchange against already-matched endpoints.
  pub fn on_remote_authenticated(&self, local_guid_prefix: GuidPrefix, remote_guid_prefix: GuidPrefix) -> SecurityResult<()> {
    {
      let mut remotes = self.remotes.lock().unwrap();
      let progress = remotes.entry(remote_guid_prefix).or_insert(RemoteProgress {
        status: AuthenticationStatus::Authenticating,
        resend_count: 0,
      });
      progress.status = AuthenticationStatus::Authenticated;
    }
    log_remote_authenticated(remote_guid_prefix);
    self.start_key_exchange_with_remote(local_guid_prefix, remote_guid_prefix)?;
    Ok(())
  }

  pub fn on_remote_rejected(&self, remote_guid_prefix: GuidPrefix, reason: &dyn std::fmt::Display) {
    if let Some(progress) = self.remotes.lock().unwrap().get_mut(&remote_guid_prefix) {
      progress.status = AuthenticationStatus::Rejected;
    }
    log_remote_dropped("authentication", remote_guid_prefix, reason);
  }

  pub fn on_remote_unauthenticated(&self, remote_guid_prefix: GuidPrefix) {
    self.remotes.lock().unwrap().entry(remote_guid_prefix).or_insert(RemoteProgress {
      status: AuthenticationStatus::Unauthenticated,
      resend_count: 0,
    });
  }

  /// Counts one more handshake message resend for `remote_guid_prefix`,
  /// returning `true` once the bound is exceeded and the caller should
  /// give up and drop the remote instead of resending again.
  pub fn note_handshake_resend(&self, remote_guid_prefix: GuidPrefix) -> bool {
    let mut remotes = self.remotes.lock().unwrap();
    let progress = remotes.entry(remote_guid_prefix).or_insert(RemoteProgress {
      status: AuthenticationStatus::Authenticating,
      resend_count: 0,
    });
    progress.resend_count += 1;
    log_handshake_resent(remote_guid_prefix, progress.resend_count);
    progress.resend_count > STORED_AUTH_MESSAGE_MAX_RESEND_COUNT
  }

  pub fn forget_remote(&self, remote_guid_prefix: GuidPrefix) {
    self.remotes.lock().unwrap().remove(&remote_guid_prefix);
  }

  /// Once a remote participant is authenticated, produce the local
  /// participant crypto tokens that must go out over the builtin
  /// volatile-secure writer. Sending the result is the caller's job --
  /// this glue module only drives the crypto-side half of the handshake
  /// state machine's `authenticated -> tokens sent` edge.
  pub fn start_key_exchange_with_remote(
    &self,
    local_guid_prefix: GuidPrefix,
    remote_guid_prefix: GuidPrefix,
  ) -> SecurityResult<Option<CryptoTokenSeq>> {
    let Some(local) = self.pss.local(local_guid_prefix) else {
      return Ok(None);
    };
    let Some(remote) = self.pss.remote(remote_guid_prefix) else {
      return Ok(None);
    };
    let Some(participant_match) = remote.find_match(local.participant_crypto_handle) else {
      return Ok(None);
    };
    let crypto = self.plugins.cryptographic()?;
    let tokens = crate::map_required!(
      crypto.create_local_participant_crypto_tokens(
        local.participant_crypto_handle,
        participant_match.remote_participant_crypto_handle
      ),
      CryptoRegistrationFailed,
      "create_local_participant_crypto_tokens"
    )?;
    Ok(Some(tokens))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::security::{emt::EntityMatchTable, garbage::SecurityGarbage, types::GuidPrefix};

  fn new_discovery() -> SecureDiscovery {
    let plugins = SecurityPluginsHandle::default();
    let emt = Arc::new(EntityMatchTable::new());
    let garbage = Arc::new(SecurityGarbage::new());
    let pss = Arc::new(ParticipantSecurityState::new(plugins.clone(), emt, garbage));
    SecureDiscovery::new(plugins, pss)
  }

  #[test]
  fn newly_discovered_remote_starts_authenticating() {
    let discovery = new_discovery();
    let remote = GuidPrefix([9; 12]);
    discovery.on_remote_discovered(remote);
    assert_eq!(discovery.status_of(remote), Some(AuthenticationStatus::Authenticating));
  }

  #[test]
  fn resend_bound_trips_after_max_count() {
    let discovery = new_discovery();
    let remote = GuidPrefix([3; 12]);
    let mut tripped = false;
    for _ in 0..(STORED_AUTH_MESSAGE_MAX_RESEND_COUNT + 1) {
      tripped = discovery.note_handshake_resend(remote);
    }
    assert!(tripped);
  }

  #[test]
  fn rejected_remote_is_tracked_distinctly_from_unauthenticated() {
    let discovery = new_discovery();
    let rejected = GuidPrefix([1; 12]);
    let unauth = GuidPrefix([2; 12]);
    discovery.on_remote_rejected(rejected, &"identity rejected in test");
    discovery.on_remote_unauthenticated(unauth);
    assert_eq!(discovery.status_of(rejected), Some(AuthenticationStatus::Rejected));
    assert_eq!(discovery.status_of(unauth), Some(AuthenticationStatus::Unauthenticated));
  }

  #[test]
  fn forgetting_a_remote_clears_its_status() {
    let discovery = new_discovery();
    let remote = GuidPrefix([4; 12]);
    discovery.on_remote_discovered(remote);
    discovery.forget_remote(remote);
    assert_eq!(discovery.status_of(remote), None);
  }
}
