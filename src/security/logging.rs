//! Structured logging helpers for the handful of events §7 calls out by
//! name ("an operational trace at the configured log level records the
//! rejection"). Thin wrappers over the `log` facade, not a logging
//! framework of their own -- call sites that don't need the structured
//! form keep using `log::{warn, error, info}` directly, exactly as the
//! teacher's own modules do.

use crate::security::types::GuidPrefix;

/// A remote participant or endpoint was dropped because of a security
/// failure. Logged at `warn` -- the application is unaffected, the
/// remote is simply invisible, per §7's "user-visible behavior".
pub fn log_remote_dropped(context: &str, remote_guid_prefix: GuidPrefix, reason: &dyn std::fmt::Display) {
  log::warn!("{context}: dropping remote {remote_guid_prefix:?}: {reason}");
}

/// A remote participant completed authentication and is now eligible for
/// matching. Logged at `info` -- this is the steady-state happy path,
/// not noisy per-sample traffic.
pub fn log_remote_authenticated(remote_guid_prefix: GuidPrefix) {
  log::info!("remote participant {remote_guid_prefix:?} authenticated");
}

/// A handshake message was resent because no reply arrived in time.
/// Logged at `debug`: routine under packet loss, only interesting when
/// correlating a stalled handshake.
pub fn log_handshake_resent(remote_guid_prefix: GuidPrefix, resend_count: u32) {
  log::debug!("resending handshake message to {remote_guid_prefix:?} (attempt {resend_count})");
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn logging_helpers_do_not_panic_without_a_configured_logger() {
    let prefix = GuidPrefix([7; 12]);
    log_remote_dropped("test", prefix, &"synthetic failure");
    log_remote_authenticated(prefix);
    log_handshake_resent(prefix, 1);
  }
}
