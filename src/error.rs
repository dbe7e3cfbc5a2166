//! Error taxonomy for the secure-messaging core (§7). Plugin calls never
//! throw into the core: a plugin method returns `Result<_, SecurityException>`
//! and the call site here maps that exception to one of the variants below,
//! logging once at the severity appropriate to whether the operation was
//! required or best-effort.

use thiserror::Error;

use crate::security::types::SecurityException;

pub type SecurityResult<T> = Result<T, SecurityError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
  /// A required plugin is absent. The operation silently permits the
  /// insecure path when and only when config allows unauthenticated
  /// participants; otherwise it is fatal to the caller.
  #[error("security plugin not configured: {0}")]
  NotConfigured(String),

  #[error("remote identity rejected: {0}")]
  IdentityRejected(String),

  #[error("remote permissions rejected: {0}")]
  PermissionsRejected(String),

  #[error("handshake failed: {0}")]
  HandshakeFailed(String),

  #[error("crypto registration failed: {0}")]
  CryptoRegistrationFailed(String),

  #[error("failed to apply crypto tokens: {0}")]
  TokenApplyFailed(String),

  /// A receive-time structural failure: the surrounding RTPS message is
  /// discarded, not just the one submessage.
  #[error("submessage protection violation: {0}")]
  SubmessageProtectionViolation(String),

  /// Catch-all wrapping a plugin's (code, message). Always logged; mapped
  /// to one of the above by the call site when a more specific taxonomy
  /// entry applies.
  #[error("plugin exception: {0}")]
  PluginException(#[from] SecurityException),

  /// Invariant broken in the core. Trapped (`panic!`) in debug builds via
  /// [`crate::internal_invariant`], logged and returned here in release.
  #[error("internal invariant violated: {0}")]
  Internal(String),
}

impl SecurityError {
  /// True for the authentication-path failures that §7 says drop the
  /// offending remote rather than the whole RTPS message.
  pub fn drops_remote(&self) -> bool {
    matches!(
      self,
      SecurityError::IdentityRejected(_)
        | SecurityError::PermissionsRejected(_)
        | SecurityError::HandshakeFailed(_)
        | SecurityError::CryptoRegistrationFailed(_)
        | SecurityError::TokenApplyFailed(_)
    )
  }
}

/// Construct a [`SecurityError::Internal`] and, in debug builds, panic
/// immediately -- matching §7's "trapped in debug, logged in release" for
/// the `Internal` taxonomy entry.
#[macro_export]
macro_rules! internal_invariant {
  ($($arg:tt)*) => {{
    let msg = format!($($arg)*);
    if cfg!(debug_assertions) {
      panic!("internal invariant violated: {msg}");
    }
    log::error!("internal invariant violated: {msg}");
    $crate::error::SecurityError::Internal(msg)
  }};
}

/// Log a plugin exception at the severity appropriate for a required
/// operation (error) and map it into the given taxonomy variant.
#[macro_export]
macro_rules! map_required {
  ($result:expr, $variant:ident, $ctx:expr) => {
    $result.map_err(|e: $crate::security::types::SecurityException| {
      log::error!("{}: {}", $ctx, e);
      $crate::error::SecurityError::$variant(format!("{}: {}", $ctx, e))
    })
  };
}

/// Log a plugin exception at warning severity for a best-effort operation
/// (§4.3 remote participant admission step (a): "when access is not
/// protected, a plugin failure here is a warning, not a fatal").
#[macro_export]
macro_rules! map_best_effort {
  ($result:expr, $ctx:expr) => {
    $result.map_err(|e: $crate::security::types::SecurityException| {
      log::warn!("{}: {}", $ctx, e);
      e
    })
  };
}
