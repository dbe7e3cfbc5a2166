//! Authentication-specific types (Security specification v1.1, sec. 8.3.2).

pub use crate::security::types::{
  AuthRequestMessageToken, AuthenticatedPeerCredentialToken, HandshakeHandle,
  HandshakeMessageToken, IdentityHandle, IdentityStatusToken, IdentityToken, SharedSecretHandle,
};

/// Generic message class IDs for authentication (Security spec sec. 7.4.3.5).
pub const GMCLASSID_SECURITY_AUTH_REQUEST: &str = "dds.sec.auth_request";
pub const GMCLASSID_SECURITY_AUTH_HANDSHAKE: &str = "dds.sec.auth";

/// Like `ValidationResult_t` in the Security specification (sec. 8.3.2.11.1),
/// but omits `VALIDATION_FAILED` -- failure is carried as
/// `Err(SecurityError::HandshakeFailed)` instead, since the builtin plugins
/// modeled here never return the bare "failed" outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
  Ok,
  PendingHandshakeRequest,
  PendingHandshakeMessage,
  OkFinalMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMessageKind {
  Request,
  Reply,
  Final,
}
