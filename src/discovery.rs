//! Discovery-side glue between the (out-of-scope) RTPS discovery protocol
//! and the secure-messaging core: see [`secure_discovery`].

pub mod secure_discovery;

pub use secure_discovery::{AuthenticationStatus, SecureDiscovery, STORED_AUTH_MESSAGE_MAX_RESEND_COUNT};
