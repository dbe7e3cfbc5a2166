//! Entry point for the secure-messaging core: the injected plugin
//! capabilities (`access_control`, `authentication`, `cryptographic`), the
//! ambient types they share (`types`), and the components built on top
//! (`security_plugins` = PCL, `emt`, `pss`, `ser`, `stp`, `garbage`,
//! `handle_guard`, `config`, `certificate`, `logging`).

pub mod access_control;
pub mod authentication;
pub mod certificate;
pub mod config;
pub mod cryptographic;
pub mod emt;
pub mod garbage;
pub mod handle_guard;
pub mod logging;
pub mod pss;
pub mod security_plugins;
pub mod ser;
pub mod stp;
pub mod types;

pub use types::*;

pub use access_control::{builtin::AccessControlBuiltin, plugin::AccessControl};
pub use authentication::{builtin::AuthenticationBuiltin, plugin::Authentication};
pub use cryptographic::{
  builtin::CryptographicBuiltin,
  plugin::{CryptoKeyExchange, CryptoKeyFactory, CryptoTransform},
  Cryptographic,
};
