//! The `Cryptographic` plugin: key factory + key exchange + transform,
//! expressed as three traits (`plugin`) plus the one builtin implementation
//! (`builtin`) that backs all of them at once, mirroring the teacher's
//! single `CryptographicBuiltin` implementing every sub-trait.

pub mod builtin;
pub mod plugin;
pub mod types;

pub use builtin::CryptographicBuiltin;
pub use plugin::{CryptoKeyExchange, CryptoKeyFactory, CryptoTransform, EncodeStep};
pub use types::*;

/// The three cryptographic sub-interfaces bundled as the single capability
/// the PCL installs, matching the Security specification's single
/// `Cryptographic` plugin class (sec. 9.5) that exposes all three.
pub trait Cryptographic: CryptoKeyFactory + CryptoKeyExchange + CryptoTransform {}

impl<T: CryptoKeyFactory + CryptoKeyExchange + CryptoTransform> Cryptographic for T {}
