//! Security configuration (§6): the subset of the governance/property
//! model that names which plugin libraries to load and where identity
//! material lives. Deserializable from the same `dds.sec.*` property
//! naming the teacher's `DomainParticipantBuilder` reads off QoS
//! `Property` entries, plus permissions/governance XML via
//! `serde-xml-rs`.

use serde::{Deserialize, Serialize};

/// One `{path, init, finalize}` plugin-library triple
/// (`auth.library.*`, `access_control.library.*`, `crypto.library.*`).
/// `init`/`finalize` name the symbols the teacher's dlopen-based loader
/// would call; this crate's [`super::security_plugins::SecurityPlugins::load`]
/// takes already-constructed plugin objects instead (§9), so these fields
/// are retained for config-file round-tripping but not consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginLibraryConfig {
  pub path: String,
  #[serde(default = "default_init_symbol")]
  pub init: String,
  #[serde(default = "default_finalize_symbol")]
  pub finalize: String,
}

fn default_init_symbol() -> String {
  "init".to_string()
}

fn default_finalize_symbol() -> String {
  "finalize".to_string()
}

/// Filesystem locations backing the builtin plugins' identity/permission
/// material: an identity CA certificate, this participant's certificate
/// and private key (with optional password), a permissions CA, a signed
/// permissions document, and a governance document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentityStoreConfig {
  #[serde(default)]
  pub identity_ca: Option<String>,
  #[serde(default)]
  pub identity_certificate: Option<String>,
  #[serde(default)]
  pub private_key: Option<String>,
  #[serde(default)]
  pub password: Option<String>,
  #[serde(default)]
  pub trusted_ca_directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionsConfig {
  #[serde(default)]
  pub permissions_ca: Option<String>,
  #[serde(default)]
  pub permissions_document: Option<String>,
  #[serde(default)]
  pub governance_document: Option<String>,
}

/// Top-level security configuration for one domain participant. All
/// three plugin-library entries are optional; [`SecurityConfig::is_empty`]
/// lets a caller fall back to the unsecured path rather than constructing
/// a `SecurityPlugins` that will only ever return `NotConfigured`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
  #[serde(default)]
  pub authentication: Option<PluginLibraryConfig>,
  #[serde(default)]
  pub access_control: Option<PluginLibraryConfig>,
  #[serde(default)]
  pub cryptographic: Option<PluginLibraryConfig>,
  #[serde(default)]
  pub identity_store: IdentityStoreConfig,
  #[serde(default)]
  pub permissions: PermissionsConfig,
  /// §3 "remote participant: ... admitted tentatively if config allows
  /// unauthenticated participants."
  #[serde(default)]
  pub allow_unauthenticated_participants: bool,
}

impl SecurityConfig {
  pub fn is_empty(&self) -> bool {
    self.authentication.is_none() && self.access_control.is_none() && self.cryptographic.is_none()
  }

  /// Parses a governance or permissions document from XML, per the
  /// teacher's `security` feature's `serde-xml-rs` dependency.
  pub fn parse_xml_document<T: for<'de> Deserialize<'de>>(xml: &str) -> Result<T, serde_xml_rs::Error> {
    serde_xml_rs::from_str(xml)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_config_reports_empty() {
    assert!(SecurityConfig::default().is_empty());
  }

  #[test]
  fn partial_config_is_not_empty() {
    let config = SecurityConfig {
      authentication: Some(PluginLibraryConfig {
        path: "libauth.so".to_string(),
        init: default_init_symbol(),
        finalize: default_finalize_symbol(),
      }),
      ..Default::default()
    };
    assert!(!config.is_empty());
  }

  #[test]
  fn plugin_library_config_defaults_its_symbol_names_from_xml() {
    let xml = "<PluginLibraryConfig><path>libauth.so</path></PluginLibraryConfig>";
    let config: PluginLibraryConfig = serde_xml_rs::from_str(xml).unwrap();
    assert_eq!(config.path, "libauth.so");
    assert_eq!(config.init, "init");
    assert_eq!(config.finalize, "finalize");
  }
}
