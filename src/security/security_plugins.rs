//! Plugin Capability Layer (§4.1): holds the three injected capabilities
//! behind one lock and a tri-state "loaded" flag. Every plugin call in the
//! crate funnels through a `SecurityPluginsHandle`, matching the teacher's
//! own `SecurityPluginsHandle`/`SecurityPlugins` split -- an `Arc<Mutex<_>>`
//! wrapper exposing a `get_plugins()` guard accessor so the lock is never
//! held across a call into a `Box<dyn Trait>` plugin method that might
//! itself try to re-lock.

use std::sync::{Arc, Mutex};

use crate::{
  error::{SecurityError, SecurityResult},
  security::{access_control::plugin::AccessControl, authentication::plugin::Authentication, Cryptographic},
};

/// The three capability slots, held as `Arc<dyn Trait>` rather than `Box` so
/// a caller can clone the reference out from under the lock and then call
/// into the plugin with no lock held (§5: "no lock may be held across a
/// plugin call except crypto-factory register/unregister"). `load` installs
/// all three together -- partial configuration is rejected by the Security
/// specification and by this crate, matching the all-or-nothing discipline
/// of the teacher's own `SecurityPluginsHandle::new`.
pub struct SecurityPlugins {
  authentication: Option<Arc<dyn Authentication>>,
  access_control: Option<Arc<dyn AccessControl>>,
  cryptographic: Option<Arc<dyn Cryptographic>>,
}

impl SecurityPlugins {
  /// Unloaded PCL: every operation that requires a plugin returns
  /// `NotConfigured` until `load` is called.
  pub fn new() -> Self {
    Self {
      authentication: None,
      access_control: None,
      cryptographic: None,
    }
  }

  /// §4.1 "load(config)": in this crate, installing three already
  /// constructed plugin objects rather than `dlopen`-ing a shared library
  /// (§9 Open Question resolution, see DESIGN.md).
  pub fn load(
    &mut self,
    authentication: Arc<dyn Authentication>,
    access_control: Arc<dyn AccessControl>,
    cryptographic: Arc<dyn Cryptographic>,
  ) {
    self.authentication = Some(authentication);
    self.access_control = Some(access_control);
    self.cryptographic = Some(cryptographic);
  }

  /// §4.1 "unload(): calls the three finalize symbols in reverse order" --
  /// realized here as dropping crypto, then access-control, then
  /// authentication, the reverse of `load`'s install order.
  pub fn unload(&mut self) {
    self.cryptographic = None;
    self.access_control = None;
    self.authentication = None;
  }

  pub fn is_loaded(&self) -> bool {
    self.authentication.is_some() && self.access_control.is_some() && self.cryptographic.is_some()
  }

  pub fn authentication(&self) -> SecurityResult<Arc<dyn Authentication>> {
    self
      .authentication
      .clone()
      .ok_or_else(|| SecurityError::NotConfigured("authentication plugin not loaded".to_string()))
  }

  pub fn access_control(&self) -> SecurityResult<Arc<dyn AccessControl>> {
    self
      .access_control
      .clone()
      .ok_or_else(|| SecurityError::NotConfigured("access control plugin not loaded".to_string()))
  }

  pub fn cryptographic(&self) -> SecurityResult<Arc<dyn Cryptographic>> {
    self
      .cryptographic
      .clone()
      .ok_or_else(|| SecurityError::NotConfigured("cryptographic plugin not loaded".to_string()))
  }
}

impl Default for SecurityPlugins {
  fn default() -> Self {
    Self::new()
  }
}

/// Shared handle to one domain's plugin set. Cloned freely; all clones see
/// the same underlying plugins. The lock guards only the install/swap of
/// the three `Arc`s, never a plugin call itself.
#[derive(Clone)]
pub struct SecurityPluginsHandle(Arc<Mutex<SecurityPlugins>>);

impl SecurityPluginsHandle {
  pub fn new(plugins: SecurityPlugins) -> Self {
    Self(Arc::new(Mutex::new(plugins)))
  }

  pub fn load(
    &self,
    authentication: Arc<dyn Authentication>,
    access_control: Arc<dyn AccessControl>,
    cryptographic: Arc<dyn Cryptographic>,
  ) {
    self.0.lock().unwrap().load(authentication, access_control, cryptographic);
  }

  pub fn unload(&self) {
    self.0.lock().unwrap().unload();
  }

  pub fn is_loaded(&self) -> bool {
    self.0.lock().unwrap().is_loaded()
  }

  pub fn authentication(&self) -> SecurityResult<Arc<dyn Authentication>> {
    self.0.lock().unwrap().authentication()
  }

  pub fn access_control(&self) -> SecurityResult<Arc<dyn AccessControl>> {
    self.0.lock().unwrap().access_control()
  }

  pub fn cryptographic(&self) -> SecurityResult<Arc<dyn Cryptographic>> {
    self.0.lock().unwrap().cryptographic()
  }
}

impl Default for SecurityPluginsHandle {
  fn default() -> Self {
    Self::new(SecurityPlugins::new())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::security::{access_control::AccessControlBuiltin, authentication::AuthenticationBuiltin, CryptographicBuiltin};

  #[test]
  fn unloaded_plugins_report_not_configured() {
    let plugins = SecurityPlugins::new();
    assert!(!plugins.is_loaded());
    assert!(matches!(
      plugins.authentication(),
      Err(SecurityError::NotConfigured(_))
    ));
  }

  #[test]
  fn load_then_unload_round_trips_loaded_flag() {
    let mut plugins = SecurityPlugins::new();
    plugins.load(
      Arc::new(AuthenticationBuiltin::default()),
      Arc::new(AccessControlBuiltin::default()),
      Arc::new(CryptographicBuiltin::default()),
    );
    assert!(plugins.is_loaded());
    assert!(plugins.authentication().is_ok());
    plugins.unload();
    assert!(!plugins.is_loaded());
  }

  #[test]
  fn handle_clones_share_state() {
    let handle = SecurityPluginsHandle::default();
    let clone = handle.clone();
    clone.load(
      Arc::new(AuthenticationBuiltin::default()),
      Arc::new(AccessControlBuiltin::default()),
      Arc::new(CryptographicBuiltin::default()),
    );
    assert!(handle.is_loaded());
  }
}
