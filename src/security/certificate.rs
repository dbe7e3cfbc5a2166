//! Identity certificate parsing backing the builtin `Authentication`
//! plugin's notion of an "identity" (§3: identity store location,
//! trusted-CA directory). Uses `x509-cert`/`der` to parse DER-encoded
//! certificates, matching the teacher's `security` feature's certificate
//! dependency set.

use chrono::{DateTime, Utc};
use der::Decode;
use x509_cert::Certificate;

use crate::security::types::SecurityException;

/// A parsed identity certificate: just enough to support the checks the
/// builtin authentication plugin needs (subject name for logging/matching,
/// validity window, raw DER to embed in an `IdentityToken`/
/// `AuthenticatedPeerCredentialToken`).
pub struct IdentityCertificate {
  der: Vec<u8>,
  subject: String,
  not_before: DateTime<Utc>,
  not_after: DateTime<Utc>,
}

impl IdentityCertificate {
  pub fn from_der(der: &[u8]) -> Result<Self, SecurityException> {
    let cert =
      Certificate::from_der(der).map_err(|e| SecurityException::new(-1, format!("malformed identity certificate: {e}")))?;
    let subject = cert.tbs_certificate.subject.to_string();
    let not_before = asn1_time_to_chrono(cert.tbs_certificate.validity.not_before.to_unix_duration().as_secs());
    let not_after = asn1_time_to_chrono(cert.tbs_certificate.validity.not_after.to_unix_duration().as_secs());
    Ok(Self {
      der: der.to_vec(),
      subject,
      not_before,
      not_after,
    })
  }

  pub fn subject(&self) -> &str {
    &self.subject
  }

  pub fn der_bytes(&self) -> &[u8] {
    &self.der
  }

  /// True when `at` falls within the certificate's validity window,
  /// matching the Security specification's requirement that an expired
  /// or not-yet-valid identity certificate is rejected outright.
  pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
    at >= self.not_before && at <= self.not_after
  }
}

fn asn1_time_to_chrono(unix_seconds: u64) -> DateTime<Utc> {
  DateTime::from_timestamp(unix_seconds as i64, 0).unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn malformed_der_is_rejected() {
    let garbage = [0u8; 8];
    assert!(IdentityCertificate::from_der(&garbage).is_err());
  }

  #[test]
  fn empty_input_is_rejected() {
    assert!(IdentityCertificate::from_der(&[]).is_err());
  }
}
