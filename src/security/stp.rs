//! Secure Transform Pipeline (§4.5): the wire-facing component. Wraps
//! payloads, submessages, and whole RTPS messages through the crypto plugin
//! on send; on receive, detects the `SEC_PREFIX`/`SEC_BODY`/`SEC_POSTFIX`
//! submessage triplet, dispatches to the right decode operation, and
//! splices the resulting plaintext back so a security-unaware submessage
//! iterator resumes at the next boundary exactly as if the stream had never
//! been protected.
//!
//! The core's only requirement on the surrounding receive loop (§6) is that
//! submessage headers and lengths are delivered honestly; the crypto plugin
//! owns the body layout. This module therefore treats `SEC_PREFIX`/
//! `SEC_POSTFIX` as empty marker frames and lets the entire opaque
//! ciphertext produced by [`super::cryptographic::plugin::CryptoTransform`]
//! live in `SEC_BODY`'s payload -- `preprocess_secure_submessage`'s
//! `secure_prefix_and_body` parameter is the concatenation of the prefix
//! and body payloads, which degenerates to exactly the body payload when
//! the prefix carries nothing, as it does here.

use byteorder::{BigEndian, ByteOrder};

use crate::{
  error::{SecurityError, SecurityResult},
  security::{
    cryptographic::{
      plugin::EncodeStep,
      types::SecureSubmessageCategory,
    },
    security_plugins::SecurityPluginsHandle,
    types::{EndpointCryptoHandle, ParticipantCryptoHandle, SecurityException, INVALID_CRYPTO_RECEIVER_SIGN_CODE},
  },
};

/// Submessage IDs participating in the secure framing (Security
/// specification sec. 7.3.6).
pub const SUBMSG_ID_PAD: u8 = 0x01;
pub const SUBMSG_ID_SEC_BODY: u8 = 0x30;
pub const SUBMSG_ID_SEC_PREFIX: u8 = 0x31;
pub const SUBMSG_ID_SEC_POSTFIX: u8 = 0x32;
pub const SUBMSG_ID_SRTPS_PREFIX: u8 = 0x33;
pub const SUBMSG_ID_SRTPS_POSTFIX: u8 = 0x34;

const SUBMSG_HEADER_LEN: usize = 4;

/// One submessage as the receive loop hands it to this pipeline: an id plus
/// its already-length-delimited payload. `wire_len` is the header (4 bytes:
/// id, flags, big-endian u16 length) plus the payload, matching the "honest
/// headers and lengths" contract the surrounding transport owes this
/// module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSubmessage {
  pub id: u8,
  pub payload: Vec<u8>,
}

impl RawSubmessage {
  pub fn new(id: u8, payload: Vec<u8>) -> Self {
    Self { id, payload }
  }

  pub fn pad(payload_len: usize) -> Self {
    Self {
      id: SUBMSG_ID_PAD,
      payload: vec![0u8; payload_len],
    }
  }

  pub fn wire_len(&self) -> usize {
    SUBMSG_HEADER_LEN + self.payload.len()
  }

  pub fn to_bytes(&self) -> Vec<u8> {
    let mut out = Vec::with_capacity(self.wire_len());
    out.push(self.id);
    out.push(0);
    let mut len_field = [0u8; 2];
    BigEndian::write_u16(&mut len_field, self.payload.len() as u16);
    out.extend_from_slice(&len_field);
    out.extend_from_slice(&self.payload);
    out
  }

  /// Parse one submessage off the front of `buf`, returning it plus the
  /// unconsumed remainder.
  pub fn parse_one(buf: &[u8]) -> Option<(RawSubmessage, &[u8])> {
    if buf.len() < SUBMSG_HEADER_LEN {
      return None;
    }
    let id = buf[0];
    let len = BigEndian::read_u16(&buf[2..4]) as usize;
    if buf.len() < SUBMSG_HEADER_LEN + len {
      return None;
    }
    let payload = buf[SUBMSG_HEADER_LEN..SUBMSG_HEADER_LEN + len].to_vec();
    Some((RawSubmessage { id, payload }, &buf[SUBMSG_HEADER_LEN + len..]))
  }

  pub fn parse_stream(mut buf: &[u8]) -> Vec<RawSubmessage> {
    let mut out = Vec::new();
    while let Some((sm, rest)) = Self::parse_one(buf) {
      out.push(sm);
      buf = rest;
    }
    out
  }
}

pub fn submessages_to_bytes(submessages: &[RawSubmessage]) -> Vec<u8> {
  let mut out = Vec::new();
  for sm in submessages {
    out.extend_from_slice(&sm.to_bytes());
  }
  out
}

/// Drives the iterate-on-index encode protocol common to
/// `encode_datawriter_submessage`/`encode_datareader_submessage`/
/// `encode_rtps_message`: the crypto plugin returns `next_index` to request
/// another call for a subgroup, receiving `None` as the plain buffer on
/// every call after the first. Terminates when `next_index` is `None`.
/// Empty handle lists abort before the first call.
fn drive_iterate(
  plain: &[u8],
  handle_count: usize,
  mut call: impl FnMut(Option<&[u8]>, usize) -> Result<EncodeStep, SecurityException>,
) -> Result<Vec<Vec<u8>>, SecurityException> {
  if handle_count == 0 {
    return Err(SecurityException::new(-1, "encode aborted: empty destination handle list"));
  }
  let mut ciphertexts = Vec::new();
  let mut index = 0usize;
  let mut plain_arg = Some(plain);
  loop {
    let step = call(plain_arg, index)?;
    ciphertexts.push(step.ciphertext);
    plain_arg = None;
    match step.next_index {
      Some(next) => index = next,
      None => break,
    }
  }
  Ok(ciphertexts)
}

fn wrap_triplet(ciphertext: Vec<u8>) -> [RawSubmessage; 3] {
  [
    RawSubmessage::new(SUBMSG_ID_SEC_PREFIX, Vec::new()),
    RawSubmessage::new(SUBMSG_ID_SEC_BODY, ciphertext),
    RawSubmessage::new(SUBMSG_ID_SEC_POSTFIX, Vec::new()),
  ]
}

fn map_decode_err(ctx: &str, e: SecurityException) -> SecurityError {
  log::warn!("{ctx}: {e}");
  SecurityError::SubmessageProtectionViolation(format!("{ctx}: {e}"))
}

/// Splices `decoded` over the triplet span: `decoded` itself, followed by
/// one `PAD` submessage sized to absorb whatever span remains so the total
/// byte length matches `total_span` exactly.
fn pad_out_span(decoded: RawSubmessage, total_span: usize) -> Vec<RawSubmessage> {
  let used = decoded.wire_len();
  let remaining = total_span - used;
  if remaining == 0 {
    vec![decoded]
  } else if remaining >= SUBMSG_HEADER_LEN {
    vec![decoded, RawSubmessage::pad(remaining - SUBMSG_HEADER_LEN)]
  } else {
    // Can't fit a pad header in the leftover space; fall back to padding
    // the whole span instead of delivering a truncated decoded submessage.
    vec![pad_whole_span(total_span)]
  }
}

/// One `PAD` submessage spanning the whole triplet -- used when decode
/// fails or the decoded submessage didn't fit its own triplet span.
fn pad_whole_span(total_span: usize) -> RawSubmessage {
  if total_span >= SUBMSG_HEADER_LEN {
    RawSubmessage::pad(total_span - SUBMSG_HEADER_LEN)
  } else {
    RawSubmessage::pad(0)
  }
}

pub struct SecureTransformPipeline {
  plugins: SecurityPluginsHandle,
}

impl SecureTransformPipeline {
  pub fn new(plugins: SecurityPluginsHandle) -> Self {
    Self { plugins }
  }

  /// §4.5 "encode serialized payload": requires writer-is-payload-protected,
  /// a pass-through otherwise.
  pub fn encode_serialized_payload(
    &self,
    payload_protected: bool,
    plain_payload: &[u8],
    writer_handle: EndpointCryptoHandle,
  ) -> SecurityResult<Vec<u8>> {
    if !payload_protected {
      return Ok(plain_payload.to_vec());
    }
    let crypto = self.plugins.cryptographic()?;
    crypto
      .encode_serialized_payload(plain_payload, writer_handle)
      .map_err(|e| map_decode_err("encode_serialized_payload", e))
  }

  pub fn decode_serialized_payload(
    &self,
    encoded_payload: &[u8],
    reader_handle: EndpointCryptoHandle,
    writer_handle: EndpointCryptoHandle,
  ) -> SecurityResult<Vec<u8>> {
    let crypto = self.plugins.cryptographic()?;
    crypto
      .decode_serialized_payload(encoded_payload, reader_handle, writer_handle)
      .map_err(|e| map_decode_err("decode_serialized_payload", e))
  }

  /// §4.5 "encode reader submessage": `reader_handles` is the caller's
  /// already-snapshotted list of matched writer crypto handles (optionally
  /// filtered by destination GUID prefix before the call). Returns the
  /// `SEC_PREFIX`/`SEC_BODY`/`SEC_POSTFIX` triplet per iteration.
  pub fn encode_reader_submessage(
    &self,
    plain_submessage: &[u8],
    reader_handle: EndpointCryptoHandle,
    writer_handles: &[EndpointCryptoHandle],
  ) -> SecurityResult<Vec<[RawSubmessage; 3]>> {
    let crypto = self.plugins.cryptographic()?;
    let ciphertexts = drive_iterate(plain_submessage, writer_handles.len(), |plain, start_index| {
      crypto.encode_datareader_submessage(plain, reader_handle, writer_handles, start_index)
    })
    .map_err(|e| map_decode_err("encode_datareader_submessage", e))?;
    Ok(ciphertexts.into_iter().map(wrap_triplet).collect())
  }

  /// §4.5 "encode writer submessage", symmetric with roles swapped.
  pub fn encode_writer_submessage(
    &self,
    plain_submessage: &[u8],
    writer_handle: EndpointCryptoHandle,
    reader_handles: &[EndpointCryptoHandle],
  ) -> SecurityResult<Vec<[RawSubmessage; 3]>> {
    let crypto = self.plugins.cryptographic()?;
    let ciphertexts = drive_iterate(plain_submessage, reader_handles.len(), |plain, start_index| {
      crypto.encode_datawriter_submessage(plain, writer_handle, reader_handles, start_index)
    })
    .map_err(|e| map_decode_err("encode_datawriter_submessage", e))?;
    Ok(ciphertexts.into_iter().map(wrap_triplet).collect())
  }

  /// §4.5 "encode RTPS message": `receiver_handles` is the caller's
  /// snapshot of destination participant crypto handles -- for
  /// `destination: None` (broadcast to every authenticated remote) the
  /// caller is expected to have taken that snapshot under
  /// [`super::pss::ParticipantSecurityState::authenticated_remotes_for`]'s
  /// read lock before calling in (§9 design note).
  pub fn encode_rtps_message(
    &self,
    plain_message: &[u8],
    sender_handle: ParticipantCryptoHandle,
    receiver_handles: &[ParticipantCryptoHandle],
  ) -> SecurityResult<Vec<Vec<u8>>> {
    let crypto = self.plugins.cryptographic()?;
    drive_iterate(plain_message, receiver_handles.len(), |plain, start_index| {
      crypto.encode_rtps_message(plain, sender_handle, receiver_handles, start_index)
    })
    .map_err(|e| map_decode_err("encode_rtps_message", e))
  }

  /// §4.5 RTPS-message decode: authentication error code
  /// `INVALID_CRYPTO_RECEIVER_SIGN_CODE` means "try the next candidate" --
  /// a single remote participant may map to several local participants.
  /// Other codes are fatal for this receive event.
  pub fn decode_rtps_message(
    &self,
    encoded_message: &[u8],
    receiver_handle: ParticipantCryptoHandle,
    candidate_sender_handles: &[ParticipantCryptoHandle],
  ) -> SecurityResult<Vec<u8>> {
    let crypto = self.plugins.cryptographic()?;
    let mut last_err = None;
    for &sender_handle in candidate_sender_handles {
      match crypto.decode_rtps_message(encoded_message, receiver_handle, sender_handle) {
        Ok(plain) => return Ok(plain),
        Err(e) if e.code == INVALID_CRYPTO_RECEIVER_SIGN_CODE => {
          last_err = Some(e);
          continue;
        }
        Err(e) => return Err(map_decode_err("decode_rtps_message", e)),
      }
    }
    Err(match last_err {
      Some(e) => map_decode_err("decode_rtps_message: no candidate sender accepted", e),
      None => SecurityError::SubmessageProtectionViolation("decode_rtps_message: no candidate senders".to_string()),
    })
  }

  /// Decodes one `SEC_PREFIX`/`SEC_BODY`(-or-plaintext)/`SEC_POSTFIX`
  /// triplet starting at `submessages[start]`. On success returns the
  /// decoded submessage (re-parsed from its own flattened header, since the
  /// encode side flattened the original submessage with its trailing
  /// payload before handing it to the crypto plugin) plus a trailing `PAD`
  /// submessage sized to make the total span identical to the triplet's,
  /// so the caller's submessage iterator -- unaware of security -- resumes
  /// at the correct next boundary. On failure the whole triplet becomes one
  /// `PAD`: a signature-failed plaintext is never delivered.
  pub fn decode_secure_submessage_triplet(
    &self,
    submessages: &[RawSubmessage],
    start: usize,
    receiver_participant: ParticipantCryptoHandle,
    sender_participant: ParticipantCryptoHandle,
  ) -> SecurityResult<(Vec<RawSubmessage>, usize)> {
    if submessages.len() < start + 3 || submessages[start].id != SUBMSG_ID_SEC_PREFIX {
      return Err(SecurityError::SubmessageProtectionViolation(
        "decode_secure_submessage_triplet: not a SEC_PREFIX-led triplet".to_string(),
      ));
    }
    let prefix = &submessages[start];
    let body = &submessages[start + 1];
    let postfix = &submessages[start + 2];
    let total_span: usize = prefix.wire_len() + body.wire_len() + postfix.wire_len();

    let decode_result = self.try_decode_triplet(prefix, body, receiver_participant, sender_participant);

    let spliced = match decode_result {
      Ok(plain) => match RawSubmessage::parse_one(&plain) {
        Some((decoded, _rest)) if decoded.wire_len() <= total_span => pad_out_span(decoded, total_span),
        _ => {
          log::warn!("decode_secure_submessage_triplet: decoded submessage did not fit its triplet span, padding");
          vec![pad_whole_span(total_span)]
        }
      },
      Err(e) => {
        log::warn!("decode_secure_submessage_triplet: {e}, padding span");
        vec![pad_whole_span(total_span)]
      }
    };
    Ok((spliced, 3))
  }

  fn try_decode_triplet(
    &self,
    prefix: &RawSubmessage,
    body: &RawSubmessage,
    receiver_participant: ParticipantCryptoHandle,
    sender_participant: ParticipantCryptoHandle,
  ) -> SecurityResult<Vec<u8>> {
    let crypto = self.plugins.cryptographic()?;
    let mut secure_prefix_and_body = Vec::with_capacity(prefix.payload.len() + body.payload.len());
    secure_prefix_and_body.extend_from_slice(&prefix.payload);
    secure_prefix_and_body.extend_from_slice(&body.payload);

    let (category, sender_endpoint, receiver_endpoint) = crypto
      .preprocess_secure_submessage(&secure_prefix_and_body, receiver_participant, sender_participant)
      .map_err(|e| map_decode_err("preprocess_secure_submessage", e))?;

    match category {
      SecureSubmessageCategory::DatawriterSubmessage => crypto
        .decode_datawriter_submessage(&secure_prefix_and_body, receiver_endpoint, sender_endpoint)
        .map_err(|e| map_decode_err("decode_datawriter_submessage", e)),
      SecureSubmessageCategory::DatareaderSubmessage => crypto
        .decode_datareader_submessage(&secure_prefix_and_body, sender_endpoint, receiver_endpoint)
        .map_err(|e| map_decode_err("decode_datareader_submessage", e)),
      SecureSubmessageCategory::InfoSubmessage => Err(SecurityError::SubmessageProtectionViolation(
        "decode_secure_submessage_triplet: INFO_SUBMESSAGE category has no defined decode path".to_string(),
      )),
    }
  }
}

/// §4.5 validation invariant: if the endpoint demands submessage
/// protection, the immediately preceding submessage in the receive stream
/// must have been `SEC_PREFIX`. Receiving the protected submessage ID
/// directly (not via the triplet) is an authentication failure, not a
/// silent pass-through.
pub fn validate_submessage_decoding(
  requires_submessage_protection: bool,
  preceding_submessage_id: Option<u8>,
) -> SecurityResult<()> {
  if requires_submessage_protection && preceding_submessage_id != Some(SUBMSG_ID_SEC_PREFIX) {
    return Err(SecurityError::SubmessageProtectionViolation(
      "protected submessage received outside a SEC_PREFIX triplet".to_string(),
    ));
  }
  Ok(())
}

/// §4.5 validation invariant for the RTPS-message level: if the remote is
/// RTPS-protected, the whole message must have been decoded at ingress; a
/// plaintext ingress is dropped.
pub fn validate_message_decoding(requires_rtps_protection: bool, message_was_decoded: bool) -> SecurityResult<()> {
  if requires_rtps_protection && !message_was_decoded {
    return Err(SecurityError::SubmessageProtectionViolation(
      "RTPS-protected remote sent a plaintext message".to_string(),
    ));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::security::{
    access_control::{builtin::AccessControlBuiltin, types::EndpointSecurityAttributes},
    authentication::builtin::AuthenticationBuiltin,
    cryptographic::{builtin::CryptographicBuiltin, plugin::CryptoKeyExchange},
    security_plugins::SecurityPlugins,
    types::{SecurityAttributes, ATTR_FLAG_PAYLOAD_PROTECTED, ATTR_FLAG_SUBMESSAGE_PROTECTED, ATTR_FLAG_VALID},
  };
  use std::sync::Arc;

  fn protected_attrs() -> EndpointSecurityAttributes {
    EndpointSecurityAttributes {
      attributes: SecurityAttributes {
        security_attributes: ATTR_FLAG_VALID | ATTR_FLAG_PAYLOAD_PROTECTED | ATTR_FLAG_SUBMESSAGE_PROTECTED,
        plugin_security_attributes: 0,
      },
      is_key_protected: false,
    }
  }

  fn make_pipeline_with_writer_reader() -> (
    SecureTransformPipeline,
    SecurityPluginsHandle,
    ParticipantCryptoHandle,
    EndpointCryptoHandle,
    EndpointCryptoHandle,
  ) {
    let mut plugins = SecurityPlugins::new();
    plugins.load(
      Arc::new(AuthenticationBuiltin::default()),
      Arc::new(AccessControlBuiltin::default()),
      Arc::new(CryptographicBuiltin::default()),
    );
    let handle = SecurityPluginsHandle::new(plugins);
    let crypto = handle.cryptographic().unwrap();
    let participant = crypto.register_local_participant(Default::default()).unwrap();
    let writer = crypto.register_local_datawriter(participant, protected_attrs()).unwrap();
    let reader = crypto.register_local_datareader(participant, protected_attrs()).unwrap();
    let tokens = crypto.create_local_datawriter_crypto_tokens(writer, reader).unwrap();
    crypto.set_remote_datawriter_crypto_tokens(reader, writer, tokens).unwrap();
    (SecureTransformPipeline::new(handle.clone()), handle, participant, writer, reader)
  }

  #[test]
  fn submessage_round_trips_through_the_wire_frame() {
    let (stp, _plugins, participant, writer, reader) = make_pipeline_with_writer_reader();

    let mut plain = vec![0x15u8, 0, 0, 4];
    plain.extend_from_slice(b"DATA");
    let triplets = stp.encode_writer_submessage(&plain, writer, &[reader]).unwrap();
    assert_eq!(triplets.len(), 1);
    let [prefix, body, postfix] = &triplets[0];
    assert_eq!(prefix.id, SUBMSG_ID_SEC_PREFIX);
    assert_eq!(body.id, SUBMSG_ID_SEC_BODY);
    assert_eq!(postfix.id, SUBMSG_ID_SEC_POSTFIX);

    let submessages = vec![prefix.clone(), body.clone(), postfix.clone()];
    let (spliced, consumed) = stp
      .decode_secure_submessage_triplet(&submessages, 0, participant, participant)
      .unwrap();
    assert_eq!(consumed, 3);
    assert_eq!(spliced[0].id, 0x15);
    assert_eq!(spliced[0].payload, b"DATA");
    let total_span: usize = submessages.iter().map(RawSubmessage::wire_len).sum();
    let spliced_span: usize = spliced.iter().map(RawSubmessage::wire_len).sum();
    assert_eq!(spliced_span, total_span);
  }

  // Exercises the `log::warn!` path in `try_decode_triplet`'s caller; run
  // under `test-log` so the warning is visible alongside the assertion
  // instead of only in the padded-output side effect.
  #[test_log::test]
  fn tampered_body_pads_instead_of_delivering_plaintext() {
    let (stp, _plugins, participant, writer, reader) = make_pipeline_with_writer_reader();
    let mut plain = vec![0x15u8, 0, 0, 4];
    plain.extend_from_slice(b"DATA");
    let triplets = stp.encode_writer_submessage(&plain, writer, &[reader]).unwrap();
    let [prefix, mut body, postfix] = triplets.into_iter().next().unwrap();
    let last = body.payload.len() - 1;
    body.payload[last] ^= 0xff;

    let submessages = vec![prefix, body, postfix];
    let (spliced, consumed) = stp
      .decode_secure_submessage_triplet(&submessages, 0, participant, participant)
      .unwrap();
    assert_eq!(consumed, 3);
    assert_eq!(spliced[0].id, SUBMSG_ID_PAD);
  }

  #[test]
  fn encode_with_empty_handle_list_aborts() {
    let (stp, _plugins, _participant, writer, _reader) = make_pipeline_with_writer_reader();
    let err = stp.encode_writer_submessage(b"payload", writer, &[]).unwrap_err();
    assert!(matches!(err, SecurityError::SubmessageProtectionViolation(_)));
  }

  #[test]
  fn validate_submessage_decoding_rejects_unescorted_protected_submessage() {
    assert!(validate_submessage_decoding(true, Some(SUBMSG_ID_SEC_PREFIX)).is_ok());
    assert!(validate_submessage_decoding(true, Some(0x15)).is_err());
    assert!(validate_submessage_decoding(false, None).is_ok());
  }

  #[test]
  fn validate_message_decoding_rejects_plaintext_from_rtps_protected_remote() {
    assert!(validate_message_decoding(true, true).is_ok());
    assert!(validate_message_decoding(true, false).is_err());
    assert!(validate_message_decoding(false, false).is_ok());
  }
}
