//! `CryptoTransform` for the builtin plugin: the wire-level codec behind
//! STP (§4.5). Submessage/message framing is
//! `header(16) || receiver_mac_count:u32-be(4) || body(N) || common_mac(16)
//! || receiver_mac_count * (handle_suffix(4) || mac(16))`, matching
//! `BuiltinCryptoHeader`/`BuiltinCryptoFooter` from
//! [`super::super::types`]. This builtin never iterates an
//! encode across calls (`EncodeStep::next_index` is always `None`): it
//! processes the whole destination-handle list in one pass.

use super::{key_material, CryptographicBuiltin};
use crate::security::{
  cryptographic::{
    plugin::{CryptoTransform, EncodeStep},
    types::{BuiltinCryptoHeader, BuiltinCryptoTransformationKind, ReceiverSpecificMac, SecureSubmessageCategory},
  },
  types::{EndpointCryptoHandle, ParticipantCryptoHandle, SecurityException},
};

const HEADER_LEN: usize = BuiltinCryptoHeader::WIRE_LEN;
const COUNT_LEN: usize = 4;
const MAC_LEN: usize = 16;
const RECEIVER_ENTRY_LEN: usize = 4 + MAC_LEN;

fn assemble(header: BuiltinCryptoHeader, body: &[u8], common_mac: [u8; MAC_LEN], receivers: &[ReceiverSpecificMac]) -> Vec<u8> {
  let mut out = Vec::with_capacity(HEADER_LEN + COUNT_LEN + body.len() + MAC_LEN + receivers.len() * RECEIVER_ENTRY_LEN);
  out.extend_from_slice(&header.to_bytes());
  out.extend_from_slice(&(receivers.len() as u32).to_be_bytes());
  out.extend_from_slice(body);
  out.extend_from_slice(&common_mac);
  for r in receivers {
    out.extend_from_slice(&r.receiver_handle_suffix);
    out.extend_from_slice(&r.mac);
  }
  out
}

struct Parsed<'a> {
  header: BuiltinCryptoHeader,
  body: &'a [u8],
  common_mac: [u8; MAC_LEN],
  receivers: Vec<ReceiverSpecificMac>,
}

fn parse(buf: &[u8]) -> Result<Parsed<'_>, SecurityException> {
  if buf.len() < HEADER_LEN + COUNT_LEN + MAC_LEN {
    return Err(SecurityException::new(-1, "secure submessage shorter than fixed framing"));
  }
  let header = BuiltinCryptoHeader::from_bytes(&buf[..HEADER_LEN])
    .ok_or_else(|| SecurityException::new(-1, "malformed crypto header"))?;
  let count = u32::from_be_bytes(buf[HEADER_LEN..HEADER_LEN + COUNT_LEN].try_into().unwrap()) as usize;
  let footer_len = MAC_LEN + count * RECEIVER_ENTRY_LEN;
  let fixed_len = HEADER_LEN + COUNT_LEN + footer_len;
  if buf.len() < fixed_len {
    return Err(SecurityException::new(-1, "secure submessage shorter than declared footer"));
  }
  let body_end = buf.len() - footer_len;
  let body = &buf[HEADER_LEN + COUNT_LEN..body_end];
  let mut common_mac = [0u8; MAC_LEN];
  common_mac.copy_from_slice(&buf[body_end..body_end + MAC_LEN]);
  let mut receivers = Vec::with_capacity(count);
  let mut cursor = body_end + MAC_LEN;
  for _ in 0..count {
    let mut suffix = [0u8; 4];
    suffix.copy_from_slice(&buf[cursor..cursor + 4]);
    let mut mac = [0u8; MAC_LEN];
    mac.copy_from_slice(&buf[cursor + 4..cursor + 4 + MAC_LEN]);
    receivers.push(ReceiverSpecificMac {
      receiver_handle_suffix: suffix,
      mac,
    });
    cursor += RECEIVER_ENTRY_LEN;
  }
  Ok(Parsed {
    header,
    body,
    common_mac,
    receivers,
  })
}

/// Seal `plain` under `km` with the given `session_id`/`iv_suffix`, split
/// into body and the trailing 16-byte tag that becomes the common MAC.
fn seal_split(
  km: &crate::security::cryptographic::types::KeyMaterial,
  session_id: u32,
  iv_suffix: u64,
  plain: &[u8],
) -> Result<(Vec<u8>, [u8; MAC_LEN]), SecurityException> {
  let sealed = key_material::seal(km, session_id, iv_suffix, plain)?;
  if sealed.len() < MAC_LEN {
    return Err(SecurityException::new(-1, "seal produced undersized output"));
  }
  let split_at = sealed.len() - MAC_LEN;
  let mut mac = [0u8; MAC_LEN];
  mac.copy_from_slice(&sealed[split_at..]);
  Ok((sealed[..split_at].to_vec(), mac))
}

fn open_joined(
  km: &crate::security::cryptographic::types::KeyMaterial,
  session_id: u32,
  iv_suffix: u64,
  body: &[u8],
  common_mac: [u8; MAC_LEN],
) -> Result<Vec<u8>, SecurityException> {
  let mut sealed = Vec::with_capacity(body.len() + MAC_LEN);
  sealed.extend_from_slice(body);
  sealed.extend_from_slice(&common_mac);
  key_material::open(km, session_id, iv_suffix, &sealed)
}

impl CryptoTransform for CryptographicBuiltin {
  fn encode_serialized_payload(
    &self,
    plain_payload: &[u8],
    writer_handle: EndpointCryptoHandle,
  ) -> Result<Vec<u8>, SecurityException> {
    let km = self
      .endpoint_keys
      .lock()
      .unwrap()
      .get(&writer_handle)
      .cloned()
      .ok_or_else(|| SecurityException::new(-1, "unknown writer crypto handle"))?;
    if km.transformation_kind == BuiltinCryptoTransformationKind::None {
      return Ok(plain_payload.to_vec());
    }
    let iv_suffix = self.next_iv_suffix(writer_handle.0);
    let header = BuiltinCryptoHeader {
      transformation_kind: km.transformation_kind,
      session_id: km.sender_key_id,
      init_vector_suffix: iv_suffix,
    };
    let sealed = key_material::seal(&km, header.session_id, header.init_vector_suffix, plain_payload)?;
    let mut out = header.to_bytes().to_vec();
    out.extend_from_slice(&sealed);
    Ok(out)
  }

  fn decode_serialized_payload(
    &self,
    encoded_payload: &[u8],
    reader_handle: EndpointCryptoHandle,
    writer_handle: EndpointCryptoHandle,
  ) -> Result<Vec<u8>, SecurityException> {
    if encoded_payload.len() < HEADER_LEN {
      return Err(SecurityException::new(-1, "encoded payload shorter than header"));
    }
    let header = BuiltinCryptoHeader::from_bytes(&encoded_payload[..HEADER_LEN])
      .ok_or_else(|| SecurityException::new(-1, "malformed crypto header"))?;
    let rest = &encoded_payload[HEADER_LEN..];
    if header.transformation_kind == BuiltinCryptoTransformationKind::None {
      return Ok(rest.to_vec());
    }
    let km = self
      .remote_endpoint_keys
      .lock()
      .unwrap()
      .get(&(reader_handle, writer_handle))
      .cloned()
      .ok_or_else(|| SecurityException::new(-1, "no crypto tokens registered for this writer"))?;
    key_material::open(&km, header.session_id, header.init_vector_suffix, rest)
  }

  fn encode_datawriter_submessage(
    &self,
    plain_submessage: Option<&[u8]>,
    writer_handle: EndpointCryptoHandle,
    reader_handles: &[EndpointCryptoHandle],
    start_index: usize,
  ) -> Result<EncodeStep, SecurityException> {
    let plain = require_first_call(plain_submessage, start_index)?;
    let km = self
      .endpoint_keys
      .lock()
      .unwrap()
      .get(&writer_handle)
      .cloned()
      .ok_or_else(|| SecurityException::new(-1, "unknown writer crypto handle"))?;
    let iv_suffix = self.next_iv_suffix(writer_handle.0);
    let header = BuiltinCryptoHeader {
      transformation_kind: km.transformation_kind,
      session_id: km.sender_key_id,
      init_vector_suffix: iv_suffix,
    };
    let (body, common_mac) = seal_split(&km, header.session_id, header.init_vector_suffix, plain)?;
    // No distinct receiver-specific keys are modeled: every matched reader
    // authenticates against the shared common MAC.
    let receivers: Vec<ReceiverSpecificMac> = reader_handles
      .iter()
      .map(|h| ReceiverSpecificMac {
        receiver_handle_suffix: (h.0 as u32).to_be_bytes(),
        mac: common_mac,
      })
      .collect();
    let wire = assemble(header, &body, common_mac, &receivers);
    Ok(EncodeStep {
      ciphertext: wire,
      next_index: None,
    })
  }

  fn encode_datareader_submessage(
    &self,
    plain_submessage: Option<&[u8]>,
    reader_handle: EndpointCryptoHandle,
    writer_handles: &[EndpointCryptoHandle],
    start_index: usize,
  ) -> Result<EncodeStep, SecurityException> {
    let plain = require_first_call(plain_submessage, start_index)?;
    let km = self
      .endpoint_keys
      .lock()
      .unwrap()
      .get(&reader_handle)
      .cloned()
      .ok_or_else(|| SecurityException::new(-1, "unknown reader crypto handle"))?;
    let iv_suffix = self.next_iv_suffix(reader_handle.0);
    let header = BuiltinCryptoHeader {
      transformation_kind: km.transformation_kind,
      session_id: km.sender_key_id,
      init_vector_suffix: iv_suffix,
    };
    let (body, common_mac) = seal_split(&km, header.session_id, header.init_vector_suffix, plain)?;
    let receivers: Vec<ReceiverSpecificMac> = writer_handles
      .iter()
      .map(|h| ReceiverSpecificMac {
        receiver_handle_suffix: (h.0 as u32).to_be_bytes(),
        mac: common_mac,
      })
      .collect();
    let wire = assemble(header, &body, common_mac, &receivers);
    Ok(EncodeStep {
      ciphertext: wire,
      next_index: None,
    })
  }

  fn encode_rtps_message(
    &self,
    plain_message: Option<&[u8]>,
    sender_handle: ParticipantCryptoHandle,
    receiver_handles: &[ParticipantCryptoHandle],
    start_index: usize,
  ) -> Result<EncodeStep, SecurityException> {
    let plain = require_first_call(plain_message, start_index)?;
    let km = self
      .participant_keys
      .lock()
      .unwrap()
      .get(&sender_handle)
      .cloned()
      .ok_or_else(|| SecurityException::new(-1, "unknown sender participant crypto handle"))?;
    let iv_suffix = self.next_iv_suffix(sender_handle.0);
    let header = BuiltinCryptoHeader {
      transformation_kind: km.transformation_kind,
      session_id: km.sender_key_id,
      init_vector_suffix: iv_suffix,
    };
    let (body, common_mac) = seal_split(&km, header.session_id, header.init_vector_suffix, plain)?;
    let receivers: Vec<ReceiverSpecificMac> = receiver_handles
      .iter()
      .map(|h| ReceiverSpecificMac {
        receiver_handle_suffix: (h.0 as u32).to_be_bytes(),
        mac: common_mac,
      })
      .collect();
    let wire = assemble(header, &body, common_mac, &receivers);
    Ok(EncodeStep {
      ciphertext: wire,
      next_index: None,
    })
  }

  fn decode_rtps_message(
    &self,
    encoded_message: &[u8],
    receiver_handle: ParticipantCryptoHandle,
    sender_handle: ParticipantCryptoHandle,
  ) -> Result<Vec<u8>, SecurityException> {
    let parsed = parse(encoded_message)?;
    let km = self
      .remote_participant_keys
      .lock()
      .unwrap()
      .get(&(receiver_handle, sender_handle))
      .cloned()
      .ok_or_else(|| SecurityException::new(-1, "no crypto tokens registered for this sender participant"))?;
    open_joined(
      &km,
      parsed.header.session_id,
      parsed.header.init_vector_suffix,
      parsed.body,
      parsed.common_mac,
    )
  }

  fn preprocess_secure_submessage(
    &self,
    secure_prefix_and_body: &[u8],
    receiver_handle: ParticipantCryptoHandle,
    sender_handle: ParticipantCryptoHandle,
  ) -> Result<(SecureSubmessageCategory, EndpointCryptoHandle, EndpointCryptoHandle), SecurityException> {
    let parsed = parse(secure_prefix_and_body)?;
    let senders = self.endpoints_owned_by(sender_handle);
    let receivers = self.endpoints_owned_by(receiver_handle);

    let sender_endpoint = senders
      .into_iter()
      .find(|h| (h.0 as u32).to_be_bytes() == parsed.header.session_id.to_be_bytes())
      .ok_or_else(|| SecurityException::new(-1, "no endpoint on sender participant matches session id"))?;

    let receiver_endpoint = parsed
      .receivers
      .iter()
      .find_map(|mac| {
        receivers
          .iter()
          .copied()
          .find(|h| (h.0 as u32).to_be_bytes() == mac.receiver_handle_suffix)
      })
      .or_else(|| receivers.first().copied())
      .ok_or_else(|| SecurityException::new(-1, "no matching endpoint on receiver participant"))?;

    let category = if self.endpoint_keys.lock().unwrap().contains_key(&sender_endpoint) {
      SecureSubmessageCategory::DatawriterSubmessage
    } else {
      SecureSubmessageCategory::DatareaderSubmessage
    };
    Ok((category, sender_endpoint, receiver_endpoint))
  }

  fn decode_datawriter_submessage(
    &self,
    encoded_submessage: &[u8],
    reader_handle: EndpointCryptoHandle,
    writer_handle: EndpointCryptoHandle,
  ) -> Result<Vec<u8>, SecurityException> {
    let parsed = parse(encoded_submessage)?;
    let km = self
      .remote_endpoint_keys
      .lock()
      .unwrap()
      .get(&(reader_handle, writer_handle))
      .cloned()
      .ok_or_else(|| SecurityException::new(-1, "no crypto tokens registered for this writer"))?;
    open_joined(
      &km,
      parsed.header.session_id,
      parsed.header.init_vector_suffix,
      parsed.body,
      parsed.common_mac,
    )
  }

  fn decode_datareader_submessage(
    &self,
    encoded_submessage: &[u8],
    writer_handle: EndpointCryptoHandle,
    reader_handle: EndpointCryptoHandle,
  ) -> Result<Vec<u8>, SecurityException> {
    let parsed = parse(encoded_submessage)?;
    let km = self
      .remote_endpoint_keys
      .lock()
      .unwrap()
      .get(&(writer_handle, reader_handle))
      .cloned()
      .ok_or_else(|| SecurityException::new(-1, "no crypto tokens registered for this reader"))?;
    open_joined(
      &km,
      parsed.header.session_id,
      parsed.header.init_vector_suffix,
      parsed.body,
      parsed.common_mac,
    )
  }
}

fn require_first_call<'a>(plain: Option<&'a [u8]>, start_index: usize) -> Result<&'a [u8], SecurityException> {
  match (plain, start_index) {
    (Some(p), 0) => Ok(p),
    _ => Err(SecurityException::new(
      -1,
      "iterate-on-index encode is not supported by the builtin transform",
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::security::{
    access_control::types::EndpointSecurityAttributes,
    cryptographic::{builtin::CryptographicBuiltin, plugin::CryptoKeyFactory, types::EndpointCryptoHandle},
    types::{SecurityAttributes, ATTR_FLAG_PAYLOAD_PROTECTED, ATTR_FLAG_VALID},
  };

  fn protected_attrs() -> EndpointSecurityAttributes {
    EndpointSecurityAttributes {
      attributes: SecurityAttributes {
        security_attributes: ATTR_FLAG_VALID | ATTR_FLAG_PAYLOAD_PROTECTED,
        plugin_security_attributes: 0,
      },
      is_key_protected: false,
    }
  }

  fn wire_up_writer_reader_pair() -> (CryptographicBuiltin, ParticipantCryptoHandle, EndpointCryptoHandle, EndpointCryptoHandle) {
    let plugin = CryptographicBuiltin::new();
    let participant = plugin
      .register_local_participant(Default::default())
      .unwrap();
    let writer = plugin
      .register_local_datawriter(participant, protected_attrs())
      .unwrap();
    // Loop the writer's own token back to itself to simulate a matched
    // remote reader sharing the same process, as tests commonly do for a
    // builtin plugin under unit test.
    let reader = plugin
      .register_local_datareader(participant, protected_attrs())
      .unwrap();
    use crate::security::cryptographic::plugin::CryptoKeyExchange;
    let tokens = plugin
      .create_local_datawriter_crypto_tokens(writer, reader)
      .unwrap();
    plugin
      .set_remote_datawriter_crypto_tokens(reader, writer, tokens)
      .unwrap();
    (plugin, participant, writer, reader)
  }

  #[test]
  fn serialized_payload_round_trips() {
    let (plugin, _p, writer, reader) = wire_up_writer_reader_pair();
    let plain = b"hello secure world";
    let encoded = plugin.encode_serialized_payload(plain, writer).unwrap();
    assert_ne!(&encoded[BuiltinCryptoHeader::WIRE_LEN..], plain);
    let decoded = plugin
      .decode_serialized_payload(&encoded, reader, writer)
      .unwrap();
    assert_eq!(decoded, plain);
  }

  #[test]
  fn datawriter_submessage_round_trips() {
    let (plugin, _p, writer, reader) = wire_up_writer_reader_pair();
    let plain = b"ALIVE heartbeat payload";
    let step = plugin
      .encode_datawriter_submessage(Some(plain), writer, &[reader], 0)
      .unwrap();
    assert!(step.next_index.is_none());
    let decoded = plugin
      .decode_datawriter_submessage(&step.ciphertext, reader, writer)
      .unwrap();
    assert_eq!(decoded, plain);
  }

  #[test]
  fn tampered_submessage_fails_decode() {
    let (plugin, _p, writer, reader) = wire_up_writer_reader_pair();
    let step = plugin
      .encode_datawriter_submessage(Some(b"payload"), writer, &[reader], 0)
      .unwrap();
    let mut tampered = step.ciphertext;
    let last = tampered.len() - 1;
    tampered[last] ^= 0xff;
    assert!(plugin
      .decode_datawriter_submessage(&tampered, reader, writer)
      .is_err());
  }
}
