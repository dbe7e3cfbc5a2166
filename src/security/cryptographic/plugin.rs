//! The three cryptographic plugin interfaces: `CryptoKeyFactory` (handle
//! registration), `CryptoKeyExchange` (token creation/installation), and
//! `CryptoTransform` (the actual wire encode/decode). Together these are
//! the third "external collaborator" of §1; STP (§4.5) is the core-side
//! caller of `CryptoTransform`, while PSS/SER (§4.3/§4.4) call the other
//! two.

use crate::security::{
  authentication::types::SharedSecretHandle,
  cryptographic::types::*,
  types::{CryptoTokenSeq, EndpointCryptoHandle, SecurityException},
};

pub trait CryptoKeyFactory: Send + Sync {
  fn register_local_participant(
    &self,
    attributes: crate::security::access_control::types::ParticipantSecurityAttributes,
  ) -> Result<ParticipantCryptoHandle, SecurityException>;

  fn register_matched_remote_participant(
    &self,
    local_participant_crypto_handle: ParticipantCryptoHandle,
    shared_secret: &SharedSecretHandle,
  ) -> Result<ParticipantCryptoHandle, SecurityException>;

  fn register_local_datawriter(
    &self,
    participant_crypto_handle: ParticipantCryptoHandle,
    attributes: crate::security::access_control::types::EndpointSecurityAttributes,
  ) -> Result<EndpointCryptoHandle, SecurityException>;

  fn register_matched_remote_datareader(
    &self,
    local_datawriter_crypto_handle: EndpointCryptoHandle,
    remote_participant_crypto_handle: ParticipantCryptoHandle,
    shared_secret: &SharedSecretHandle,
  ) -> Result<EndpointCryptoHandle, SecurityException>;

  fn register_local_datareader(
    &self,
    participant_crypto_handle: ParticipantCryptoHandle,
    attributes: crate::security::access_control::types::EndpointSecurityAttributes,
  ) -> Result<EndpointCryptoHandle, SecurityException>;

  fn register_matched_remote_datawriter(
    &self,
    local_datareader_crypto_handle: EndpointCryptoHandle,
    remote_participant_crypto_handle: ParticipantCryptoHandle,
    shared_secret: &SharedSecretHandle,
  ) -> Result<EndpointCryptoHandle, SecurityException>;

  fn unregister_participant(&self, handle: ParticipantCryptoHandle) -> Result<(), SecurityException>;
  fn unregister_datawriter(&self, handle: EndpointCryptoHandle) -> Result<(), SecurityException>;
  fn unregister_datareader(&self, handle: EndpointCryptoHandle) -> Result<(), SecurityException>;
}

pub trait CryptoKeyExchange: Send + Sync {
  fn create_local_participant_crypto_tokens(
    &self,
    local_handle: ParticipantCryptoHandle,
    remote_handle: ParticipantCryptoHandle,
  ) -> Result<CryptoTokenSeq, SecurityException>;

  fn set_remote_participant_crypto_tokens(
    &self,
    local_handle: ParticipantCryptoHandle,
    remote_handle: ParticipantCryptoHandle,
    tokens: CryptoTokenSeq,
  ) -> Result<(), SecurityException>;

  fn create_local_datawriter_crypto_tokens(
    &self,
    local_handle: EndpointCryptoHandle,
    remote_handle: EndpointCryptoHandle,
  ) -> Result<CryptoTokenSeq, SecurityException>;

  fn set_remote_datawriter_crypto_tokens(
    &self,
    local_reader_handle: EndpointCryptoHandle,
    remote_writer_handle: EndpointCryptoHandle,
    tokens: CryptoTokenSeq,
  ) -> Result<(), SecurityException>;

  fn create_local_datareader_crypto_tokens(
    &self,
    local_handle: EndpointCryptoHandle,
    remote_handle: EndpointCryptoHandle,
  ) -> Result<CryptoTokenSeq, SecurityException>;

  fn set_remote_datareader_crypto_tokens(
    &self,
    local_writer_handle: EndpointCryptoHandle,
    remote_reader_handle: EndpointCryptoHandle,
    tokens: CryptoTokenSeq,
  ) -> Result<(), SecurityException>;

  fn return_crypto_tokens(&self, tokens: CryptoTokenSeq) -> Result<(), SecurityException> {
    drop(tokens);
    Ok(())
  }
}

/// Outcome of one iteration of an iterate-on-index encode (§4.5: "the
/// crypto plugin may iterate: it returns an index into the handle list to
/// request another call for a subgroup").
pub struct EncodeStep {
  pub ciphertext: Vec<u8>,
  /// Index into the handle list to resume from on the next call,
  /// `None` once the whole list has been consumed.
  pub next_index: Option<usize>,
}

pub trait CryptoTransform: Send + Sync {
  fn encode_serialized_payload(
    &self,
    plain_payload: &[u8],
    writer_handle: EndpointCryptoHandle,
  ) -> Result<Vec<u8>, SecurityException>;

  fn decode_serialized_payload(
    &self,
    encoded_payload: &[u8],
    reader_handle: EndpointCryptoHandle,
    writer_handle: EndpointCryptoHandle,
  ) -> Result<Vec<u8>, SecurityException>;

  /// `plain_submessage` is `None` after the first call in an
  /// iterate-on-index sequence, per §4.5.
  fn encode_datawriter_submessage(
    &self,
    plain_submessage: Option<&[u8]>,
    writer_handle: EndpointCryptoHandle,
    reader_handles: &[EndpointCryptoHandle],
    start_index: usize,
  ) -> Result<EncodeStep, SecurityException>;

  fn encode_datareader_submessage(
    &self,
    plain_submessage: Option<&[u8]>,
    reader_handle: EndpointCryptoHandle,
    writer_handles: &[EndpointCryptoHandle],
    start_index: usize,
  ) -> Result<EncodeStep, SecurityException>;

  fn encode_rtps_message(
    &self,
    plain_message: Option<&[u8]>,
    sender_handle: ParticipantCryptoHandle,
    receiver_handles: &[ParticipantCryptoHandle],
    start_index: usize,
  ) -> Result<EncodeStep, SecurityException>;

  fn decode_rtps_message(
    &self,
    encoded_message: &[u8],
    receiver_handle: ParticipantCryptoHandle,
    sender_handle: ParticipantCryptoHandle,
  ) -> Result<Vec<u8>, SecurityException>;

  /// Discovers `cat` (§4.5) from a `SEC_PREFIX` + following submessage.
  fn preprocess_secure_submessage(
    &self,
    secure_prefix_and_body: &[u8],
    receiver_handle: ParticipantCryptoHandle,
    sender_handle: ParticipantCryptoHandle,
  ) -> Result<(SecureSubmessageCategory, EndpointCryptoHandle, EndpointCryptoHandle), SecurityException>;

  fn decode_datawriter_submessage(
    &self,
    encoded_submessage: &[u8],
    reader_handle: EndpointCryptoHandle,
    writer_handle: EndpointCryptoHandle,
  ) -> Result<Vec<u8>, SecurityException>;

  fn decode_datareader_submessage(
    &self,
    encoded_submessage: &[u8],
    writer_handle: EndpointCryptoHandle,
    reader_handle: EndpointCryptoHandle,
  ) -> Result<Vec<u8>, SecurityException>;
}
