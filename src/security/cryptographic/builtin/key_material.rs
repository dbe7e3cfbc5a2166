//! AES-GCM/GMAC sealing primitives backing the builtin crypto transform.
//! `Gmac` kinds authenticate the plaintext as associated data without
//! encrypting it (sign-only submessages); `Gcm` kinds encrypt and
//! authenticate. Both are realized on top of a single AEAD primitive
//! (`ring::aead`) since GMAC-over-AAD-only and GCM are the same cipher with
//! an empty-vs-real plaintext.

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM, AES_256_GCM};

use super::super::types::{BuiltinCryptoTransformationKind, KeyMaterial};
use crate::security::types::SecurityException;

const TAG_LEN: usize = 16;

fn algorithm(kind: BuiltinCryptoTransformationKind) -> Option<&'static aead::Algorithm> {
  match kind {
    BuiltinCryptoTransformationKind::Aes128Gcm | BuiltinCryptoTransformationKind::Aes128Gmac => {
      Some(&AES_128_GCM)
    }
    BuiltinCryptoTransformationKind::Aes256Gcm | BuiltinCryptoTransformationKind::Aes256Gmac => {
      Some(&AES_256_GCM)
    }
    BuiltinCryptoTransformationKind::None => None,
  }
}

/// 12-byte GCM nonce: 4-byte session id || 8-byte IV suffix, matching the
/// builtin transform's session-keyed IV scheme.
fn nonce_bytes(session_id: u32, iv_suffix: u64) -> [u8; 12] {
  let mut buf = [0u8; 12];
  buf[0..4].copy_from_slice(&session_id.to_be_bytes());
  buf[4..12].copy_from_slice(&iv_suffix.to_be_bytes());
  buf
}

fn unbound_key(km: &KeyMaterial) -> Result<LessSafeKey, SecurityException> {
  let alg = algorithm(km.transformation_kind)
    .ok_or_else(|| SecurityException::new(-1, "no transformation configured"))?;
  let key_bytes = &km.master_sender_key;
  if key_bytes.len() != alg.key_len() {
    return Err(SecurityException::new(-1, "key material length mismatch"));
  }
  let unbound = UnboundKey::new(alg, key_bytes)
    .map_err(|_| SecurityException::new(-1, "invalid key material"))?;
  Ok(LessSafeKey::new(unbound))
}

/// Seal `plaintext` under `km`. For `Gmac` kinds this authenticates
/// `plaintext` as associated data and encrypts nothing, returning the
/// original bytes unchanged plus a 16-byte tag; for `Gcm` kinds it encrypts
/// in place and appends the tag.
pub fn seal(
  km: &KeyMaterial,
  session_id: u32,
  iv_suffix: u64,
  plaintext: &[u8],
) -> Result<Vec<u8>, SecurityException> {
  let key = unbound_key(km)?;
  let nonce = Nonce::assume_unique_for_key(nonce_bytes(session_id, iv_suffix));

  if km.transformation_kind.is_encrypted() {
    let mut in_out = plaintext.to_vec();
    key
      .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
      .map_err(|_| SecurityException::new(-1, "seal failed"))?;
    Ok(in_out)
  } else {
    // GMAC: authenticate-only. Seal an empty buffer with plaintext as AAD,
    // producing just the tag; the wire form is plaintext || tag.
    let mut tag_buf = Vec::new();
    key
      .seal_in_place_append_tag(nonce, Aad::from(plaintext), &mut tag_buf)
      .map_err(|_| SecurityException::new(-1, "seal failed"))?;
    let mut out = Vec::with_capacity(plaintext.len() + tag_buf.len());
    out.extend_from_slice(plaintext);
    out.extend_from_slice(&tag_buf);
    Ok(out)
  }
}

/// Inverse of [`seal`]. For `Gcm` kinds, `sealed` is ciphertext||tag and the
/// plaintext is returned. For `Gmac` kinds, `sealed` is plaintext||tag and
/// the tag is verified against the plaintext prefix, which is returned
/// unchanged.
pub fn open(
  km: &KeyMaterial,
  session_id: u32,
  iv_suffix: u64,
  sealed: &[u8],
) -> Result<Vec<u8>, SecurityException> {
  let key = unbound_key(km)?;
  let nonce = Nonce::assume_unique_for_key(nonce_bytes(session_id, iv_suffix));

  if sealed.len() < TAG_LEN {
    return Err(SecurityException::new(-1, "sealed buffer shorter than tag"));
  }

  if km.transformation_kind.is_encrypted() {
    let mut in_out = sealed.to_vec();
    let plain = key
      .open_in_place(nonce, Aad::empty(), &mut in_out)
      .map_err(|_| SecurityException::new(-1, "authentication failed"))?;
    Ok(plain.to_vec())
  } else {
    let (plaintext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
    let mut verify_buf = tag.to_vec();
    key
      .open_in_place(nonce, Aad::from(plaintext), &mut verify_buf)
      .map_err(|_| SecurityException::new(-1, "authentication failed"))?;
    Ok(plaintext.to_vec())
  }
}

#[cfg(test)]
mod tests {
  use bytes::Bytes;
  use hex_literal::hex;

  use super::*;

  fn km(kind: BuiltinCryptoTransformationKind) -> KeyMaterial {
    KeyMaterial {
      transformation_kind: kind,
      master_salt: Bytes::from_static(&[0u8; 16]),
      master_sender_key: Bytes::from(vec![7u8; kind.key_len()]),
      sender_key_id: 1,
      master_receiver_specific_key: None,
      receiver_specific_key_id: 0,
    }
  }

  /// Fixed (not randomly generated) key material, the way a wire-format
  /// regression fixture is usually pinned.
  fn fixed_aes128_km() -> KeyMaterial {
    KeyMaterial {
      transformation_kind: BuiltinCryptoTransformationKind::Aes128Gcm,
      master_salt: Bytes::from_static(&hex!("000102030405060708090a0b0c0d0e0f")),
      master_sender_key: Bytes::from_static(&hex!("101112131415161718191a1b1c1d1e1f")),
      sender_key_id: 7,
      master_receiver_specific_key: None,
      receiver_specific_key_id: 0,
    }
  }

  #[test]
  fn fixed_key_material_round_trips() {
    let k = fixed_aes128_km();
    let plain = b"fixed key fixture";
    let sealed = seal(&k, 5, 1, plain).unwrap();
    assert_eq!(open(&k, 5, 1, &sealed).unwrap(), plain);
  }

  #[test]
  fn gcm_round_trip_is_identity() {
    let k = km(BuiltinCryptoTransformationKind::Aes128Gcm);
    let plain = b"the quick brown fox";
    let sealed = seal(&k, 1, 42, plain).unwrap();
    assert_ne!(&sealed[..plain.len()], plain);
    let opened = open(&k, 1, 42, &sealed).unwrap();
    assert_eq!(opened, plain);
  }

  #[test]
  fn gmac_round_trip_preserves_plaintext_and_verifies() {
    let k = km(BuiltinCryptoTransformationKind::Aes256Gmac);
    let plain = b"signed but not encrypted";
    let sealed = seal(&k, 3, 9, plain).unwrap();
    assert_eq!(&sealed[..plain.len()], plain);
    let opened = open(&k, 3, 9, &sealed).unwrap();
    assert_eq!(opened, plain);
  }

  #[test]
  fn tampered_ciphertext_fails_to_open() {
    let k = km(BuiltinCryptoTransformationKind::Aes128Gcm);
    let mut sealed = seal(&k, 1, 1, b"hello").unwrap();
    *sealed.last_mut().unwrap() ^= 0xff;
    assert!(open(&k, 1, 1, &sealed).is_err());
  }
}
