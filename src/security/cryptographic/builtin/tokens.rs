//! Wire encoding of [`KeyMaterial`] as the opaque [`DataHolder`] crypto
//! tokens exchanged over discovery (§4.3 "crypto token exchange").

use bytes::Bytes;

use super::super::types::{BuiltinCryptoTransformationKind, KeyMaterial};
use crate::security::types::{BinaryProperty, DataHolder, SecurityException};

const CLASS_ID: &str = "DDS:Crypto:AES_GCM_GMAC";

pub fn key_material_to_token(km: &KeyMaterial) -> DataHolder {
  let mut binary_properties = vec![
    BinaryProperty {
      name: "transformation_kind".into(),
      value: Bytes::from(vec![km.transformation_kind.to_wire()]),
      propagate: true,
    },
    BinaryProperty {
      name: "master_salt".into(),
      value: km.master_salt.clone(),
      propagate: true,
    },
    BinaryProperty {
      name: "master_sender_key".into(),
      value: km.master_sender_key.clone(),
      propagate: true,
    },
    BinaryProperty {
      name: "sender_key_id".into(),
      value: Bytes::from(km.sender_key_id.to_be_bytes().to_vec()),
      propagate: true,
    },
  ];
  if let Some(receiver_key) = &km.master_receiver_specific_key {
    binary_properties.push(BinaryProperty {
      name: "master_receiver_specific_key".into(),
      value: receiver_key.clone(),
      propagate: true,
    });
    binary_properties.push(BinaryProperty {
      name: "receiver_specific_key_id".into(),
      value: Bytes::from(km.receiver_specific_key_id.to_be_bytes().to_vec()),
      propagate: true,
    });
  }
  DataHolder {
    class_id: CLASS_ID.to_string(),
    properties: Vec::new(),
    binary_properties,
  }
}

pub fn token_to_key_material(holder: &DataHolder) -> Result<KeyMaterial, SecurityException> {
  if holder.class_id != CLASS_ID {
    return Err(SecurityException::new(-1, "unrecognized crypto token class_id"));
  }
  let kind_byte = holder
    .binary_property("transformation_kind")
    .and_then(|b| b.first().copied())
    .ok_or_else(|| SecurityException::new(-1, "crypto token missing transformation_kind"))?;
  let transformation_kind = BuiltinCryptoTransformationKind::from_wire(kind_byte)
    .ok_or_else(|| SecurityException::new(-1, "crypto token has unknown transformation_kind"))?;
  let master_salt = holder
    .binary_property("master_salt")
    .cloned()
    .ok_or_else(|| SecurityException::new(-1, "crypto token missing master_salt"))?;
  let master_sender_key = holder
    .binary_property("master_sender_key")
    .cloned()
    .ok_or_else(|| SecurityException::new(-1, "crypto token missing master_sender_key"))?;
  let sender_key_id = holder
    .binary_property("sender_key_id")
    .and_then(|b| b.as_ref().try_into().ok())
    .map(u32::from_be_bytes)
    .ok_or_else(|| SecurityException::new(-1, "crypto token missing sender_key_id"))?;
  let master_receiver_specific_key = holder.binary_property("master_receiver_specific_key").cloned();
  let receiver_specific_key_id = holder
    .binary_property("receiver_specific_key_id")
    .and_then(|b| b.as_ref().try_into().ok())
    .map(u32::from_be_bytes)
    .unwrap_or(0);
  Ok(KeyMaterial {
    transformation_kind,
    master_salt,
    master_sender_key,
    sender_key_id,
    master_receiver_specific_key,
    receiver_specific_key_id,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_material_round_trips_through_token() {
    let km = KeyMaterial {
      transformation_kind: BuiltinCryptoTransformationKind::Aes128Gcm,
      master_salt: Bytes::from_static(&[1; 16]),
      master_sender_key: Bytes::from_static(&[2; 16]),
      sender_key_id: 7,
      master_receiver_specific_key: None,
      receiver_specific_key_id: 0,
    };
    let holder = key_material_to_token(&km);
    let back = token_to_key_material(&holder).unwrap();
    assert_eq!(back.transformation_kind, km.transformation_kind);
    assert_eq!(back.master_sender_key, km.master_sender_key);
    assert_eq!(back.sender_key_id, km.sender_key_id);
  }
}
