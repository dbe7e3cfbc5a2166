//! Consumer-side validator for the opcode program format described in §6.
//! The (de)serializer this crate's security modules sit next to consumes a
//! 32-bit instruction stream emitted by an (out-of-scope) IDL compiler;
//! this module only validates that a given stream is well-formed, it does
//! not execute it. Bit layout and opcode/type/flag constants are grounded
//! directly on `dds_opcodes.h`.

use enumflags2::{bitflags, BitFlags};

const OP_MASK: u32 = 0xff00_0000;
const TYPE_FLAGS_MASK: u32 = 0x0080_0000;
const TYPE_MASK: u32 = 0x007f_0000;
const SUBTYPE_MASK: u32 = 0x0000_ff00;
const FLAGS_MASK: u32 = 0x0000_00ff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
  /// Return from subroutine, exits top-level.
  Rts,
  /// Data field address.
  Adr,
  /// Jump-to-subroutine (relative, signed 16).
  Jsr,
  /// Union case dispatch (deprecated 3-arg form).
  Jeq,
  /// XCDR2 delimited-CDR header.
  Dlc,
  /// XCDR2 parameter-list-CDR header.
  Plc,
  /// Parameter-list member (member-id + flag).
  Plm,
  /// Key-offset list.
  Kof,
  /// Union case dispatch (current 4-arg form).
  Jeq4,
}

impl OpCode {
  fn from_bits(bits: u32) -> Option<Self> {
    Some(match bits {
      0x00 => OpCode::Rts,
      0x01 => OpCode::Adr,
      0x02 => OpCode::Jsr,
      0x03 => OpCode::Jeq,
      0x04 => OpCode::Dlc,
      0x05 => OpCode::Plc,
      0x06 => OpCode::Plm,
      0x07 => OpCode::Kof,
      0x08 => OpCode::Jeq4,
      _ => return None,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
  OneByte,
  TwoByte,
  FourByte,
  EightByte,
  String,
  BoundedString,
  Sequence,
  Array,
  Union,
  Struct,
  BoundedSequence,
  Enum,
  /// Field with external definition. Valid only directly under `ADR`, not
  /// as a `SEQ`/`ARR`/`UNI`/`BSQ` subtype -- see `validate_instruction`.
  External,
}

impl TypeCode {
  fn from_bits(bits: u32) -> Option<Self> {
    Some(match bits {
      0x01 => TypeCode::OneByte,
      0x02 => TypeCode::TwoByte,
      0x03 => TypeCode::FourByte,
      0x04 => TypeCode::EightByte,
      0x05 => TypeCode::String,
      0x06 => TypeCode::BoundedString,
      0x07 => TypeCode::Sequence,
      0x08 => TypeCode::Array,
      0x09 => TypeCode::Union,
      0x0a => TypeCode::Struct,
      0x0b => TypeCode::BoundedSequence,
      0x0c => TypeCode::Enum,
      0x0d => TypeCode::External,
      _ => return None,
    })
  }

  fn is_container(self) -> bool {
    matches!(
      self,
      TypeCode::Sequence | TypeCode::Array | TypeCode::Union | TypeCode::BoundedSequence
    )
  }
}

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionFlag {
  Key = 1 << 0,
  /// Shares a bit with `FloatingPoint`: union-default-case on `ADR|UNI`,
  /// floating-point on numeric `ADR`/`JEQ4` instructions.
  DefaultCaseOrFloatingPoint = 1 << 1,
  Signed = 1 << 2,
  MustUnderstand = 1 << 3,
  BaseType = 1 << 4,
  Optional = 1 << 5,
}

/// Per-topic 32-bit flag word gating fast paths in the (de)serializer (§6).
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicDescriptorFlag {
  NoOptimize = 1 << 0,
  FixedKeyXcdr1 = 1 << 1,
  ContainsUnion = 1 << 2,
  FixedSize = 1 << 4,
  FixedKeyXcdr2 = 1 << 5,
  XTypesMetadataPresent = 1 << 6,
}

pub type TopicDescriptorFlags = BitFlags<TopicDescriptorFlag>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpcodeError {
  #[error("unrecognized opcode bits 0x{0:02x} at instruction {1}")]
  UnknownOpCode(u32, usize),
  #[error("unrecognized type code bits 0x{0:02x} at instruction {1}")]
  UnknownTypeCode(u32, usize),
  #[error("unrecognized subtype bits 0x{0:02x} at instruction {1}")]
  UnknownSubtypeCode(u32, usize),
  #[error("EXT subtype not supported under {0:?} at instruction {1}")]
  ExternalUnderContainer(TypeCode, usize),
  #[error("empty opcode program")]
  Empty,
}

/// A single decoded 32-bit instruction. Only the fields needed to validate
/// structure are exposed; operand words (offsets, sizes, jump targets) are
/// not interpreted here -- that belongs to the excluded compiler-emitted
/// stream consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
  pub op: OpCode,
  pub primary_type: Option<TypeCode>,
  pub external: bool,
  pub subtype: Option<TypeCode>,
  pub flags: u8,
}

fn decode_instruction(word: u32, index: usize) -> Result<Instruction, OpcodeError> {
  let op_bits = (word & OP_MASK) >> 24;
  let op = OpCode::from_bits(op_bits).ok_or(OpcodeError::UnknownOpCode(op_bits, index))?;

  let external = word & TYPE_FLAGS_MASK != 0;
  let type_bits = (word & TYPE_MASK) >> 16;
  let primary_type = if type_bits == 0 {
    None
  } else {
    Some(TypeCode::from_bits(type_bits).ok_or(OpcodeError::UnknownTypeCode(type_bits, index))?)
  };

  let subtype_bits = (word & SUBTYPE_MASK) >> 8;
  let subtype = if subtype_bits == 0 {
    None
  } else {
    Some(TypeCode::from_bits(subtype_bits).ok_or(OpcodeError::UnknownSubtypeCode(subtype_bits, index))?)
  };

  let flags = (word & FLAGS_MASK) as u8;

  Ok(Instruction {
    op,
    primary_type,
    external,
    subtype,
    flags,
  })
}

/// Validate an opcode program: every instruction must decode to a
/// documented opcode/type/subtype, and `EXT` is rejected as a subtype of
/// `SEQ`/`ARR`/`UNI`/`BSQ` (not supported per `dds_opcodes.h`).
pub fn validate_program(words: &[u32]) -> Result<(), OpcodeError> {
  if words.is_empty() {
    return Err(OpcodeError::Empty);
  }
  for (index, &word) in words.iter().enumerate() {
    let insn = decode_instruction(word, index)?;
    if insn.op == OpCode::Adr {
      if let (Some(primary), Some(TypeCode::External)) = (insn.primary_type, insn.subtype) {
        if primary.is_container() {
          return Err(OpcodeError::ExternalUnderContainer(primary, index));
        }
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_rts() {
    assert!(validate_program(&[0x0000_0000]).is_ok());
  }

  #[test]
  fn accepts_adr_1by_key_field() {
    // [ADR, 1BY, 0, KEY]
    let word = (0x01u32 << 24) | (0x01 << 16) | (0x00 << 8) | 0x01;
    assert!(validate_program(&[word]).is_ok());
  }

  #[test]
  fn rejects_ext_under_sequence() {
    // [ADR, SEQ, EXT, 0]
    let word = (0x01u32 << 24) | (0x07 << 16) | (0x0d << 8);
    assert_eq!(
      validate_program(&[word]),
      Err(OpcodeError::ExternalUnderContainer(TypeCode::Sequence, 0))
    );
  }

  #[test]
  fn rejects_unknown_opcode() {
    let word = 0xffu32 << 24;
    assert_eq!(validate_program(&[word]), Err(OpcodeError::UnknownOpCode(0xff, 0)));
  }

  #[test]
  fn rejects_empty_program() {
    assert_eq!(validate_program(&[]), Err(OpcodeError::Empty));
  }
}
