//! Pointer width and jump encoding
//!
//! Two jump forms are written at a patch site:
//!
//! | Width  | Bytes | Encoding                                   |
//! |--------|-------|--------------------------------------------|
//! | Wide   | 12    | `48 B8 <imm64>` (mov rax, imm64), `FF E0` (jmp rax) |
//! | Narrow | 5     | `E9 <rel32>` (jmp rel32)                   |
//!
//! The relative offset is measured from the end of the 5-byte instruction.

use crate::error::RedirectError;
use byteorder::{ByteOrder, NativeEndian, LE};

/// `mov rax, imm64`
pub const MOV_RAX_IMM64: [u8; 2] = [0x48, 0xB8];
/// `jmp rax`
pub const JMP_RAX: [u8; 2] = [0xFF, 0xE0];
/// `jmp rel32`
pub const JMP_REL32: u8 = 0xE9;

/// Size of the absolute jump sequence
pub const ABSOLUTE_JUMP_LEN: usize = 12;
/// Size of the relative jump instruction
pub const RELATIVE_JUMP_LEN: usize = 5;

/// Process addressing width, which decides the jump form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    /// 32-bit
    Narrow,
    /// 64-bit
    Wide,
}

impl PointerWidth {
    /// Width of the running process
    pub fn host() -> Result<Self, RedirectError> {
        Self::from_bits(usize::BITS)
    }

    /// Only 32 and 64 bit processes are supported; anything else is refused
    /// instead of falling back to one of the two encodings.
    pub fn from_bits(bits: u32) -> Result<Self, RedirectError> {
        match bits {
            32 => Ok(PointerWidth::Narrow),
            64 => Ok(PointerWidth::Wide),
            other => Err(RedirectError::UnsupportedPointerWidth(other)),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            PointerWidth::Narrow => 32,
            PointerWidth::Wide => 64,
        }
    }

    /// Bytes destroyed at the patch site
    pub fn patch_len(self) -> usize {
        match self {
            PointerWidth::Narrow => RELATIVE_JUMP_LEN,
            PointerWidth::Wide => ABSOLUTE_JUMP_LEN,
        }
    }
}

/// A jump written at a patch site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jump {
    Absolute64 { target: u64 },
    Relative32 { offset: i32 },
}

impl Jump {
    /// Build the jump from `source` to `destination` for the given width
    pub fn build(
        width: PointerWidth,
        source: usize,
        destination: usize,
    ) -> Result<Self, RedirectError> {
        match width {
            PointerWidth::Wide => Ok(Jump::Absolute64 {
                target: destination as u64,
            }),
            PointerWidth::Narrow => {
                relative_offset(source, destination).map(|offset| Jump::Relative32 { offset })
            }
        }
    }

    /// Machine code for this jump
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Jump::Absolute64 { target } => {
                let mut bytes = Vec::with_capacity(ABSOLUTE_JUMP_LEN);
                bytes.extend_from_slice(&MOV_RAX_IMM64);
                bytes.extend_from_slice(&target.to_ne_bytes());
                bytes.extend_from_slice(&JMP_RAX);
                bytes
            }
            Jump::Relative32 { offset } => {
                let mut bytes = Vec::with_capacity(RELATIVE_JUMP_LEN);
                bytes.push(JMP_REL32);
                bytes.extend_from_slice(&offset.to_le_bytes());
                bytes
            }
        }
    }

    /// Recognise a jump at the start of `bytes`
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() >= ABSOLUTE_JUMP_LEN
            && bytes[0..2] == MOV_RAX_IMM64
            && bytes[10..12] == JMP_RAX
        {
            return Some(Jump::Absolute64 {
                target: NativeEndian::read_u64(&bytes[2..10]),
            });
        }

        if bytes.len() >= RELATIVE_JUMP_LEN && bytes[0] == JMP_REL32 {
            return Some(Jump::Relative32 {
                offset: LE::read_i32(&bytes[1..5]),
            });
        }

        None
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        match self {
            Jump::Absolute64 { .. } => ABSOLUTE_JUMP_LEN,
            Jump::Relative32 { .. } => RELATIVE_JUMP_LEN,
        }
    }

    /// Where this jump lands when placed at `source`
    pub fn target(&self, source: usize) -> usize {
        match *self {
            Jump::Absolute64 { target } => target as usize,
            // Inside 32 bits the CPU wraps, mirroring relative_offset
            Jump::Relative32 { offset } => match u32::try_from(source) {
                Ok(source) => source
                    .wrapping_add(RELATIVE_JUMP_LEN as u32)
                    .wrapping_add(offset as u32) as usize,
                Err(_) => (source as i64 + RELATIVE_JUMP_LEN as i64 + offset as i64) as usize,
            },
        }
    }
}

/// `destination - source - 5` as a rel32
///
/// Inside a 32-bit address space every offset is reachable modulo 2^32. Above it the
/// difference has to fit a signed 32-bit value.
fn relative_offset(source: usize, destination: usize) -> Result<i32, RedirectError> {
    let diff = destination as i64 - source as i64 - RELATIVE_JUMP_LEN as i64;
    if let Ok(offset) = i32::try_from(diff) {
        return Ok(offset);
    }

    let narrow = u32::try_from(source).is_ok() && u32::try_from(destination).is_ok();
    if narrow {
        return Ok((destination as u32)
            .wrapping_sub(source as u32)
            .wrapping_sub(RELATIVE_JUMP_LEN as u32) as i32);
    }

    Err(RedirectError::OffsetOutOfRange {
        from: source,
        to: destination,
    })
}
