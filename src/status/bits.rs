//! Packed status entries.
//!
//! Entry `i` occupies `bit_size` bits starting at bit `(i * bit_size) % 8` of
//! byte `(i * bit_size) / 8`, least significant bits first. This is the byte
//! layout relying parties decode, so it must not change.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitsError {
    #[error("Index {index} is outside the status array (len {len})")]
    IndexOutOfRange { index: u64, len: u64 },
    #[error("Status value {value} does not fit in {bit_size} bits")]
    ValueTooWide { value: u8, bit_size: u8 },
    #[error("Bit size mismatch: expected {expected}, got {actual}")]
    BitSizeMismatch { expected: u8, actual: u8 },
}

/// Status of a single index in a status list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Valid,
    Invalid,
    Suspended,
}

impl TokenStatus {
    pub fn value(self) -> u8 {
        match self {
            TokenStatus::Valid => 0,
            TokenStatus::Invalid => 1,
            TokenStatus::Suspended => 2,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(TokenStatus::Valid),
            1 => Some(TokenStatus::Invalid),
            2 => Some(TokenStatus::Suspended),
            _ => None,
        }
    }

    /// Whether this status can be represented with `bit_size` bits per entry.
    pub fn fits(self, bit_size: u8) -> bool {
        u16::from(self.value()) <= max_value(bit_size)
    }
}

pub fn is_valid_bit_size(bit_size: u8) -> bool {
    matches!(bit_size, 1 | 2 | 4 | 8)
}

fn max_value(bit_size: u8) -> u16 {
    (1u16 << bit_size) - 1
}

/// A fixed-length array of `bit_size`-bit entries, packed LSB first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBits {
    bit_size: u8,
    bytes: Vec<u8>,
    len: u64,
}

impl StatusBits {
    /// Create an array of `len` entries, all `Valid`.
    pub fn new(bit_size: u8, len: u64) -> Self {
        debug_assert!(is_valid_bit_size(bit_size), "unsupported bit size {bit_size}");
        let total_bits = len * u64::from(bit_size);
        let byte_len = total_bits.div_ceil(8) as usize;
        Self {
            bit_size,
            bytes: vec![0u8; byte_len],
            len,
        }
    }

    pub fn bit_size(&self) -> u8 {
        self.bit_size
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn locate(&self, index: u64) -> (usize, u32) {
        let bit = index * u64::from(self.bit_size);
        ((bit / 8) as usize, (bit % 8) as u32)
    }

    fn mask(&self) -> u8 {
        max_value(self.bit_size) as u8
    }

    /// Raw value at `index`. Entries past the end read as `Valid` (0).
    pub fn get(&self, index: u64) -> u8 {
        if index >= self.len {
            return 0;
        }
        let (byte, shift) = self.locate(index);
        (self.bytes[byte] >> shift) & self.mask()
    }

    pub fn status(&self, index: u64) -> Option<TokenStatus> {
        TokenStatus::from_value(self.get(index))
    }

    pub fn set(&mut self, index: u64, value: u8) -> Result<(), BitsError> {
        if index >= self.len {
            return Err(BitsError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        if u16::from(value) > max_value(self.bit_size) {
            return Err(BitsError::ValueTooWide {
                value,
                bit_size: self.bit_size,
            });
        }
        let (byte, shift) = self.locate(index);
        let mask = self.mask() << shift;
        self.bytes[byte] = (self.bytes[byte] & !mask) | (value << shift);
        Ok(())
    }

    pub fn set_status(&mut self, index: u64, status: TokenStatus) -> Result<(), BitsError> {
        self.set(index, status.value())
    }

    /// Copy every entry of `other` into `self` starting at entry `offset`.
    pub fn copy_from(&mut self, offset: u64, other: &StatusBits) -> Result<(), BitsError> {
        if other.bit_size != self.bit_size {
            return Err(BitsError::BitSizeMismatch {
                expected: self.bit_size,
                actual: other.bit_size,
            });
        }
        for i in 0..other.len {
            let value = other.get(i);
            if value != 0 {
                self.set(offset + i, value)?;
            }
        }
        Ok(())
    }
}
