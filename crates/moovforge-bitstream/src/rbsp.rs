//! RBSP helpers: emulation prevention removal and an Exp-Golomb bit reader.

use crate::error::{BitstreamError, Result};

/// Remove emulation prevention bytes (`00 00 03` -> `00 00`).
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut zeros = 0;

    for &byte in data {
        if zeros >= 2 && byte == 3 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        result.push(byte);
    }

    result
}

/// MSB-first bit reader over RBSP data.
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    fn truncated(&self) -> BitstreamError {
        BitstreamError::Truncated {
            need: self.byte_pos + 1,
            have: self.data.len(),
        }
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = *self.data.get(self.byte_pos).ok_or_else(|| self.truncated())?;
        let bit = (byte >> (7 - self.bit_pos)) & 1;

        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(bit == 1)
    }

    /// Read `n` bits (up to 64) as an unsigned value.
    pub fn read_bits(&mut self, n: u8) -> Result<u64> {
        debug_assert!(n <= 64);
        let mut result = 0u64;
        for _ in 0..n {
            result = (result << 1) | self.read_bit()? as u64;
        }
        Ok(result)
    }

    /// Skip `n` bits.
    pub fn skip_bits(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.read_bit()?;
        }
        Ok(())
    }

    /// Read an unsigned Exp-Golomb value.
    pub fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0u8;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(BitstreamError::invalid("Exp-Golomb code too long"));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let suffix = self.read_bits(leading_zeros)? as u32;
        Ok(((1u64 << leading_zeros) - 1) as u32 + suffix)
    }

    /// Read a signed Exp-Golomb value.
    pub fn read_se(&mut self) -> Result<i32> {
        let code = self.read_ue()? as i64;
        let value = if code % 2 == 1 {
            (code + 1) / 2
        } else {
            -(code / 2)
        };
        Ok(value as i32)
    }
}
