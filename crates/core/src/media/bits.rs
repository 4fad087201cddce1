//! Bounds-checked bit reader for H.264 parameter sets.

use crate::error::{IngestError, Result, SpsErrorKind};

/// MSB-first bit cursor over a byte slice.
///
/// Every read checks the remaining length and fails with
/// [`SpsErrorKind::Exhausted`] instead of reading past the buffer.
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_offset: usize,
}

fn exhausted() -> IngestError {
    IngestError::SpsDecode {
        kind: SpsErrorKind::Exhausted,
    }
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_offset: 0,
        }
    }

    /// Bits not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() * 8 - self.bit_offset
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = *self.data.get(self.bit_offset / 8).ok_or_else(exhausted)?;
        let bit = byte & (0x80 >> (self.bit_offset % 8)) != 0;
        self.bit_offset += 1;
        Ok(bit)
    }

    /// Read a fixed-width unsigned field of up to 32 bits.
    pub fn read_bits(&mut self, count: u32) -> Result<u32> {
        debug_assert!(count <= 32);
        if self.remaining() < count as usize {
            return Err(exhausted());
        }
        let mut value = 0u32;
        for _ in 0..count {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Ok(value)
    }

    pub fn read_flag(&mut self) -> Result<bool> {
        self.read_bit()
    }

    pub fn skip_bits(&mut self, count: usize) -> Result<()> {
        if self.remaining() < count {
            return Err(exhausted());
        }
        self.bit_offset += count;
        Ok(())
    }

    /// Unsigned Exp-Golomb `ue(v)`: `2^k - 1 + info` where `k` is the
    /// number of leading zeros.
    pub fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0u32;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(IngestError::SpsDecode {
                    kind: SpsErrorKind::CodeTooLong,
                });
            }
        }
        let info = self.read_bits(leading_zeros)?;
        Ok(((1u64 << leading_zeros) - 1 + info as u64) as u32)
    }

    /// Signed Exp-Golomb `se(v)`: `ceil(k / 2)`, negated when `k` is even.
    pub fn read_se(&mut self) -> Result<i32> {
        let k = self.read_ue()? as i64;
        let magnitude = (k + 1) / 2;
        Ok(if k % 2 == 0 { -magnitude } else { magnitude } as i32)
    }
}

/// Strip H.264 emulation-prevention bytes (`00 00 03` → `00 00`).
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0usize;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

/// MSB-first bit writer used to build parameter sets in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    bits: usize,
}

#[cfg(test)]
impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit(&mut self, bit: bool) -> &mut Self {
        if self.bits % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> (self.bits % 8);
        }
        self.bits += 1;
        self
    }

    pub fn bits(&mut self, value: u32, count: u32) -> &mut Self {
        for i in (0..count).rev() {
            self.bit((value >> i) & 1 == 1);
        }
        self
    }

    pub fn ue(&mut self, value: u32) -> &mut Self {
        let code = value as u64 + 1;
        let len = 64 - code.leading_zeros();
        for _ in 0..len - 1 {
            self.bit(false);
        }
        for i in (0..len).rev() {
            self.bit((code >> i) & 1 == 1);
        }
        self
    }

    pub fn se(&mut self, value: i32) -> &mut Self {
        let mapped = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs() * 2
        };
        self.ue(mapped)
    }

    /// Append the RBSP stop bit, pad to a byte boundary and insert
    /// emulation-prevention bytes.
    pub fn finish(&mut self) -> Vec<u8> {
        self.bit(true);
        let mut out = Vec::with_capacity(self.bytes.len() + 4);
        let mut zeros = 0usize;
        for byte in std::mem::take(&mut self.bytes) {
            if zeros >= 2 && byte <= 0x03 {
                out.push(0x03);
                zeros = 0;
            }
            zeros = if byte == 0 { zeros + 1 } else { 0 };
            out.push(byte);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_fields() {
        let data = [0b1010_1100, 0xFF];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(1).unwrap(), 1);
        assert_eq!(r.read_bits(3).unwrap(), 0b010);
        assert_eq!(r.read_bits(8).unwrap(), 0b1100_1111);
        assert_eq!(r.remaining(), 4);
    }

    #[test]
    fn ue_known_codes() {
        // 1 | 010 | 011 | 00100 -> 0, 1, 2, 3
        let data = [0b1010_0110, 0b0100_0000];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_ue().unwrap(), 0);
        assert_eq!(r.read_ue().unwrap(), 1);
        assert_eq!(r.read_ue().unwrap(), 2);
        assert_eq!(r.read_ue().unwrap(), 3);
    }

    #[test]
    fn ue_round_trip_boundaries() {
        for v in [0u32, 1, 2, 254, 255, 65_535, 1 << 20, u32::MAX - 1] {
            let rbsp = remove_emulation_prevention(&BitWriter::new().ue(v).finish());
            assert_eq!(BitReader::new(&rbsp).read_ue().unwrap(), v, "value {v}");
        }
    }

    #[test]
    fn se_round_trip_boundaries() {
        for v in [0i32, 1, -1, 2, -2, 1000, -1000, i32::MAX, -i32::MAX] {
            let rbsp = remove_emulation_prevention(&BitWriter::new().se(v).finish());
            assert_eq!(BitReader::new(&rbsp).read_se().unwrap(), v, "value {v}");
        }
    }

    #[test]
    fn se_mapping() {
        // ue 1 -> +1, ue 2 -> -1, ue 3 -> +2
        let data = BitWriter::new().ue(1).ue(2).ue(3).finish();
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_se().unwrap(), 1);
        assert_eq!(r.read_se().unwrap(), -1);
        assert_eq!(r.read_se().unwrap(), 2);
    }

    #[test]
    fn read_past_end_is_error() {
        let mut r = BitReader::new(&[0xFF]);
        assert!(r.read_bits(8).is_ok());
        assert!(matches!(
            r.read_bit(),
            Err(IngestError::SpsDecode {
                kind: SpsErrorKind::Exhausted
            })
        ));
    }

    #[test]
    fn unterminated_ue_is_error() {
        let mut r = BitReader::new(&[0x00, 0x00]);
        assert!(r.read_ue().is_err());
    }

    #[test]
    fn overlong_ue_is_error() {
        let mut r = BitReader::new(&[0x00; 8]);
        assert!(matches!(
            r.read_ue(),
            Err(IngestError::SpsDecode {
                kind: SpsErrorKind::CodeTooLong
            })
        ));
    }

    #[test]
    fn emulation_prevention_removed() {
        let data = [0x67, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00, 0x03];
        assert_eq!(
            remove_emulation_prevention(&data),
            vec![0x67, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x03]
        );
    }
}
