// VCDIFF variable-length integers (RFC 3284, Section 2).
//
// Base-128, most-significant group first; every byte except the last has
// bit 7 set. Readers work on byte slices so the chunk-fed decoder can tell
// "not enough bytes yet" apart from "malformed".

/// Longest encoding of a 64-bit value (ceil(64 / 7)).
pub const MAX_VARINT_LEN: usize = 10;

const U32_OVERFLOW_MASK: u32 = 0xFE00_0000;
const U64_OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

/// Errors raised while reading a varint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VarIntError {
    /// The slice ended before the terminating byte.
    #[error("varint truncated")]
    Truncated,
    /// The value does not fit the requested integer width.
    #[error("varint overflow")]
    Overflow,
}

/// Append `num` to `out`.
pub fn push_u64(out: &mut Vec<u8>, num: u64) {
    let mut scratch = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut scratch);
    out.extend_from_slice(&scratch[MAX_VARINT_LEN - len..]);
}

/// Encode `num` right-aligned into `buf`; returns the encoded length.
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = MAX_VARINT_LEN;
    loop {
        i -= 1;
        buf[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_VARINT_LEN - 1] &= 0x7F;
    MAX_VARINT_LEN - i
}

/// Encoded length of `num` in bytes.
#[inline]
pub fn sizeof_u64(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    (bits.max(1).div_ceil(7) as usize).min(MAX_VARINT_LEN)
}

/// Read a `u64` from the front of `data`; returns the value and bytes consumed.
pub fn read_u64(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if val & U64_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarIntError::Truncated)
}

/// Read a `u32` from the front of `data`.
pub fn read_u32(data: &[u8]) -> Result<(u32, usize), VarIntError> {
    let mut val: u32 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if val & U32_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarIntError::Truncated)
}
