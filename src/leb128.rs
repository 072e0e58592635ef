use crate::{dex_err, error::DexError, Result};

/// A 32-bit value never needs more than five LEB128 bytes.
pub const MAX_LEB128_LEN: usize = 5;

/// Maps a failed read at `start` to the matching fault. Nothing at all to read
/// is a truncated stream, anything else is a broken varint.
#[inline]
fn check_start(data_in: &[u8], start: usize) -> Result<()> {
    if start >= data_in.len() {
        return dex_err!(TruncatedStream { offset: start });
    }
    Ok(())
}

#[inline(always)]
pub fn decode_uleb128_off(data_in: &[u8], pos: &mut usize) -> Result<u32> {
    let start = *pos;
    check_start(data_in, start)?;
    match leb128fmt::decode_uint_slice::<u32, 32>(data_in, pos) {
        // the fifth group only has room for the top four bits
        Ok(_) if *pos - start == MAX_LEB128_LEN && data_in[*pos - 1] & 0x70 != 0 => {
            *pos = start;
            dex_err!(MalformedVarint { offset: start })
        }
        Ok(value) => Ok(value),
        Err(_) => {
            *pos = start;
            dex_err!(MalformedVarint { offset: start })
        }
    }
}

#[inline(always)]
pub fn decode_sleb128_off(data_in: &[u8], pos: &mut usize) -> Result<i32> {
    let start = *pos;
    check_start(data_in, start)?;
    match leb128fmt::decode_sint_slice::<i32, 32>(data_in, pos) {
        Ok(value) => Ok(value),
        Err(_) => {
            *pos = start;
            dex_err!(MalformedVarint { offset: start })
        }
    }
}

/// Decodes a ULEB128p1 value, `0` maps to `-1` (NO_INDEX).
#[inline(always)]
pub fn decode_uleb128p1_off(data_in: &[u8], pos: &mut usize) -> Result<i32> {
    let value = decode_uleb128_off(data_in, pos)?;
    Ok(value.wrapping_sub(1) as i32)
}

#[inline(always)]
pub fn decode_uleb128(data_in: &[u8]) -> Result<(u32, usize)> {
    let mut pos = 0;
    let value = decode_uleb128_off(data_in, &mut pos)?;
    Ok((value, pos))
}

#[inline(always)]
pub fn decode_sleb128(data_in: &[u8]) -> Result<(i32, usize)> {
    let mut pos = 0;
    let value = decode_sleb128_off(data_in, &mut pos)?;
    Ok((value, pos))
}

// every 32-bit value fits, so the encoders never come back empty
pub fn encode_uleb128(data_out: &mut Vec<u8>, value: u32) -> usize {
    leb128fmt::encode_u32(value).map_or(0, |(bytes, len)| {
        data_out.extend_from_slice(&bytes[..len]);
        len
    })
}

pub fn encode_sleb128(data_out: &mut Vec<u8>, value: i32) -> usize {
    leb128fmt::encode_s32(value).map_or(0, |(bytes, len)| {
        data_out.extend_from_slice(&bytes[..len]);
        len
    })
}

/// Encodes `value + 1`, so that `-1` (NO_INDEX) becomes `0`. Anything below
/// `-1` has no representation.
pub fn encode_uleb128p1(data_out: &mut Vec<u8>, value: i32) -> Result<usize> {
    if value < -1 {
        return dex_err!(NegativeIndex { value });
    }
    Ok(encode_uleb128(data_out, (value + 1) as u32))
}

#[inline]
pub fn uleb128_len(value: u32) -> usize {
    let bits = 32 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}
