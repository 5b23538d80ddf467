use crate::error::{MorselError, Result};

/// Variable-byte encoding: 7 data bits per byte, least significant group
/// first, high bit set on the final byte
pub fn encode_vbyte(value: u32, output: &mut Vec<u8>) {
    encode_vbyte_u64(value as u64, output)
}

/// 64-bit form of [`encode_vbyte`]
pub fn encode_vbyte_u64(value: u64, output: &mut Vec<u8>) {
    let mut v = value;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            output.push(byte | 0x80); // Set high bit to indicate last byte
            break;
        } else {
            output.push(byte);
        }
    }
}

/// Decode a variable-byte encoded u32
pub fn decode_vbyte(input: &[u8], pos: &mut usize) -> Result<u32> {
    let value = decode_vbyte_u64(input, pos)?;
    u32::try_from(value).map_err(|_| MorselError::format("vbyte value exceeds u32"))
}

/// Decode a variable-byte encoded u64
pub fn decode_vbyte_u64(input: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;

    loop {
        let Some(&byte) = input.get(*pos) else {
            return Err(MorselError::format("unexpected end of vbyte"));
        };
        *pos += 1;

        let group = (byte & 0x7F) as u64;
        if group > u64::MAX >> shift {
            return Err(MorselError::format("vbyte value too large"));
        }
        result |= group << shift;

        if byte & 0x80 != 0 {
            return Ok(result);
        }

        shift += 7;
        if shift > 63 {
            return Err(MorselError::format("vbyte value too large"));
        }
    }
}

/// Number of bytes `encode_vbyte` emits for `value`
pub fn vbyte_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Map a signed delta onto an unsigned varint-friendly value
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Read a little-endian f32
pub fn read_f32_le(input: &[u8], pos: &mut usize) -> Result<f32> {
    let end = *pos + 4;
    let bytes = input
        .get(*pos..end)
        .ok_or_else(|| MorselError::format("unexpected end of f32"))?;
    *pos = end;
    Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vbyte_encoding() {
        let mut output = Vec::new();

        encode_vbyte(0, &mut output);
        encode_vbyte(127, &mut output);
        encode_vbyte(128, &mut output);
        encode_vbyte(16383, &mut output);
        encode_vbyte(1_000_000, &mut output);
        encode_vbyte(u32::MAX, &mut output);

        let mut pos = 0;
        assert_eq!(decode_vbyte(&output, &mut pos).unwrap(), 0);
        assert_eq!(decode_vbyte(&output, &mut pos).unwrap(), 127);
        assert_eq!(decode_vbyte(&output, &mut pos).unwrap(), 128);
        assert_eq!(decode_vbyte(&output, &mut pos).unwrap(), 16383);
        assert_eq!(decode_vbyte(&output, &mut pos).unwrap(), 1_000_000);
        assert_eq!(decode_vbyte(&output, &mut pos).unwrap(), u32::MAX);
        assert_eq!(pos, output.len());
    }

    #[test]
    fn test_vbyte_u64_overflow() {
        let mut max = Vec::new();
        encode_vbyte_u64(u64::MAX, &mut max);
        assert_eq!(max.len(), 10);
        let mut pos = 0;
        assert_eq!(decode_vbyte_u64(&max, &mut pos).unwrap(), u64::MAX);

        // Tenth group carrying more than the one remaining bit
        let mut wide = vec![0x7F; 9];
        wide.push(0x82);
        let mut pos = 0;
        assert!(decode_vbyte_u64(&wide, &mut pos).is_err());

        let endless = vec![0x00; 11];
        let mut pos = 0;
        assert!(decode_vbyte_u64(&endless, &mut pos).is_err());
    }

    #[test]
    fn test_vbyte_is_minimal() {
        for (value, expected_len) in [
            (0u32, 1usize),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (2_097_151, 3),
            (2_097_152, 4),
            (268_435_455, 4),
            (268_435_456, 5),
            (u32::MAX, 5),
        ] {
            let mut out = Vec::new();
            encode_vbyte(value, &mut out);
            assert_eq!(out.len(), expected_len, "value {}", value);
            assert_eq!(vbyte_len(value as u64), expected_len);
            // Only the last byte carries the terminator bit
            assert!(out[..out.len() - 1].iter().all(|b| b & 0x80 == 0));
            assert!(out[out.len() - 1] & 0x80 != 0);
        }
    }

    #[test]
    fn test_vbyte_roundtrip_sweep() {
        let mut value: u64 = 1;
        while value <= u32::MAX as u64 {
            for v in [value - 1, value, value + 1] {
                let v = v.min(u32::MAX as u64) as u32;
                let mut out = Vec::new();
                encode_vbyte(v, &mut out);
                let mut pos = 0;
                assert_eq!(decode_vbyte(&out, &mut pos).unwrap(), v);
            }
            value *= 3;
        }
    }

    #[test]
    fn test_truncated_vbyte() {
        let mut pos = 0;
        assert!(decode_vbyte(&[0x01, 0x02], &mut pos).is_err());
    }

    #[test]
    fn test_zigzag() {
        for v in [0i64, -1, 1, -2, 2, i32::MAX as i64, -(u32::MAX as i64)] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
    }
}
