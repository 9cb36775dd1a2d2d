//! Unsigned LEB128, as used for every size and id field in IAMF.
//!
//! Seven payload bits per byte, least significant group first, the high bit
//! signalling that another byte follows. At most 8 bytes are read and the
//! decoded value must fit in 32 bits.

use crate::error::IamfError;

/// The longest encoding accepted on read.
pub const MAX_LEB128_SIZE: usize = 8;

/// Decode from a byte supplier. Returns the value and the number of bytes consumed.
pub(crate) fn decode(next: &mut impl FnMut() -> Option<u8>) -> Result<(u32, usize), IamfError> {
    let mut value = 0_u32;

    for i in 0..MAX_LEB128_SIZE {
        let byte = next().ok_or(IamfError::Truncated("leb128"))?;
        let bits = byte & 0x7f;

        // Groups 0..=3 give 28 bits, group 4 may add the top 4.
        if i <= 3 || (i == 4 && bits < 16) {
            value |= (bits as u32) << (7 * i);
        } else if bits != 0 {
            return Err(IamfError::Leb128Overflow);
        }

        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    Err(IamfError::Leb128TooLong)
}

/// Decode a leb128 value from the start of `buf`.
///
/// Returns the value and the number of bytes it occupied.
pub fn read_leb128(buf: &[u8]) -> Result<(u32, usize), IamfError> {
    let mut iter = buf.iter().copied();
    decode(&mut || iter.next())
}

/// Encode `value` into `buf`, returning the number of bytes written.
///
/// `buf` must hold at least [`leb128_size`] bytes.
pub(crate) fn encode(mut value: u32, buf: &mut [u8]) -> usize {
    let len = leb128_size(value);

    for (i, b) in buf.iter_mut().take(len).enumerate() {
        *b = (value & 0x7f) as u8;
        value >>= 7;
        if i + 1 < len {
            *b |= 0x80;
        }
    }

    len
}

/// Append the leb128 encoding of `value` to `out`. Returns the encoded length.
pub fn write_leb128(value: u32, out: &mut Vec<u8>) -> usize {
    let mut tmp = [0_u8; MAX_LEB128_SIZE];
    let n = encode(value, &mut tmp);
    out.extend_from_slice(&tmp[..n]);
    n
}

/// Number of bytes needed to encode `value`.
pub fn leb128_size(value: u32) -> usize {
    let bits = 32 - value.leading_zeros() as usize;
    ((bits + 6) / 7).max(1)
}

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(v: u32) {
        let mut out = vec![];
        let n = write_leb128(v, &mut out);
        assert_eq!(n, out.len());
        assert_eq!(n, leb128_size(v));
        assert_eq!(read_leb128(&out).unwrap(), (v, n), "value {}", v);
    }

    #[test]
    fn roundtrip_edges() {
        for v in [
            0,
            1,
            0x7f,
            0x80,
            0x3fff,
            0x4000,
            0x1f_ffff,
            0x20_0000,
            0x0fff_ffff,
            0x1000_0000,
            u32::MAX,
        ] {
            roundtrip(v);
        }
    }

    #[test]
    fn roundtrip_random() {
        for _ in 0..10_000 {
            roundtrip(rand::random::<u32>());
        }
    }

    #[test]
    fn sizes() {
        assert_eq!(leb128_size(0), 1);
        assert_eq!(leb128_size(127), 1);
        assert_eq!(leb128_size(128), 2);
        assert_eq!(leb128_size(u32::MAX), 5);
    }

    #[test]
    fn zero_is_one_byte() {
        assert_eq!(read_leb128(&[0x00]).unwrap(), (0, 1));
    }

    #[test]
    fn padded_zero_groups_are_fine() {
        // Non-minimal encodings of 1 are accepted.
        assert_eq!(read_leb128(&[0x81, 0x80, 0x80, 0x00]).unwrap(), (1, 4));
        assert_eq!(
            read_leb128(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x00]).unwrap(),
            (0, 8)
        );
    }

    #[test]
    fn nine_continuation_bytes_fail() {
        let buf = [0x80; 9];
        assert!(matches!(read_leb128(&buf), Err(IamfError::Leb128TooLong)));
    }

    #[test]
    fn overflow_fails() {
        // Fifth group may carry at most 4 bits.
        let buf = [0xff, 0xff, 0xff, 0xff, 0x10];
        assert!(matches!(read_leb128(&buf), Err(IamfError::Leb128Overflow)));
        // Sixth group must be empty.
        let buf = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(read_leb128(&buf), Err(IamfError::Leb128Overflow)));
    }

    #[test]
    fn truncated_fails() {
        assert!(matches!(read_leb128(&[0x80]), Err(IamfError::Truncated(_))));
        assert!(matches!(read_leb128(&[]), Err(IamfError::Truncated(_))));
    }
}
