//! Variable-length integer encoding used inside frame payloads.
//!
//! Each value is emitted msb-first in 7-bit groups: up to four leading bytes
//! with the continuation bit (0x80) set, then a final byte without it. The
//! encoder picks the shortest form that sign-extends back to the original
//! 32-bit value, so small negative numbers stay short.
//!
//! | Signed range                 | Bytes |
//! |------------------------------|-------|
//! | `-32 ..= 95`                 | 1     |
//! | `-4096 ..= 12287`            | 2     |
//! | `-524288 ..= 1572863`        | 3     |
//! | `-67108864 ..= 201326591`    | 4     |
//! | everything else              | 5     |
//!
//! ```
//! use stepcore_common::protocol::vlq::{decode_vlq, encode_vlq, MAX_VLQ_LEN};
//!
//! let mut buf = [0u8; MAX_VLQ_LEN];
//! let len = encode_vlq(1000, &mut buf);
//! assert_eq!(&buf[..len], &[0x87, 0x68]);
//! assert_eq!(decode_vlq(&buf[..len]).unwrap(), (1000, 2));
//! ```

use super::ProtocolError;

/// Maximum encoded length of one 32-bit value.
pub const MAX_VLQ_LEN: usize = 5;

const CONTINUATION_BIT: u8 = 0x80;
const DATA_MASK: u32 = 0x7f;

/// Encode `v` into `buf`, returning the number of bytes written (1-5).
#[inline]
pub fn encode_vlq(v: u32, buf: &mut [u8; MAX_VLQ_LEN]) -> usize {
    let sv = v as i32;
    let len = if (-(1 << 5)..(3 << 5)).contains(&sv) {
        1
    } else if (-(1 << 12)..(3 << 12)).contains(&sv) {
        2
    } else if (-(1 << 19)..(3 << 19)).contains(&sv) {
        3
    } else if (-(1 << 26)..(3 << 26)).contains(&sv) {
        4
    } else {
        5
    };
    for (i, slot) in buf.iter_mut().take(len).enumerate() {
        let shift = 7 * (len - 1 - i);
        let chunk = ((v >> shift) & DATA_MASK) as u8;
        *slot = if i + 1 < len {
            chunk | CONTINUATION_BIT
        } else {
            chunk
        };
    }
    len
}

/// Number of bytes [`encode_vlq`] would produce for `v`.
#[inline]
#[must_use]
pub fn vlq_len(v: u32) -> usize {
    let mut buf = [0u8; MAX_VLQ_LEN];
    encode_vlq(v, &mut buf)
}

/// Decode one value from the front of `data`.
///
/// Returns the raw 32-bit pattern (cast to `i32` for signed fields) and the
/// number of bytes consumed.
pub fn decode_vlq(data: &[u8]) -> Result<(u32, usize), ProtocolError> {
    let first = *data.first().ok_or(ProtocolError::Truncated)?;
    let mut v = u32::from(first) & DATA_MASK;
    if first & 0x60 == 0x60 {
        // Sign extend.
        v |= !0x1f;
    }
    let mut c = first;
    let mut pos = 1;
    while c & CONTINUATION_BIT != 0 {
        if pos >= MAX_VLQ_LEN {
            return Err(ProtocolError::Overlong);
        }
        c = *data.get(pos).ok_or(ProtocolError::Truncated)?;
        v = (v << 7) | (u32::from(c) & DATA_MASK);
        pos += 1;
    }
    Ok((v, pos))
}

/// Decode every value in `data`.
pub fn decode_all(mut data: &[u8]) -> Result<Vec<u32>, ProtocolError> {
    let mut out = Vec::new();
    while !data.is_empty() {
        let (v, used) = decode_vlq(data)?;
        out.push(v);
        data = &data[used..];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encoded(v: u32) -> Vec<u8> {
        let mut buf = [0u8; MAX_VLQ_LEN];
        let len = encode_vlq(v, &mut buf);
        buf[..len].to_vec()
    }

    #[test]
    fn range_boundaries_pick_shortest_form() {
        assert_eq!(vlq_len(0), 1);
        assert_eq!(vlq_len(95), 1);
        assert_eq!(vlq_len(96), 2);
        assert_eq!(vlq_len((-32i32) as u32), 1);
        assert_eq!(vlq_len((-33i32) as u32), 2);
        assert_eq!(vlq_len(12287), 2);
        assert_eq!(vlq_len(12288), 3);
        assert_eq!(vlq_len(0x7fff_ffff), 5);
        assert_eq!(vlq_len(0x8000_0000), 5);
    }

    #[test]
    fn small_values_are_single_byte() {
        assert_eq!(encoded(5), vec![0x05]);
        assert_eq!(encoded((-1i32) as u32), vec![0x7f]);
    }

    #[test]
    fn negative_add_round_trips() {
        let v = (-300i32) as u32;
        let bytes = encoded(v);
        let (decoded, used) = decode_vlq(&bytes).unwrap();
        assert_eq!(decoded as i32, -300);
        assert_eq!(used, bytes.len());
    }

    #[test]
    fn truncated_input_is_reported() {
        assert_eq!(decode_vlq(&[]), Err(ProtocolError::Truncated));
        assert_eq!(decode_vlq(&[0x87]), Err(ProtocolError::Truncated));
    }

    #[test]
    fn overlong_input_is_reported() {
        assert_eq!(
            decode_vlq(&[0x81, 0x81, 0x81, 0x81, 0x81, 0x01]),
            Err(ProtocolError::Overlong)
        );
    }

    #[test]
    fn decode_all_splits_values() {
        let mut payload = Vec::new();
        for v in [7u32, 1000, 40_000_000, (-3i32) as u32] {
            payload.extend(encoded(v));
        }
        assert_eq!(
            decode_all(&payload).unwrap(),
            vec![7, 1000, 40_000_000, (-3i32) as u32]
        );
    }

    proptest! {
        #[test]
        fn any_u32_round_trips(v in any::<u32>()) {
            let bytes = encoded(v);
            prop_assert!(bytes.len() <= MAX_VLQ_LEN);
            prop_assert_eq!(decode_vlq(&bytes).unwrap(), (v, bytes.len()));
        }
    }
}
