// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Little-endian value encoders for data directives.

use crate::core::assembler::error::{AsmError, AsmErrorKind};

/// Encode `value` as exactly `width` little-endian bytes.
///
/// Widths beyond eight bytes are zero-extended.
pub fn encode_le(value: u64, width: usize) -> Result<Vec<u8>, AsmError> {
    if width == 0 {
        return Err(AsmError::new(
            AsmErrorKind::InvalidByteWidth,
            "Size of value should be greater than zero",
            None,
        ));
    }
    let bits = 64 - value.leading_zeros() as usize;
    if bits > width.saturating_mul(8) {
        return Err(AsmError::new(
            AsmErrorKind::ValueOverflow,
            &format!("Value does not fit in a {} bits word", width * 8),
            Some(&format!("${value:X}")),
        ));
    }
    let mut out = vec![0u8; width];
    let le = value.to_le_bytes();
    let n = width.min(le.len());
    out[..n].copy_from_slice(&le[..n]);
    Ok(out)
}

/// Repeat the `width`-byte encoding of `value`, truncated to `size` bytes.
pub fn fill_pattern(size: usize, value: u64, width: usize) -> Result<Vec<u8>, AsmError> {
    let unit = encode_le(value, width)?;
    Ok(unit.iter().copied().cycle().take(size).collect())
}

/// Number of zero bytes needed to move `cursor` up to a multiple of `multiple`.
pub fn align_padding(cursor: u64, multiple: u64) -> Result<u64, AsmError> {
    if multiple == 0 {
        return Err(AsmError::new(
            AsmErrorKind::InvalidAlignment,
            "Alignment must be greater than zero",
            None,
        ));
    }
    Ok((multiple - cursor % multiple) % multiple)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_little_endian() {
        assert_eq!(encode_le(0x1234, 2).unwrap(), vec![0x34, 0x12]);
        assert_eq!(encode_le(0xdeadbeef, 4).unwrap(), vec![0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(encode_le(1, 10).unwrap(), vec![1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn value_overflow_is_detected() {
        assert_eq!(encode_le(255, 1).unwrap(), vec![0xff]);
        assert_eq!(
            encode_le(256, 1).unwrap_err().kind(),
            AsmErrorKind::ValueOverflow
        );
    }

    #[test]
    fn zero_width_is_rejected() {
        assert_eq!(
            encode_le(0, 0).unwrap_err().kind(),
            AsmErrorKind::InvalidByteWidth
        );
        assert_eq!(
            fill_pattern(4, 0, 0).unwrap_err().kind(),
            AsmErrorKind::InvalidByteWidth
        );
    }

    #[test]
    fn fill_truncates_repetition() {
        assert_eq!(
            fill_pattern(5, 0xabcd, 2).unwrap(),
            vec![0xcd, 0xab, 0xcd, 0xab, 0xcd]
        );
        assert_eq!(fill_pattern(0, 0xabcd, 2).unwrap(), Vec::<u8>::new());
        assert_eq!(fill_pattern(3, 0x41, 1).unwrap(), vec![0x41; 3]);
    }

    #[test]
    fn align_padding_reaches_next_multiple() {
        assert_eq!(align_padding(0, 4).unwrap(), 0);
        assert_eq!(align_padding(5, 4).unwrap(), 3);
        assert_eq!(align_padding(8, 4).unwrap(), 0);
        assert_eq!(
            align_padding(3, 0).unwrap_err().kind(),
            AsmErrorKind::InvalidAlignment
        );
    }

    proptest! {
        #[test]
        fn fill_length_matches_size(size in 0usize..256, value in any::<u16>(), width in 2usize..6) {
            let bytes = fill_pattern(size, u64::from(value), width).unwrap();
            prop_assert_eq!(bytes.len(), size);
            if size >= 2 {
                prop_assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), value);
            }
        }

        #[test]
        fn align_padding_lands_on_multiple(cursor in 0u64..1_000_000, multiple in 1u64..4096) {
            let pad = align_padding(cursor, multiple).unwrap();
            prop_assert!(pad < multiple);
            prop_assert_eq!((cursor + pad) % multiple, 0);
        }
    }
}
