//! Signal Extraction
//!
//! Pulls a bit range out of a response buffer and applies the usual CAN
//! linear scaling. Bits are numbered MSB-first across the whole buffer:
//! bit 0 is the most significant bit of byte 0, bit 8 the most
//! significant bit of byte 1.

use crate::error::SignalError;
use serde::{Deserialize, Serialize};

/// Widest range the accumulator can hold
const MAX_SPAN_BITS: usize = 64;

/// Extract bits `start_bit..=end_bit` and compute
/// `(raw - offset) * multiplier / divisor` with truncating division.
pub fn extract(
    buffer: &[u8],
    start_bit: usize,
    end_bit: usize,
    offset: i64,
    multiplier: i64,
    divisor: i64,
) -> Result<i64, SignalError> {
    let raw = extract_raw(buffer, start_bit, end_bit)?;
    if divisor == 0 {
        return Err(SignalError::ZeroDivisor);
    }

    let scaled = (raw as i128 - offset as i128)
        .checked_mul(multiplier as i128)
        .ok_or(SignalError::Overflow)?
        / divisor as i128;
    i64::try_from(scaled).map_err(|_| SignalError::Overflow)
}

/// Extract bits `start_bit..=end_bit` without scaling
pub fn extract_raw(buffer: &[u8], start_bit: usize, end_bit: usize) -> Result<u64, SignalError> {
    if end_bit < start_bit {
        return Err(SignalError::ReversedRange {
            start: start_bit,
            end: end_bit,
        });
    }
    if end_bit - start_bit + 1 > MAX_SPAN_BITS {
        return Err(SignalError::TooWide {
            start: start_bit,
            end: end_bit,
        });
    }

    let start_byte = start_bit / 8;
    let end_byte = end_bit / 8;
    if end_byte >= buffer.len() {
        return Err(SignalError::OutOfBounds {
            end: end_bit,
            len: buffer.len(),
        });
    }

    // Up to 9 bytes are touched for an unaligned 64-bit range
    let mut acc: u128 = (buffer[start_byte] & (0xFF >> (start_bit % 8))) as u128;
    for &byte in &buffer[start_byte + 1..=end_byte] {
        acc = (acc << 8) | byte as u128;
    }
    acc >>= 7 - (end_bit % 8);

    Ok(acc as u64)
}

/// Location and scaling of one signal inside a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSpec {
    pub start_bit: usize,
    pub end_bit: usize,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "one")]
    pub multiplier: i64,
    #[serde(default = "one")]
    pub divisor: i64,
}

fn one() -> i64 {
    1
}

impl SignalSpec {
    /// Unscaled signal covering `start_bit..=end_bit`
    pub fn new(start_bit: usize, end_bit: usize) -> Self {
        Self {
            start_bit,
            end_bit,
            offset: 0,
            multiplier: 1,
            divisor: 1,
        }
    }

    /// Set the affine scaling
    pub fn scaled(self, offset: i64, multiplier: i64, divisor: i64) -> Self {
        Self {
            offset,
            multiplier,
            divisor,
            ..self
        }
    }

    /// Decode this signal from a response buffer
    pub fn extract(&self, buffer: &[u8]) -> Result<i64, SignalError> {
        extract(
            buffer,
            self.start_bit,
            self.end_bit,
            self.offset,
            self.multiplier,
            self.divisor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_byte_aligned_fields() {
        // 24-bit odometer in bytes 3..=5
        let buffer = [0x62, 0x20, 0x06, 0x01, 0xE2, 0x40];
        assert_eq!(extract(&buffer, 24, 47, 0, 1, 1).unwrap(), 0x01E240);
    }

    #[test]
    fn test_unaligned_field() {
        // byte 4 << 2 | byte 5 >> 6: bits 32..=41
        let buffer = [0, 0, 0, 0, 0x0A, 0xC0, 0, 0];
        assert_eq!(extract_raw(&buffer, 32, 41).unwrap(), (0x0A << 2) | 0x03);
    }

    #[test]
    fn test_high_nibble() {
        let buffer = [0, 0, 0, 0, 0, 0xF3, 0, 0];
        assert_eq!(extract_raw(&buffer, 40, 43).unwrap(), 0x0F);
        assert_eq!(extract_raw(&buffer, 44, 47).unwrap(), 0x03);
    }

    #[test]
    fn test_scaling_truncates_toward_zero() {
        // temperature byte with -40 offset
        let buffer = [0x1E];
        assert_eq!(extract(&buffer, 0, 7, 40, 1, 1).unwrap(), -10);
        // 2 * 100 / 64 = 3.125
        let buffer = [0x00, 0x02];
        assert_eq!(extract(&buffer, 0, 15, 0, 100, 64).unwrap(), 3);
        assert_eq!(extract(&buffer, 0, 15, 4, 100, 64).unwrap(), -3);
    }

    #[test]
    fn test_full_64_bit_unaligned() {
        let buffer = [0x0F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xF0];
        assert_eq!(extract_raw(&buffer, 4, 67).unwrap(), u64::MAX);
    }

    #[test]
    fn test_preconditions_checked() {
        let buffer = [0u8; 8];
        assert_eq!(
            extract(&buffer, 10, 9, 0, 1, 1),
            Err(SignalError::ReversedRange { start: 10, end: 9 })
        );
        assert_eq!(
            extract(&[0u8; 10], 0, 64, 0, 1, 1),
            Err(SignalError::TooWide { start: 0, end: 64 })
        );
        assert_eq!(
            extract(&buffer, 60, 64, 0, 1, 1),
            Err(SignalError::OutOfBounds { end: 64, len: 8 })
        );
        assert_eq!(extract(&buffer, 0, 7, 0, 1, 0), Err(SignalError::ZeroDivisor));
    }

    #[test]
    fn test_overflow_reported() {
        let buffer = [0xFF; 8];
        assert_eq!(
            extract(&buffer, 0, 63, 0, 1, 1),
            Err(SignalError::Overflow)
        );
    }

    #[test]
    fn test_spec_defaults_from_json() {
        let spec: SignalSpec =
            serde_json::from_str(r#"{"start_bit": 24, "end_bit": 39, "divisor": 50}"#).unwrap();
        assert_eq!(spec, SignalSpec::new(24, 39).scaled(0, 1, 50));
        // state of charge 0x1388 / 50 = 100
        let buffer = [0x62, 0x20, 0x02, 0x13, 0x88];
        assert_eq!(spec.extract(&buffer).unwrap(), 100);
    }

    proptest! {
        #[test]
        fn zero_buffer_yields_scaled_offset(
            start in 0usize..64,
            span in 0usize..64,
            offset in -10_000i64..10_000,
            multiplier in -1_000i64..1_000,
            divisor in prop_oneof![-100i64..-1, 1i64..100],
        ) {
            let end = start + span;
            let buffer = vec![0u8; end / 8 + 1];
            let value = extract(&buffer, start, end, offset, multiplier, divisor).unwrap();
            prop_assert_eq!(value, (0 - offset) * multiplier / divisor);
        }

        #[test]
        fn single_byte_matches_shift_and_mask(byte: u8, start in 0usize..8, len in 1usize..=8) {
            prop_assume!(start + len <= 8);
            let end = start + len - 1;
            let expected = ((byte as u64) >> (7 - end)) & ((1u64 << len) - 1);
            prop_assert_eq!(extract_raw(&[byte], start, end).unwrap(), expected);
        }
    }
}
