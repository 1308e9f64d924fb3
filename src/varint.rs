//! # Variable Byte Integer Codec
//!
//! The 1–4 byte base-128 integer encoding MQTT uses for the remaining-length
//! and property-length fields (section 1.5.5). Each byte carries seven value
//! bits; the top bit is a continuation flag and the terminating byte has it
//! clear.
//!
//! Decoding tolerates non-canonical (overlong) encodings such as a two-byte
//! encoding of 1, since they occur on the wire; encoding always emits the
//! canonical shortest form.

use crate::error::{DecodeError, EncodeError};

/// The largest value representable in four VarInt bytes.
pub const MAX_VARINT: u32 = 268_435_455;

/// Number of bytes the canonical encoding of `value` occupies.
///
/// Values above [`MAX_VARINT`] are not encodable; this reports 4 for them so
/// size pre-computation stays total, and [`encode`] rejects them.
pub const fn encoded_size(value: u32) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Encodes `value` into `buf`, returning the number of bytes written.
pub fn encode(value: u32, buf: &mut [u8]) -> Result<usize, EncodeError> {
    if value > MAX_VARINT {
        return Err(EncodeError::TooLarge);
    }
    let mut val = value;
    let mut i = 0;
    loop {
        let mut byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            byte |= 0x80;
        }
        *buf.get_mut(i).ok_or(EncodeError::BufferTooSmall)? = byte;
        i += 1;
        if val == 0 {
            return Ok(i);
        }
    }
}

/// Decodes a VarInt from the start of `buf`.
///
/// Returns the value and the number of bytes consumed. Fails with
/// `NotEnoughData` when the buffer ends before a terminating byte, and with
/// `BadData` when a fifth continuation byte would be required.
pub fn decode(buf: &[u8]) -> Result<(u32, usize), DecodeError> {
    let mut value: u32 = 0;
    let mut shift = 0;
    for i in 0..4 {
        let byte = *buf.get(i).ok_or(DecodeError::NotEnoughData)?;
        value |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(DecodeError::BadData)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_boundaries() {
        for &v in &[
            0u32,
            1,
            127,
            128,
            16_383,
            16_384,
            2_097_151,
            2_097_152,
            MAX_VARINT - 1,
            MAX_VARINT,
        ] {
            let mut buf = [0u8; 4];
            let written = encode(v, &mut buf).unwrap();
            assert_eq!(written, encoded_size(v));
            assert_eq!(decode(&buf[..written]).unwrap(), (v, written));
        }
    }

    #[test]
    fn known_encodings() {
        let mut buf = [0u8; 4];
        assert_eq!(encode(0, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0x00);
        assert_eq!(encode(128, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0x80, 0x01]);
        assert_eq!(encode(MAX_VARINT, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn over_range_rejected() {
        let mut buf = [0u8; 4];
        assert_eq!(encode(MAX_VARINT + 1, &mut buf), Err(EncodeError::TooLarge));
    }

    #[test]
    fn small_buffer_rejected() {
        let mut buf = [0u8; 1];
        assert_eq!(encode(128, &mut buf), Err(EncodeError::BufferTooSmall));
    }

    #[test]
    fn truncated_is_not_enough_data() {
        assert_eq!(decode(&[]), Err(DecodeError::NotEnoughData));
        assert_eq!(decode(&[0x80]), Err(DecodeError::NotEnoughData));
        assert_eq!(decode(&[0xFF, 0xFF, 0xFF]), Err(DecodeError::NotEnoughData));
    }

    #[test]
    fn five_continuations_is_bad_data() {
        assert_eq!(decode(&[0x80, 0x80, 0x80, 0x80, 0x01]), Err(DecodeError::BadData));
    }

    #[test]
    fn non_canonical_accepted() {
        // 1 encoded on two bytes; tolerated on input, never produced.
        assert_eq!(decode(&[0x81, 0x00]).unwrap(), (1, 2));
    }
}
