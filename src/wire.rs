//! # Primitive Wire Types
//!
//! Cursor-based readers and writers for the fixed-width integers,
//! length-prefixed UTF-8 strings, binary blobs, and string pairs that all
//! MQTT packets are built from (sections 1.5.1–1.5.7). Multi-byte integers
//! are big-endian; strings and binary data carry a 16-bit length prefix.
//!
//! Readers return borrows into the source buffer and never copy; the borrow
//! ties the result to the buffer's lifetime. Layers that need to retain data
//! past the parse (the in-flight store, the topic registry) copy into
//! `heapless` containers at that point.

use crate::error::{DecodeError, EncodeError};

pub fn read_u8(cursor: &mut usize, buf: &[u8]) -> Result<u8, DecodeError> {
    let v = *buf.get(*cursor).ok_or(DecodeError::NotEnoughData)?;
    *cursor += 1;
    Ok(v)
}

pub fn read_u16(cursor: &mut usize, buf: &[u8]) -> Result<u16, DecodeError> {
    let bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(DecodeError::NotEnoughData)?;
    *cursor += 2;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub fn read_u32(cursor: &mut usize, buf: &[u8]) -> Result<u32, DecodeError> {
    let bytes = buf
        .get(*cursor..*cursor + 4)
        .ok_or(DecodeError::NotEnoughData)?;
    *cursor += 4;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn write_u8(buf: &mut [u8], v: u8) -> Result<usize, EncodeError> {
    *buf.first_mut().ok_or(EncodeError::BufferTooSmall)? = v;
    Ok(1)
}

pub fn write_u16(buf: &mut [u8], v: u16) -> Result<usize, EncodeError> {
    buf.get_mut(..2)
        .ok_or(EncodeError::BufferTooSmall)?
        .copy_from_slice(&v.to_be_bytes());
    Ok(2)
}

pub fn write_u32(buf: &mut [u8], v: u32) -> Result<usize, EncodeError> {
    buf.get_mut(..4)
        .ok_or(EncodeError::BufferTooSmall)?
        .copy_from_slice(&v.to_be_bytes());
    Ok(4)
}

/// Reads a length-prefixed UTF-8 string, advancing the cursor.
///
/// The returned `&str` borrows the source buffer. Invalid UTF-8 is `BadData`;
/// a prefix pointing past the end of the buffer is `NotEnoughData`.
pub fn read_utf8_string<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a str, DecodeError> {
    let bytes = read_binary_data(cursor, buf)?;
    core::str::from_utf8(bytes).map_err(|_| DecodeError::BadData)
}

/// Writes a length-prefixed UTF-8 string, returning the bytes written.
pub fn write_utf8_string(buf: &mut [u8], s: &str) -> Result<usize, EncodeError> {
    write_binary_data(buf, s.as_bytes())
}

/// Reads a length-prefixed binary blob, advancing the cursor.
pub fn read_binary_data<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let len = read_u16(cursor, buf)? as usize;
    let data = buf
        .get(*cursor..*cursor + len)
        .ok_or(DecodeError::NotEnoughData)?;
    *cursor += len;
    Ok(data)
}

/// Writes a length-prefixed binary blob, returning the bytes written.
pub fn write_binary_data(buf: &mut [u8], data: &[u8]) -> Result<usize, EncodeError> {
    if data.len() > u16::MAX as usize {
        return Err(EncodeError::TooLarge);
    }
    let total = 2 + data.len();
    let out = buf.get_mut(..total).ok_or(EncodeError::BufferTooSmall)?;
    out[..2].copy_from_slice(&(data.len() as u16).to_be_bytes());
    out[2..].copy_from_slice(data);
    Ok(total)
}

/// Reads a UTF-8 string pair (key then value), advancing the cursor.
pub fn read_string_pair<'a>(
    cursor: &mut usize,
    buf: &'a [u8],
) -> Result<(&'a str, &'a str), DecodeError> {
    let key = read_utf8_string(cursor, buf)?;
    let value = read_utf8_string(cursor, buf)?;
    Ok((key, value))
}

/// Writes a UTF-8 string pair, returning the bytes written.
pub fn write_string_pair(buf: &mut [u8], key: &str, value: &str) -> Result<usize, EncodeError> {
    let k = write_utf8_string(buf, key)?;
    let v = write_utf8_string(&mut buf[k..], value)?;
    Ok(k + v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_round_trip() {
        let mut buf = [0u8; 8];
        write_u16(&mut buf, 0xBEEF).unwrap();
        write_u32(&mut buf[2..], 0xDEAD_CAFE).unwrap();
        let mut cursor = 0;
        assert_eq!(read_u16(&mut cursor, &buf).unwrap(), 0xBEEF);
        assert_eq!(read_u32(&mut cursor, &buf).unwrap(), 0xDEAD_CAFE);
        assert_eq!(cursor, 6);
    }

    #[test]
    fn integers_are_big_endian() {
        let mut buf = [0u8; 2];
        write_u16(&mut buf, 0x0102).unwrap();
        assert_eq!(buf, [0x01, 0x02]);
    }

    #[test]
    fn string_round_trip() {
        let mut buf = [0u8; 32];
        let n = write_utf8_string(&mut buf, "hello/world").unwrap();
        assert_eq!(n, 2 + 11);
        let mut cursor = 0;
        assert_eq!(read_utf8_string(&mut cursor, &buf[..n]).unwrap(), "hello/world");
        assert_eq!(cursor, n);
    }

    #[test]
    fn string_pair_round_trip() {
        let mut buf = [0u8; 32];
        let n = write_string_pair(&mut buf, "key", "value").unwrap();
        let mut cursor = 0;
        assert_eq!(read_string_pair(&mut cursor, &buf[..n]).unwrap(), ("key", "value"));
    }

    #[test]
    fn truncated_reads() {
        let mut cursor = 0;
        assert_eq!(read_u16(&mut cursor, &[0x01]), Err(DecodeError::NotEnoughData));
        // Length prefix says 5 bytes, only 2 present.
        let mut cursor = 0;
        assert_eq!(
            read_binary_data(&mut cursor, &[0x00, 0x05, 0xAA, 0xBB]),
            Err(DecodeError::NotEnoughData)
        );
    }

    #[test]
    fn invalid_utf8_is_bad_data() {
        let mut cursor = 0;
        assert_eq!(
            read_utf8_string(&mut cursor, &[0x00, 0x02, 0xFF, 0xFE]),
            Err(DecodeError::BadData)
        );
    }

    #[test]
    fn zero_length_fields() {
        let mut buf = [0u8; 4];
        let n = write_binary_data(&mut buf, b"").unwrap();
        assert_eq!(n, 2);
        let mut cursor = 0;
        assert_eq!(read_binary_data(&mut cursor, &buf[..n]).unwrap(), b"");
    }
}
