//! Remaining-length and length-prefixed string/byte helpers shared by every
//! packet codec. Pure byte manipulation: no I/O happens in this module.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind};

/// Remaining-length fields longer than 4 bytes are malformed per MQTT 3.1.1
/// section 2.2.3.
const MAX_REMAINING_LEN_BYTES: usize = 4;
const MAX_REMAINING_LEN: usize = 128usize.pow(4) - 1;

/// Encodes `len` as a 1-4 byte MQTT remaining-length field.
pub fn encode_remaining_length(bytes: &mut BytesMut, mut len: usize) -> Result<(), EncodeError> {
    if len > MAX_REMAINING_LEN {
        return Err(EncodeError::new(
            EncodeErrorKind::OversizedPayload,
            format!("packet length {len} exceeds the maximum encodable remaining length"),
        ));
    }

    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        bytes.put_u8(byte);
        if len == 0 {
            break;
        }
    }

    Ok(())
}

/// Decodes a remaining-length field from the front of `bytes`, returning
/// `(bytes consumed, remaining length)`. Does not advance `bytes` itself —
/// separated from the generic `Buf::advance` call so callers can decide
/// whether they already own a mutable cursor.
pub fn decode_remaining_length(bytes: &[u8]) -> Result<(usize, usize), DecodeError> {
    let mut multiplier: usize = 1;
    let mut len: usize = 0;

    for (i, byte) in bytes.iter().enumerate().take(MAX_REMAINING_LEN_BYTES + 1) {
        if i == MAX_REMAINING_LEN_BYTES {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                "remaining length field longer than 4 bytes".to_string(),
            ));
        }

        len += (*byte as usize & 0x7f) * multiplier;
        multiplier *= 128;

        if byte & 0x80 == 0 {
            return Ok((i + 1, len));
        }
    }

    Err(DecodeError::new(
        DecodeErrorKind::TruncatedPacket,
        "remaining length field was truncated".to_string(),
    ))
}

pub fn encode_utf8(bytes: &mut BytesMut, val: &str) {
    encode_bytes(bytes, val.as_bytes());
}

pub fn encode_bytes(bytes: &mut BytesMut, val: &[u8]) {
    bytes.put_u16(val.len() as u16);
    bytes.put_slice(val);
}

pub fn decode_utf8(bytes: &mut Bytes) -> Result<String, DecodeError> {
    let slice = decode_bytes(bytes)?;
    String::from_utf8(slice.to_vec())
        .map_err(|e| DecodeError::new(DecodeErrorKind::Utf8ParseError, e.to_string()))
}

pub fn decode_bytes(bytes: &mut Bytes) -> Result<Bytes, DecodeError> {
    let len = decode_u16_len(bytes)?;
    let slice = bytes.slice(0..len as usize);
    bytes.advance(len as usize);
    Ok(slice)
}

pub fn decode_u16_len(bytes: &mut Bytes) -> Result<u16, DecodeError> {
    if bytes.len() < 2 {
        return Err(DecodeError::new(
            DecodeErrorKind::TruncatedPacket,
            "not enough bytes remain for a length prefix".to_string(),
        ));
    }
    let len = bytes.get_u16();
    if len as usize > bytes.len() {
        return Err(DecodeError::new(
            DecodeErrorKind::MalformedLength,
            format!(
                "declared length {len} overruns the remaining {} bytes of the packet",
                bytes.len()
            ),
        ));
    }
    Ok(len)
}

pub fn decode_u16(bytes: &mut Bytes) -> Result<u16, DecodeError> {
    if bytes.len() < 2 {
        return Err(DecodeError::new(
            DecodeErrorKind::TruncatedPacket,
            "not enough bytes remain for a packet identifier".to_string(),
        ));
    }
    Ok(bytes.get_u16())
}
