use bytes::{Bytes, BytesMut};

use crate::codec::{FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::io::{decode_u16, decode_utf8, encode_utf8};
use crate::TryEncode;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<String>,
}

pub fn decode(bytes: &mut Bytes) -> Result<UnsubscribePacket, DecodeError> {
    let packet_id = decode_u16(bytes)?;
    let mut filters = Vec::new();
    while !bytes.is_empty() {
        filters.push(decode_utf8(bytes)?);
    }

    if filters.is_empty() {
        return Err(DecodeError::new(
            DecodeErrorKind::TruncatedPacket,
            "UNSUBSCRIBE must carry at least one filter".to_string(),
        ));
    }

    Ok(UnsubscribePacket { packet_id, filters })
}

impl TryEncode for UnsubscribePacket {
    fn try_encode(&self) -> Result<Bytes, EncodeError> {
        let mut body = BytesMut::new();
        body.extend_from_slice(&self.packet_id.to_be_bytes());
        for filter in &self.filters {
            encode_utf8(&mut body, filter);
        }

        let mut out = BytesMut::new();
        FixedHeader {
            packet_type: PacketType::Unsubscribe,
            flags: 0x02,
            remaining_length: body.len(),
        }
        .write(&mut out)?;
        out.extend_from_slice(&body);
        Ok(out.freeze())
    }
}
