use bytes::{Buf, Bytes, BytesMut};

use crate::codec::{FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::io::{decode_u16, decode_utf8, encode_utf8};
use crate::qos::QosLevel;
use crate::TryEncode;

const FLAG_NO_LOCAL: u8 = 0x04;

/// A single filter from a SUBSCRIBE packet's payload. `no_local` is an MQTT
/// 5 subscribe option (section 3.8.3.1); a v3.1.1 client never sets it and
/// it is simply ignored for such sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeFilter {
    pub filter: String,
    pub qos: QosLevel,
    pub no_local: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<SubscribeFilter>,
}

pub fn decode(bytes: &mut Bytes) -> Result<SubscribePacket, DecodeError> {
    let packet_id = decode_u16(bytes)?;
    let mut filters = Vec::new();

    // Filter syntax (wildcard placement) is not checked here: an invalid
    // filter still frames as a valid SUBSCRIBE packet and is rejected
    // per-filter with a SUBACK failure code by the broker instead.
    while !bytes.is_empty() {
        let filter = decode_utf8(bytes)?;
        if bytes.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::TruncatedPacket,
                "SUBSCRIBE filter is missing its options byte".to_string(),
            ));
        }
        let options = bytes.get_u8();
        let qos = QosLevel::try_from(options & 0x03)?;
        let no_local = options & FLAG_NO_LOCAL != 0;
        filters.push(SubscribeFilter {
            filter,
            qos,
            no_local,
        });
    }

    if filters.is_empty() {
        return Err(DecodeError::new(
            DecodeErrorKind::TruncatedPacket,
            "SUBSCRIBE must carry at least one filter".to_string(),
        ));
    }

    Ok(SubscribePacket { packet_id, filters })
}

impl TryEncode for SubscribePacket {
    fn try_encode(&self) -> Result<Bytes, EncodeError> {
        let mut body = BytesMut::new();
        body.extend_from_slice(&self.packet_id.to_be_bytes());
        for entry in &self.filters {
            encode_utf8(&mut body, &entry.filter);
            let mut options = entry.qos.as_u8();
            if entry.no_local {
                options |= FLAG_NO_LOCAL;
            }
            body.extend_from_slice(&[options]);
        }

        let mut out = BytesMut::new();
        FixedHeader {
            packet_type: PacketType::Subscribe,
            flags: 0x02,
            remaining_length: body.len(),
        }
        .write(&mut out)?;
        out.extend_from_slice(&body);
        Ok(out.freeze())
    }
}
