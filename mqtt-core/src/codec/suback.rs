use bytes::{Buf, Bytes, BytesMut};

use crate::codec::{FixedHeader, PacketType};
use crate::err::DecodeError;
use crate::io::decode_u16;
use crate::qos::{QosLevel, SubAckQoS};
use crate::{Encode, ProtocolLevel};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub protocol_level: ProtocolLevel,
    pub results: Vec<SubAckQoS>,
}

/// Decodes a SUBACK body. Requires the protocol level up front since the v3
/// and v5 failure-code conventions differ and decoding alone can't tell
/// them apart; the broker only ever decodes its own acks in tests, so this
/// is not on the hot path.
pub fn decode(bytes: &mut Bytes, protocol_level: ProtocolLevel) -> Result<SubAckPacket, DecodeError> {
    let packet_id = decode_u16(bytes)?;
    let mut results = Vec::new();
    while bytes.has_remaining() {
        let code = bytes.get_u8();
        let result = if code == crate::qos::suback_failure_code(protocol_level) {
            SubAckQoS::Failure
        } else {
            SubAckQoS::Granted(QosLevel::try_from(code)?)
        };
        results.push(result);
    }
    Ok(SubAckPacket {
        packet_id,
        protocol_level,
        results,
    })
}

impl Encode for SubAckPacket {
    fn encode(&self) -> Bytes {
        let mut body = BytesMut::new();
        body.extend_from_slice(&self.packet_id.to_be_bytes());
        for result in &self.results {
            body.extend_from_slice(&[result.as_u8(self.protocol_level)]);
        }

        let mut out = BytesMut::new();
        FixedHeader {
            packet_type: PacketType::SubAck,
            flags: 0,
            remaining_length: body.len(),
        }
        .write(&mut out)
        .expect("SUBACK body never exceeds the remaining length limit");
        out.extend_from_slice(&body);
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_mixed_results() {
        let packet = SubAckPacket {
            packet_id: 2,
            protocol_level: ProtocolLevel::V4,
            results: vec![
                SubAckQoS::Granted(QosLevel::AtLeastOnce),
                SubAckQoS::Failure,
            ],
        };
        let encoded = packet.encode();
        let (_, consumed) = FixedHeader::parse(&encoded).unwrap().unwrap();
        let mut body = encoded.slice(consumed..);
        assert_eq!(decode(&mut body, ProtocolLevel::V4).unwrap(), packet);
    }
}
