use bytes::{Bytes, BytesMut};

use crate::codec::{FixedHeader, PacketType};
use crate::err::DecodeError;
use crate::io::decode_u16;
use crate::Encode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PubRecPacket {
    pub packet_id: u16,
}

pub fn decode(bytes: &mut Bytes) -> Result<PubRecPacket, DecodeError> {
    Ok(PubRecPacket {
        packet_id: decode_u16(bytes)?,
    })
}

impl Encode for PubRecPacket {
    fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        FixedHeader {
            packet_type: PacketType::PubRec,
            flags: 0,
            remaining_length: 2,
        }
        .write(&mut out)
        .expect("PUBREC remaining length always fits");
        out.extend_from_slice(&self.packet_id.to_be_bytes());
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let packet = PubRecPacket { packet_id: 9 };
        let encoded = packet.encode();
        let (_, consumed) = FixedHeader::parse(&encoded).unwrap().unwrap();
        let mut body = encoded.slice(consumed..);
        assert_eq!(decode(&mut body).unwrap(), packet);
    }
}
