use bytes::{Bytes, BytesMut};

use crate::codec::{FixedHeader, PacketType};
use crate::err::DecodeError;
use crate::io::decode_u16;
use crate::Encode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PubRelPacket {
    pub packet_id: u16,
}

pub fn decode(bytes: &mut Bytes) -> Result<PubRelPacket, DecodeError> {
    Ok(PubRelPacket {
        packet_id: decode_u16(bytes)?,
    })
}

impl Encode for PubRelPacket {
    fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        FixedHeader {
            packet_type: PacketType::PubRel,
            flags: 0x02,
            remaining_length: 2,
        }
        .write(&mut out)
        .expect("PUBREL remaining length always fits");
        out.extend_from_slice(&self.packet_id.to_be_bytes());
        out.freeze()
    }
}
