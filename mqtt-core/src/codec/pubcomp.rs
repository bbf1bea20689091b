use bytes::{Bytes, BytesMut};

use crate::codec::{FixedHeader, PacketType};
use crate::err::DecodeError;
use crate::io::decode_u16;
use crate::Encode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PubCompPacket {
    pub packet_id: u16,
}

pub fn decode(bytes: &mut Bytes) -> Result<PubCompPacket, DecodeError> {
    Ok(PubCompPacket {
        packet_id: decode_u16(bytes)?,
    })
}

impl Encode for PubCompPacket {
    fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        FixedHeader {
            packet_type: PacketType::PubComp,
            flags: 0,
            remaining_length: 2,
        }
        .write(&mut out)
        .expect("PUBCOMP remaining length always fits");
        out.extend_from_slice(&self.packet_id.to_be_bytes());
        out.freeze()
    }
}
