use bytes::{Bytes, BytesMut};

use crate::codec::{FixedHeader, PacketType};
use crate::Encode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingReqPacket;

impl Encode for PingReqPacket {
    fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        FixedHeader {
            packet_type: PacketType::PingReq,
            flags: 0,
            remaining_length: 0,
        }
        .write(&mut out)
        .expect("PINGREQ has no body");
        out.freeze()
    }
}
