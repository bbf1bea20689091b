use bytes::{Bytes, BytesMut};

use crate::codec::{FixedHeader, PacketType};
use crate::Encode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisconnectPacket;

impl Encode for DisconnectPacket {
    fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        FixedHeader {
            packet_type: PacketType::Disconnect,
            flags: 0,
            remaining_length: 0,
        }
        .write(&mut out)
        .expect("DISCONNECT has no body");
        out.freeze()
    }
}
