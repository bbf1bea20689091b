use bytes::{Bytes, BytesMut};

use crate::codec::{FixedHeader, PacketType};
use crate::Encode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingRespPacket;

impl Encode for PingRespPacket {
    fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        FixedHeader {
            packet_type: PacketType::PingResp,
            flags: 0,
            remaining_length: 0,
        }
        .write(&mut out)
        .expect("PINGRESP has no body");
        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_to_two_bytes() {
        let encoded = PingRespPacket.encode();
        assert_eq!(&encoded[..], &[0xd0, 0x00]);
    }
}
