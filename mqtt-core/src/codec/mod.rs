//! Packet framing: the fixed header shared by every MQTT control packet,
//! and the [`MqttPacket`] enum that ties the per-type modules together.

use bytes::{BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind};
use crate::io::{decode_remaining_length, encode_remaining_length};
use crate::{Encode, TryEncode, MAX_PACKET_SIZE};

pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod pingreq;
pub mod pingresp;
pub mod puback;
pub mod pubcomp;
pub mod publish;
pub mod pubrec;
pub mod pubrel;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;

pub use connack::ConnAckPacket;
pub use connect::{ConnectPacket, Will};
pub use disconnect::DisconnectPacket;
pub use pingreq::PingReqPacket;
pub use pingresp::PingRespPacket;
pub use puback::PubAckPacket;
pub use pubcomp::PubCompPacket;
pub use publish::PublishPacket;
pub use pubrec::PubRecPacket;
pub use pubrel::PubRelPacket;
pub use suback::SubAckPacket;
pub use subscribe::{SubscribeFilter, SubscribePacket};
pub use unsuback::UnsubAckPacket;
pub use unsubscribe::UnsubscribePacket;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            1 => Ok(Self::Connect),
            2 => Ok(Self::ConnAck),
            3 => Ok(Self::Publish),
            4 => Ok(Self::PubAck),
            5 => Ok(Self::PubRec),
            6 => Ok(Self::PubRel),
            7 => Ok(Self::PubComp),
            8 => Ok(Self::Subscribe),
            9 => Ok(Self::SubAck),
            10 => Ok(Self::Unsubscribe),
            11 => Ok(Self::UnsubAck),
            12 => Ok(Self::PingReq),
            13 => Ok(Self::PingResp),
            14 => Ok(Self::Disconnect),
            _ => Err(DecodeError::new(
                DecodeErrorKind::PacketType,
                format!("{value} is not a known packet type"),
            )),
        }
    }
}

/// The fixed 2-5 byte header present on every control packet: packet type,
/// per-type flag bits and the remaining length of the rest of the packet.
#[derive(Clone, Copy, Debug)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: usize,
}

impl FixedHeader {
    /// Attempts to parse a fixed header from the start of `buf`. Returns
    /// `Ok(None)` rather than an error when `buf` does not yet hold a
    /// complete header, so callers can keep buffering without treating a
    /// short read as malformed input.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, DecodeError> {
        if buf.is_empty() {
            return Ok(None);
        }

        let first = buf[0];
        let packet_type = PacketType::try_from(first >> 4)?;
        let flags = first & 0x0f;
        validate_flags(packet_type, flags)?;

        match decode_remaining_length(&buf[1..]) {
            Ok((len_bytes, remaining_length)) => {
                let total = 1 + len_bytes + remaining_length;
                if total > MAX_PACKET_SIZE {
                    return Err(DecodeError::new(
                        DecodeErrorKind::OversizedPacket,
                        format!("packet of {total} bytes exceeds the {MAX_PACKET_SIZE} byte limit"),
                    ));
                }
                Ok(Some((
                    FixedHeader {
                        packet_type,
                        flags,
                        remaining_length,
                    },
                    1 + len_bytes,
                )))
            }
            Err(e) if e.kind() == DecodeErrorKind::TruncatedPacket => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn write(&self, buf: &mut BytesMut) -> Result<(), crate::err::EncodeError> {
        buf.put_u8(((self.packet_type as u8) << 4) | self.flags);
        encode_remaining_length(buf, self.remaining_length)
    }
}

fn validate_flags(packet_type: PacketType, flags: u8) -> Result<(), DecodeError> {
    let expected = match packet_type {
        PacketType::Publish => return Ok(()),
        PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => 0x02,
        _ => 0x00,
    };
    if flags != expected {
        return Err(DecodeError::new(
            DecodeErrorKind::FlagBits,
            format!("packet type {packet_type:?} requires reserved flag bits {expected:#04x}, got {flags:#04x}"),
        ));
    }
    Ok(())
}

/// A decoded MQTT control packet of any type.
#[derive(Clone, Debug)]
pub enum MqttPacket {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq(PingReqPacket),
    PingResp(PingRespPacket),
    Disconnect(DisconnectPacket),
}

impl MqttPacket {
    /// Decodes the packet body. `body` must hold exactly
    /// `header.remaining_length` bytes, as sliced out by the caller.
    pub fn decode(header: &FixedHeader, mut body: Bytes) -> Result<Self, DecodeError> {
        let packet = match header.packet_type {
            PacketType::Connect => Self::Connect(connect::decode(&mut body)?),
            PacketType::ConnAck => Self::ConnAck(connack::decode(&mut body)?),
            PacketType::Publish => Self::Publish(publish::decode(header.flags, &mut body)?),
            PacketType::PubAck => Self::PubAck(puback::decode(&mut body)?),
            PacketType::PubRec => Self::PubRec(pubrec::decode(&mut body)?),
            PacketType::PubRel => Self::PubRel(pubrel::decode(&mut body)?),
            PacketType::PubComp => Self::PubComp(pubcomp::decode(&mut body)?),
            PacketType::Subscribe => Self::Subscribe(subscribe::decode(&mut body)?),
            PacketType::SubAck => {
                Self::SubAck(suback::decode(&mut body, crate::ProtocolLevel::V4)?)
            }
            PacketType::Unsubscribe => Self::Unsubscribe(unsubscribe::decode(&mut body)?),
            PacketType::UnsubAck => Self::UnsubAck(unsuback::decode(&mut body)?),
            PacketType::PingReq => Self::PingReq(PingReqPacket),
            PacketType::PingResp => Self::PingResp(PingRespPacket),
            PacketType::Disconnect => Self::Disconnect(DisconnectPacket),
        };
        Ok(packet)
    }

    pub fn try_encode(&self) -> Result<Bytes, crate::err::EncodeError> {
        match self {
            Self::Connect(p) => p.try_encode(),
            Self::ConnAck(p) => Ok(p.encode()),
            Self::Publish(p) => p.try_encode(),
            Self::PubAck(p) => Ok(p.encode()),
            Self::PubRec(p) => Ok(p.encode()),
            Self::PubRel(p) => Ok(p.encode()),
            Self::PubComp(p) => Ok(p.encode()),
            Self::Subscribe(p) => p.try_encode(),
            Self::SubAck(p) => Ok(p.encode()),
            Self::Unsubscribe(p) => p.try_encode(),
            Self::UnsubAck(p) => Ok(p.encode()),
            Self::PingReq(p) => Ok(p.encode()),
            Self::PingResp(p) => Ok(p.encode()),
            Self::Disconnect(p) => Ok(p.encode()),
        }
    }
}
