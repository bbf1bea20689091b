use bytes::{Bytes, BytesMut};

use crate::codec::{FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind};
use crate::io::{decode_u16, decode_utf8, encode_utf8};
use crate::qos::QosLevel;
use crate::{TryEncode, MAX_PAYLOAD_LEN, MAX_TOPIC_LEN};

pub const FLAG_RETAIN: u8 = 0x01;
pub const FLAG_QOS_MASK: u8 = 0x06;
pub const FLAG_DUP: u8 = 0x08;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishPacket {
    pub topic_name: String,
    pub packet_id: Option<u16>,
    pub qos: QosLevel,
    pub dup: bool,
    pub retain: bool,
    pub payload: Bytes,
}

impl PublishPacket {
    pub fn new(topic_name: String, qos: QosLevel, payload: Bytes) -> Self {
        Self {
            topic_name,
            packet_id: None,
            qos,
            dup: false,
            retain: false,
            payload,
        }
    }

    /// Returns a copy with the dup flag set and the given packet id, used
    /// when retransmitting an unacknowledged QoS 1/2 publish.
    pub fn as_redelivery(&self, packet_id: u16) -> Self {
        let mut copy = self.clone();
        copy.dup = true;
        copy.packet_id = Some(packet_id);
        copy
    }
}

pub fn decode(flags: u8, bytes: &mut Bytes) -> Result<PublishPacket, DecodeError> {
    let qos = QosLevel::try_from((flags & FLAG_QOS_MASK) >> 1)?;
    let dup = flags & FLAG_DUP != 0;
    let retain = flags & FLAG_RETAIN != 0;

    if dup && qos == QosLevel::AtMostOnce {
        return Err(DecodeError::new(
            DecodeErrorKind::FlagBits,
            "DUP must be 0 for a QoS 0 PUBLISH".to_string(),
        ));
    }

    let topic_name = decode_utf8(bytes)?;
    if topic_name.len() > MAX_TOPIC_LEN {
        return Err(DecodeError::new(
            DecodeErrorKind::OversizedPacket,
            format!("topic name of {} bytes exceeds the {MAX_TOPIC_LEN} byte limit", topic_name.len()),
        ));
    }
    // A wildcard topic name frames fine; publishing to one is a protocol
    // violation the broker closes the connection over, not a framing error.
    let packet_id = if qos != QosLevel::AtMostOnce {
        Some(decode_u16(bytes)?)
    } else {
        None
    };

    let mut payload = bytes.split_off(0);
    if payload.len() > MAX_PAYLOAD_LEN {
        payload.truncate(MAX_PAYLOAD_LEN);
    }

    Ok(PublishPacket {
        topic_name,
        packet_id,
        qos,
        dup,
        retain,
        payload,
    })
}

impl TryEncode for PublishPacket {
    fn try_encode(&self) -> Result<Bytes, EncodeError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(EncodeError::new(
                EncodeErrorKind::OversizedPayload,
                format!("payload of {} bytes exceeds the {MAX_PAYLOAD_LEN} byte limit", self.payload.len()),
            ));
        }

        let mut body = BytesMut::new();
        encode_utf8(&mut body, &self.topic_name);
        if let Some(packet_id) = self.packet_id {
            body.extend_from_slice(&packet_id.to_be_bytes());
        }
        body.extend_from_slice(&self.payload);

        let mut flags = self.qos.as_u8() << 1;
        if self.retain {
            flags |= FLAG_RETAIN;
        }
        if self.dup {
            flags |= FLAG_DUP;
        }

        let mut out = BytesMut::new();
        FixedHeader {
            packet_type: PacketType::Publish,
            flags,
            remaining_length: body.len(),
        }
        .write(&mut out)?;
        out.extend_from_slice(&body);
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_qos0_without_packet_id() {
        let packet = PublishPacket::new("a/b".into(), QosLevel::AtMostOnce, Bytes::from_static(b"hi"));
        let encoded = packet.try_encode().unwrap();
        let (header, consumed) = FixedHeader::parse(&encoded).unwrap().unwrap();
        let mut body = encoded.slice(consumed..);
        let decoded = decode(header.flags, &mut body).unwrap();
        assert_eq!(decoded, packet);
        assert!(decoded.packet_id.is_none());
    }

    #[test]
    fn round_trips_qos1_with_dup_and_retain() {
        let mut packet = PublishPacket::new("a/b".into(), QosLevel::AtLeastOnce, Bytes::from_static(b"hi"));
        packet.packet_id = Some(42);
        packet.retain = true;
        packet = packet.as_redelivery(42);
        let encoded = packet.try_encode().unwrap();
        let (header, consumed) = FixedHeader::parse(&encoded).unwrap().unwrap();
        let mut body = encoded.slice(consumed..);
        let decoded = decode(header.flags, &mut body).unwrap();
        assert_eq!(decoded, packet);
        assert!(decoded.dup);
        assert_eq!(decoded.packet_id, Some(42));
    }

    #[test]
    fn payload_of_max_length_passes_unchanged() {
        let mut body = BytesMut::new();
        encode_utf8(&mut body, "a/b");
        body.extend_from_slice(&[0u8; MAX_PAYLOAD_LEN]);
        let mut frozen = body.freeze();
        let decoded = decode(0, &mut frozen).unwrap();
        assert_eq!(decoded.payload.len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn oversized_payload_is_truncated_to_the_limit_instead_of_rejected() {
        let mut body = BytesMut::new();
        encode_utf8(&mut body, "a/b");
        body.extend_from_slice(&[0u8; MAX_PAYLOAD_LEN + 1]);
        let mut frozen = body.freeze();
        let decoded = decode(0, &mut frozen).unwrap();
        assert_eq!(decoded.payload.len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn decodes_a_wildcard_topic_name_without_error() {
        // Rejecting a publish to a wildcard topic name is the broker's job
        // (a protocol violation that closes the connection), not the codec's.
        let mut body = BytesMut::new();
        encode_utf8(&mut body, "a/+");
        body.extend_from_slice(b"payload");
        let mut frozen = body.freeze();
        let decoded = decode(0, &mut frozen).unwrap();
        assert_eq!(decoded.topic_name, "a/+");
    }
}
