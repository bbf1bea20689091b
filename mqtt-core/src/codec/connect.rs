use bytes::{Buf, Bytes, BytesMut};

use crate::codec::FixedHeader;
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::io::{decode_u16, decode_utf8, encode_utf8};
use crate::qos::QosLevel;
use crate::{ProtocolLevel, TryEncode, MAX_TOPIC_LEN};

use super::PacketType;

const FLAG_USERNAME: u8 = 0x80;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_WILL_QOS_MASK: u8 = 0x18;
const FLAG_WILL: u8 = 0x04;
const FLAG_CLEAN_SESSION: u8 = 0x02;

/// A client's last will and testament: published by the broker on that
/// client's behalf if the session ends without a clean DISCONNECT.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub message: Bytes,
    pub qos: QosLevel,
    pub retain: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectPacket {
    pub protocol_level: ProtocolLevel,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Bytes>,
}

pub fn decode(bytes: &mut Bytes) -> Result<ConnectPacket, DecodeError> {
    let protocol_name = decode_utf8(bytes)?;
    if protocol_name != "MQTT" {
        return Err(DecodeError::new(
            DecodeErrorKind::InvalidProtocol,
            format!("expected protocol name \"MQTT\", got {protocol_name:?}"),
        ));
    }

    if bytes.is_empty() {
        return Err(DecodeError::new(
            DecodeErrorKind::TruncatedPacket,
            "CONNECT packet ended before the protocol level byte".to_string(),
        ));
    }
    let protocol_level = ProtocolLevel::try_from(bytes.get_u8())?;

    if bytes.is_empty() {
        return Err(DecodeError::new(
            DecodeErrorKind::TruncatedPacket,
            "CONNECT packet ended before the connect flags byte".to_string(),
        ));
    }
    let flags = bytes.get_u8();
    if flags & 0x01 != 0 {
        return Err(DecodeError::new(
            DecodeErrorKind::FlagBits,
            "CONNECT reserved flag bit must be zero".to_string(),
        ));
    }

    let keep_alive = decode_u16(bytes)?;
    let client_id = decode_utf8(bytes)?;
    if client_id.len() > MAX_TOPIC_LEN {
        return Err(DecodeError::new(
            DecodeErrorKind::OversizedPacket,
            format!("client id of {} bytes exceeds the {MAX_TOPIC_LEN} byte limit", client_id.len()),
        ));
    }

    let will = if flags & FLAG_WILL != 0 {
        let topic = decode_utf8(bytes)?;
        let message = crate::io::decode_bytes(bytes)?;
        let qos = QosLevel::try_from((flags & FLAG_WILL_QOS_MASK) >> 3)?;
        let retain = flags & FLAG_WILL_RETAIN != 0;
        Some(Will {
            topic,
            message,
            qos,
            retain,
        })
    } else {
        None
    };

    let username = if flags & FLAG_USERNAME != 0 {
        Some(decode_utf8(bytes)?)
    } else {
        None
    };

    let password = if flags & FLAG_PASSWORD != 0 {
        Some(crate::io::decode_bytes(bytes)?)
    } else {
        None
    };

    // An empty client id with clean_session=false frames fine; whether it's
    // acceptable is an application-level decision (CONNACK 0x02, not a
    // framing failure) left to the broker.
    Ok(ConnectPacket {
        protocol_level,
        clean_session: flags & FLAG_CLEAN_SESSION != 0,
        keep_alive,
        client_id,
        will,
        username,
        password,
    })
}

impl TryEncode for ConnectPacket {
    fn try_encode(&self) -> Result<Bytes, EncodeError> {
        let mut body = BytesMut::new();
        encode_utf8(&mut body, "MQTT");
        body.extend_from_slice(&[self.protocol_level.into()]);

        let mut flags = 0u8;
        if self.clean_session {
            flags |= FLAG_CLEAN_SESSION;
        }
        if let Some(will) = &self.will {
            flags |= FLAG_WILL;
            flags |= (will.qos.as_u8()) << 3;
            if will.retain {
                flags |= FLAG_WILL_RETAIN;
            }
        }
        if self.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        if self.password.is_some() {
            flags |= FLAG_PASSWORD;
        }
        body.extend_from_slice(&[flags]);
        body.extend_from_slice(&self.keep_alive.to_be_bytes());
        encode_utf8(&mut body, &self.client_id);

        if let Some(will) = &self.will {
            encode_utf8(&mut body, &will.topic);
            crate::io::encode_bytes(&mut body, &will.message);
        }
        if let Some(username) = &self.username {
            encode_utf8(&mut body, username);
        }
        if let Some(password) = &self.password {
            crate::io::encode_bytes(&mut body, password);
        }

        let mut out = BytesMut::new();
        FixedHeader {
            packet_type: PacketType::Connect,
            flags: 0,
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

    fn sample() -> ConnectPacket {
        ConnectPacket {
            protocol_level: ProtocolLevel::V4,
            clean_session: true,
            keep_alive: 60,
            client_id: "sensor-01".to_string(),
            will: Some(Will {
                topic: "sensors/sensor-01/status".to_string(),
                message: Bytes::from_static(b"offline"),
                qos: QosLevel::AtLeastOnce,
                retain: true,
            }),
            username: Some("sensor".to_string()),
            password: Some(Bytes::from_static(b"hunter2")),
        }
    }

    #[test]
    fn round_trips_with_will_and_credentials() {
        let packet = sample();
        let encoded = packet.try_encode().unwrap();
        let (header, consumed) = FixedHeader::parse(&encoded).unwrap().unwrap();
        let mut body = encoded.slice(consumed..);
        let decoded = decode(&mut body).unwrap();
        assert_eq!(header.packet_type, PacketType::Connect);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn decodes_an_empty_client_id_with_persistent_session_without_error() {
        // Whether this is acceptable is the broker's call (CONNACK 0x02),
        // not the codec's.
        let mut bad = sample();
        bad.client_id = String::new();
        bad.clean_session = false;
        let encoded = bad.try_encode().unwrap();
        let (_, consumed) = FixedHeader::parse(&encoded).unwrap().unwrap();
        let mut body = encoded.slice(consumed..);
        let decoded = decode(&mut body).unwrap();
        assert!(decoded.client_id.is_empty());
    }
}
