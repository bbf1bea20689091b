use bytes::{Buf, Bytes, BytesMut};

use crate::codec::{FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind};
use crate::{ConnectReturnCode, Encode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

pub fn decode(bytes: &mut Bytes) -> Result<ConnAckPacket, DecodeError> {
    if bytes.len() < 2 {
        return Err(DecodeError::new(
            DecodeErrorKind::TruncatedPacket,
            "CONNACK body must be 2 bytes".to_string(),
        ));
    }
    let flags = bytes.get_u8();
    if flags & !0x01 != 0 {
        return Err(DecodeError::new(
            DecodeErrorKind::FlagBits,
            "CONNACK reserved bits must be zero".to_string(),
        ));
    }
    let return_code = ConnectReturnCode::try_from(bytes.get_u8())?;
    Ok(ConnAckPacket {
        session_present: flags & 0x01 != 0,
        return_code,
    })
}

impl Encode for ConnAckPacket {
    fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        FixedHeader {
            packet_type: PacketType::ConnAck,
            flags: 0,
            remaining_length: 2,
        }
        .write(&mut out)
        .expect("CONNACK remaining length always fits");
        out.extend_from_slice(&[
            self.session_present as u8,
            self.return_code as u8,
        ]);
        out.freeze()
    }
}
