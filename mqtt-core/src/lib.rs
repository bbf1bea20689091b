//! Pure wire codec, topic matcher and QoS bookkeeping types for an embedded
//! MQTT 3.1.1 broker. Nothing in this crate performs I/O: encoders produce a
//! contiguous `Bytes`, decoders consume a `Bytes` region that the caller has
//! already carved out according to the fixed header's remaining length.

use core::fmt::Display;

use err::{DecodeError, DecodeErrorKind};

pub mod codec;
pub mod err;
pub mod id;
pub mod io;
pub mod qos;
pub mod topic;

pub use codec::*;

/// A packet that can be serialized onto the wire.
pub trait Encode {
    fn encode(&self) -> Bytes;
}

/// A packet whose encoding can fail (payload/topic too large for the
/// remaining-length encoding).
pub trait TryEncode {
    fn try_encode(&self) -> Result<Bytes, err::EncodeError>;
}

use bytes::Bytes;

/// MQTT protocol level as sent in the CONNECT variable header. Level 4 is
/// MQTT 3.1.1; level 5 is tolerated only for the subscribe noLocal option
/// and the 0x8F SUBACK failure code (see [`qos::suback_failure_code`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolLevel {
    V4,
    V5,
}

impl TryFrom<u8> for ProtocolLevel {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            4 => Ok(Self::V4),
            5 => Ok(Self::V5),
            _ => Err(DecodeError::new(
                DecodeErrorKind::InvalidProtocol,
                format!("unsupported protocol level: {value}"),
            )),
        }
    }
}

impl From<ProtocolLevel> for u8 {
    fn from(value: ProtocolLevel) -> Self {
        match value {
            ProtocolLevel::V4 => 4,
            ProtocolLevel::V5 => 5,
        }
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectReturnCode {
    Accept = 0,
    InvalidProtocol = 1,
    IdentifierRejected = 2,
    ServerUnavailable = 3,
    BadUsernameOrPassword = 4,
    NotAuthorized = 5,
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Self::Accept),
            1 => Ok(Self::InvalidProtocol),
            2 => Ok(Self::IdentifierRejected),
            3 => Ok(Self::ServerUnavailable),
            4 => Ok(Self::BadUsernameOrPassword),
            5 => Ok(Self::NotAuthorized),
            _ => Err(DecodeError::new(
                DecodeErrorKind::InvalidReturnCode,
                format!("return code {value} is invalid, only values 0-5 are valid"),
            )),
        }
    }
}

impl Display for ConnectReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accept => write!(f, "accepted"),
            Self::InvalidProtocol => write!(f, "unacceptable protocol version"),
            Self::IdentifierRejected => write!(f, "identifier rejected"),
            Self::ServerUnavailable => write!(f, "server unavailable"),
            Self::BadUsernameOrPassword => write!(f, "bad username or password"),
            Self::NotAuthorized => write!(f, "not authorized"),
        }
    }
}

/// Limits enforced by the wire codec, per the resource bounds the broker
/// guarantees regardless of configuration.
pub const MAX_PACKET_SIZE: usize = 1024;
pub const MAX_TOPIC_LEN: usize = 256;
pub const MAX_PAYLOAD_LEN: usize = 768;
