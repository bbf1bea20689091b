//! Quality-of-service levels and the SUBACK return codes derived from them.

use crate::{err::DecodeError, err::DecodeErrorKind, ProtocolLevel};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum QosLevel {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QosLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// The QoS a subscriber actually receives a publish at, per MQTT 3.1.1
    /// section 4.3: never higher than what either side requested.
    pub fn downgrade(publish: QosLevel, subscribe: QosLevel) -> QosLevel {
        publish.min(subscribe)
    }
}

impl TryFrom<u8> for QosLevel {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            _ => Err(DecodeError::new(
                DecodeErrorKind::QoS,
                format!("{value} is not a valid QoS level"),
            )),
        }
    }
}

/// Per-filter outcome of a SUBSCRIBE request, as carried in a SUBACK.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubAckQoS {
    Granted(QosLevel),
    Failure,
}

impl SubAckQoS {
    pub fn as_u8(self, protocol: ProtocolLevel) -> u8 {
        match self {
            Self::Granted(qos) => qos.as_u8(),
            Self::Failure => suback_failure_code(protocol),
        }
    }
}

/// MQTT 3.1.1 defines the SUBACK failure code as 0x80. MQTT 5 reassigns the
/// same slot to a family of reason codes; a v5 CONNECT is only tolerated for
/// its `noLocal` subscribe option, so on that path we return the narrower
/// "unspecified error" reason code 0x8F instead of the v3 0x80.
pub fn suback_failure_code(protocol: ProtocolLevel) -> u8 {
    match protocol {
        ProtocolLevel::V4 => 0x80,
        ProtocolLevel::V5 => 0x8f,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downgrade_picks_the_lower_qos() {
        assert_eq!(
            QosLevel::downgrade(QosLevel::ExactlyOnce, QosLevel::AtLeastOnce),
            QosLevel::AtLeastOnce
        );
        assert_eq!(
            QosLevel::downgrade(QosLevel::AtMostOnce, QosLevel::ExactlyOnce),
            QosLevel::AtMostOnce
        );
    }

    #[test]
    fn failure_code_depends_on_protocol_level() {
        assert_eq!(suback_failure_code(ProtocolLevel::V4), 0x80);
        assert_eq!(suback_failure_code(ProtocolLevel::V5), 0x8f);
    }

    #[test]
    fn rejects_out_of_range_qos() {
        assert!(QosLevel::try_from(3).is_err());
    }
}
