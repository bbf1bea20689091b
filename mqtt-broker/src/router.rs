//! Publish fan-out: given one PUBLISH, decide who receives it and at what
//! QoS, then register the outgoing QoS bookkeeping for QoS 1/2 deliveries.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use mqtt_core::codec::PublishPacket;
use mqtt_core::qos::QosLevel;
use mqtt_core::topic::matches;

use crate::config::BrokerConfig;
use crate::session::{OutgoingQoSMessage, OutgoingQoSState, Session};

/// One outbound packet addressed to a connection-id, as produced by
/// fan-out. The connection FSM owns actually writing it to the transport.
pub struct Delivery {
    pub connection_id: u64,
    pub packet: PublishPacket,
}

/// Fans a published message out to every session with a matching
/// subscription. `origin_client_id` is `None` for retained-message replay
/// and `Some` for a live PUBLISH, since `noLocal` only excludes the
/// publishing client itself.
pub fn fan_out(
    sessions: &mut HashMap<u64, Session>,
    origin_client_id: Option<&str>,
    topic: &str,
    payload: &Bytes,
    publish_qos: QosLevel,
    retain: bool,
    config: &BrokerConfig,
) -> Vec<Delivery> {
    let mut deliveries = Vec::new();

    for (connection_id, session) in sessions.iter_mut() {
        if !session.connected {
            continue;
        }

        // One delivery per session per message: stop at the first matching
        // filter, even if others would also match. Cloned out of the
        // session immediately so the borrow doesn't outlive the lookup —
        // the rest of this iteration needs `session` mutably.
        let Some(subscription) = session
            .subscriptions
            .iter()
            .find(|s| matches(&s.filter, topic))
            .cloned()
        else {
            continue;
        };
        if subscription.no_local && origin_client_id == Some(session.client_id.as_str()) {
            continue;
        }

        let qos = QosLevel::downgrade(publish_qos, subscription.qos);
        let outgoing_payload = if config.broker.rewrite_source_prefix && qos != QosLevel::ExactlyOnce {
            prefix_with_source(payload, origin_client_id)
        } else {
            payload.clone()
        };

        let mut packet = PublishPacket::new(topic.to_string(), qos, outgoing_payload);
        packet.retain = retain;

        if let Some(state) = state_for(qos) {
            let packet_id = session.next_packet_id();
            packet.packet_id = Some(packet_id);
            session.outgoing.insert(
                packet_id,
                OutgoingQoSMessage {
                    packet_id,
                    qos,
                    retain,
                    topic: topic.to_string(),
                    payload: packet.payload.clone(),
                    state,
                    sent_at: std::time::Instant::now(),
                    retry_count: 0,
                },
            );
        }

        deliveries.push(Delivery {
            connection_id: *connection_id,
            packet,
        });
    }

    deliveries
}

fn state_for(qos: QosLevel) -> Option<OutgoingQoSState> {
    match qos {
        QosLevel::AtMostOnce => None,
        QosLevel::AtLeastOnce => Some(OutgoingQoSState::AwaitingPuback),
        QosLevel::ExactlyOnce => Some(OutgoingQoSState::AwaitingPubrec),
    }
}

/// Non-standard behavior, gated behind `BrokerConfig::rewrite_source_prefix`
/// and off by default: prefixes the payload with `source:[<clientId>];` so
/// a subscriber can tell who published without inspecting a property the
/// wire format doesn't carry. Never applied to QoS 2 deliveries, matching
/// the original behavior this flag preserves.
fn prefix_with_source(payload: &Bytes, origin_client_id: Option<&str>) -> Bytes {
    let Some(client_id) = origin_client_id else {
        return payload.clone();
    };
    let mut out = BytesMut::with_capacity(payload.len() + client_id.len() + 10);
    out.extend_from_slice(format!("source:[{client_id}];").as_bytes());
    out.extend_from_slice(payload);
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqtt_core::ProtocolLevel;

    fn session(client_id: &str, filter: &str, qos: QosLevel, no_local: bool) -> Session {
        let mut session = Session::new(client_id.into(), 30, true, ProtocolLevel::V4, None);
        session.subscribe(filter.into(), qos, no_local);
        session
    }

    #[test]
    fn downgrades_qos_to_the_lower_of_publish_and_subscribe() {
        let mut sessions = HashMap::new();
        sessions.insert(1, session("sub", "a/b", QosLevel::AtMostOnce, false));

        let deliveries = fan_out(
            &mut sessions,
            Some("pub"),
            "a/b",
            &Bytes::from_static(b"hi"),
            QosLevel::ExactlyOnce,
            false,
            &BrokerConfig::default(),
        );

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].packet.qos, QosLevel::AtMostOnce);
        assert!(deliveries[0].packet.packet_id.is_none());
    }

    #[test]
    fn no_local_excludes_the_publishing_client() {
        let mut sessions = HashMap::new();
        sessions.insert(1, session("same", "a/b", QosLevel::AtMostOnce, true));

        let deliveries = fan_out(
            &mut sessions,
            Some("same"),
            "a/b",
            &Bytes::from_static(b"hi"),
            QosLevel::AtMostOnce,
            false,
            &BrokerConfig::default(),
        );

        assert!(deliveries.is_empty());
    }

    #[test]
    fn qos1_fan_out_registers_outgoing_state() {
        let mut sessions = HashMap::new();
        sessions.insert(1, session("sub", "a/b", QosLevel::AtLeastOnce, false));

        let deliveries = fan_out(
            &mut sessions,
            Some("pub"),
            "a/b",
            &Bytes::from_static(b"hi"),
            QosLevel::AtLeastOnce,
            false,
            &BrokerConfig::default(),
        );

        assert_eq!(deliveries.len(), 1);
        let packet_id = deliveries[0].packet.packet_id.unwrap();
        assert_eq!(sessions[&1].outgoing[&packet_id].state, OutgoingQoSState::AwaitingPuback);
    }

    #[test]
    fn overlapping_filters_deliver_only_once_per_session() {
        let mut sessions = HashMap::new();
        let mut session = Session::new("sub".into(), 30, true, ProtocolLevel::V4, None);
        session.subscribe("a/+".into(), QosLevel::AtMostOnce, false);
        session.subscribe("a/b".into(), QosLevel::AtLeastOnce, false);
        sessions.insert(1, session);

        let deliveries = fan_out(
            &mut sessions,
            Some("pub"),
            "a/b",
            &Bytes::from_static(b"hi"),
            QosLevel::AtLeastOnce,
            false,
            &BrokerConfig::default(),
        );

        assert_eq!(deliveries.len(), 1);
    }

    #[test]
    fn no_local_match_on_first_filter_skips_the_whole_session_even_with_a_later_match() {
        let mut sessions = HashMap::new();
        let mut session = Session::new("same".into(), 30, true, ProtocolLevel::V4, None);
        session.subscribe("a/+".into(), QosLevel::AtMostOnce, true);
        session.subscribe("a/b".into(), QosLevel::AtMostOnce, false);
        sessions.insert(1, session);

        let deliveries = fan_out(
            &mut sessions,
            Some("same"),
            "a/b",
            &Bytes::from_static(b"hi"),
            QosLevel::AtMostOnce,
            false,
            &BrokerConfig::default(),
        );

        assert!(deliveries.is_empty());
    }

    #[test]
    fn source_prefix_rewrite_is_opt_in() {
        let mut sessions = HashMap::new();
        sessions.insert(1, session("sub", "a/b", QosLevel::AtMostOnce, false));
        let mut config = BrokerConfig::default();
        config.broker.rewrite_source_prefix = true;

        let deliveries = fan_out(
            &mut sessions,
            Some("pub"),
            "a/b",
            &Bytes::from_static(b"hi"),
            QosLevel::AtMostOnce,
            false,
            &config,
        );

        assert_eq!(&deliveries[0].packet.payload[..], b"source:[pub];hi".as_slice());
    }
}
