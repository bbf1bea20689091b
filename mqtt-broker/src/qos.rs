//! Broker-side QoS 1/2 orchestration: outgoing retry scanning and the
//! incoming QoS 2 reassembly store.
//!
//! The wire-level packet id allocator and QoS level types live in
//! `mqtt_core`; this module is what actually decides when to retransmit or
//! give up, and how an incoming QoS 2 PUBLISH is staged until its PUBREL.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;

use crate::session::{OutgoingQoSMessage, OutgoingQoSState, Session};

/// A PUBLISH the broker received with QoS 2 and has not yet released
/// (delivered to subscribers), keyed by `(originalClientId, packetId)` —
/// the session-qualified key prevents two different publishers reusing the
/// same packet id from colliding in the same store.
#[derive(Clone, Debug)]
pub struct IncomingQoS2Message {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

#[derive(Debug, Default)]
pub struct IncomingQoS2Store {
    messages: HashMap<(String, u16), IncomingQoS2Message>,
}

impl IncomingQoS2Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, client_id: &str, packet_id: u16, message: IncomingQoS2Message) {
        self.messages
            .insert((client_id.to_string(), packet_id), message);
    }

    /// Removes and returns the staged message on PUBREL. `None` if the
    /// packet id is unknown (a resent PUBREL after the matching PUBCOMP was
    /// already sent) — the caller still answers with PUBCOMP, idempotently.
    pub fn release(&mut self, client_id: &str, packet_id: u16) -> Option<IncomingQoS2Message> {
        self.messages.remove(&(client_id.to_string(), packet_id))
    }

    pub fn drop_all_for(&mut self, client_id: &str) {
        self.messages.retain(|(id, _), _| id != client_id);
    }
}

/// Outcome of scanning a session's outgoing QoS map for one packet.
pub enum RetryAction {
    Redeliver(OutgoingQoSMessage),
    GiveUp(u16),
}

/// Scans a session's outstanding QoS 1/2 publishes for ones past their
/// retry timeout, returning either a redelivery (with `retry_count`
/// incremented and `sent_at` not yet reset — the caller resets it only
/// after the write succeeds) or a give-up past `max_retries`.
///
/// PUBREL packets (QoS 2 `AwaitingPubcomp`) are retried the same as a fresh
/// PUBLISH; a PUBCOMP never arrives faster than the publish's own ack did,
/// so the same timeout budget applies.
pub fn scan_outgoing(
    session: &mut Session,
    timeout: Duration,
    max_retries: u32,
) -> Vec<RetryAction> {
    let mut due = Vec::new();
    for message in session.outgoing.values() {
        if message.sent_at.elapsed() < timeout {
            continue;
        }
        if message.retry_count >= max_retries {
            due.push(message.packet_id);
        }
    }

    let mut actions = Vec::new();
    for packet_id in due {
        if let Some(message) = session.outgoing.remove(&packet_id) {
            actions.push(RetryAction::GiveUp(message.packet_id));
        }
    }

    for message in session.outgoing.values_mut() {
        if message.sent_at.elapsed() >= timeout {
            message.retry_count += 1;
            actions.push(RetryAction::Redeliver(message.clone()));
        }
    }

    actions
}

pub fn state_after_publish(qos: mqtt_core::qos::QosLevel) -> Option<OutgoingQoSState> {
    match qos {
        mqtt_core::qos::QosLevel::AtMostOnce => None,
        mqtt_core::qos::QosLevel::AtLeastOnce => Some(OutgoingQoSState::AwaitingPuback),
        mqtt_core::qos::QosLevel::ExactlyOnce => Some(OutgoingQoSState::AwaitingPubrec),
    }
}
