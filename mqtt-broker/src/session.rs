use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use mqtt_core::codec::Will;
use mqtt_core::id::PacketIdGenerator;
use mqtt_core::qos::QosLevel;
use mqtt_core::ProtocolLevel;

/// A subscription filter a client has registered, in insertion order.
/// Duplicate filters within a session are permitted; the session does not
/// de-duplicate them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub filter: String,
    pub qos: QosLevel,
    pub no_local: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutgoingQoSState {
    AwaitingPuback,
    AwaitingPubrec,
    AwaitingPubcomp,
}

/// A QoS 1 or 2 publish the broker has sent and is waiting on an
/// acknowledgement for, keyed by packet id within the owning session.
#[derive(Clone, Debug)]
pub struct OutgoingQoSMessage {
    pub packet_id: u16,
    pub qos: QosLevel,
    pub retain: bool,
    pub topic: String,
    pub payload: Bytes,
    pub state: OutgoingQoSState,
    pub sent_at: Instant,
    pub retry_count: u32,
}

/// Logical client state, independent of whether the transport is currently
/// attached: a `cleanSession=false` client's `Session` survives under
/// `Broker::persistent_sessions` between disconnect and reconnect.
#[derive(Debug)]
pub struct Session {
    pub client_id: String,
    pub connected: bool,
    pub last_activity: Instant,
    pub keep_alive_secs: u16,
    pub clean_session: bool,
    pub protocol_level: ProtocolLevel,
    pub subscriptions: Vec<Subscription>,
    pub outgoing: HashMap<u16, OutgoingQoSMessage>,
    pub will: Option<Will>,
    pub graceful_disconnect: bool,
    id_generator: PacketIdGenerator,
}

impl Session {
    pub fn new(
        client_id: String,
        keep_alive_secs: u16,
        clean_session: bool,
        protocol_level: ProtocolLevel,
        will: Option<Will>,
    ) -> Self {
        Self {
            client_id,
            connected: true,
            last_activity: Instant::now(),
            keep_alive_secs,
            clean_session,
            protocol_level,
            subscriptions: Vec::new(),
            outgoing: HashMap::new(),
            will,
            graceful_disconnect: false,
            id_generator: PacketIdGenerator::new(),
        }
    }

    pub fn next_packet_id(&mut self) -> u16 {
        self.id_generator.next_id()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Keep-alive expiry per MQTT 3.1.1 section 3.1.2.10: the server waits
    /// 1.5x the negotiated keep-alive before treating the client as dead.
    /// A keep-alive of 0 disables the check entirely.
    pub fn keep_alive_expired(&self, grace_factor: f32) -> bool {
        if self.keep_alive_secs == 0 {
            return false;
        }
        let limit = (self.keep_alive_secs as f32 * grace_factor).ceil() as u64;
        self.last_activity.elapsed().as_secs() > limit
    }

    pub fn subscribe(&mut self, filter: String, qos: QosLevel, no_local: bool) {
        self.subscriptions.push(Subscription {
            filter,
            qos,
            no_local,
        });
    }

    pub fn unsubscribe(&mut self, filter: &str) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.filter != filter);
        self.subscriptions.len() != before
    }
}
