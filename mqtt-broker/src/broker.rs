//! The broker façade: owns every session, the retained-message store and
//! the incoming QoS 2 store, and is driven from a single cooperative loop
//! (see `Broker::run`). Every mutation of that state happens inside this
//! loop — connection tasks only frame bytes and forward events.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info, warn};
use mqtt_core::codec::{
    ConnAckPacket, ConnectPacket, MqttPacket, PubAckPacket, PubCompPacket, PubRecPacket,
    PubRelPacket, PublishPacket, SubAckPacket, UnsubAckPacket, Will,
};
use mqtt_core::qos::{QosLevel, SubAckQoS};
use mqtt_core::{ConnectReturnCode, TryEncode};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::auth::AuthPolicy;
use crate::config::BrokerConfig;
use crate::connection;
use crate::qos::{scan_outgoing, IncomingQoS2Message, IncomingQoS2Store, RetryAction};
use crate::retained::RetainedStore;
use crate::router;
use crate::session::Session;

/// Notifications the host process can observe without inspecting broker
/// internals, mirroring the teacher's preference for a callbacks trait over
/// ad hoc closures stored per field.
pub trait BrokerCallbacks: Send {
    fn on_client_connect(&mut self, _client_id: &str) {}
    fn on_client_disconnect(&mut self, _client_id: &str) {}
    fn on_message(&mut self, _client_id: &str, _topic: &str, _payload: &[u8], _qos: QosLevel) {}
    fn on_subscribe(&mut self, _client_id: &str, _filter: &str) {}
    fn on_unsubscribe(&mut self, _client_id: &str, _filter: &str) {}
    fn on_error(&mut self, _err: &crate::error::ServerError) {}
}

struct NoopCallbacks;
impl BrokerCallbacks for NoopCallbacks {}

/// A framed packet (or connection lifecycle event) handed from a
/// connection task to the broker loop.
pub enum BrokerEvent {
    NewConnection {
        connection_id: u64,
        remote_addr: String,
        outbound: mpsc::Sender<OutboundEvent>,
    },
    Packet {
        connection_id: u64,
        packet: MqttPacket,
    },
    Disconnected {
        connection_id: u64,
        graceful: bool,
    },
}

/// What the broker loop asks a connection task to do with the transport.
/// The connection task never decides this on its own.
#[derive(Debug)]
pub enum OutboundEvent {
    Send(Bytes),
    Close,
}

enum ConnectionState {
    AwaitingConnect { remote_addr: String },
    Connected { session: Session, remote_addr: String },
}

pub struct Broker {
    config: BrokerConfig,
    auth_policy: AuthPolicy,
    connections: HashMap<u64, ConnectionState>,
    outbound: HashMap<u64, mpsc::Sender<OutboundEvent>>,
    persistent_sessions: HashMap<String, Session>,
    connected_clients_info: HashMap<String, String>,
    retained: RetainedStore,
    incoming_qos2: IncomingQoS2Store,
    callbacks: Box<dyn BrokerCallbacks>,
    next_connection_id: u64,
    pending_remote_addrs: HashMap<u64, String>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        let auth_policy = AuthPolicy::from_config(&config);
        Self {
            config,
            auth_policy,
            connections: HashMap::new(),
            outbound: HashMap::new(),
            persistent_sessions: HashMap::new(),
            connected_clients_info: HashMap::new(),
            retained: RetainedStore::new(),
            incoming_qos2: IncomingQoS2Store::new(),
            callbacks: Box::new(NoopCallbacks),
            next_connection_id: 1,
            pending_remote_addrs: HashMap::new(),
        }
    }

    pub fn with_callbacks(mut self, callbacks: Box<dyn BrokerCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn connected_client_count(&self) -> usize {
        self.connections
            .values()
            .filter(|c| matches!(c, ConnectionState::Connected { .. }))
            .count()
    }

    /// Accepts connections on `listener` and drives the broker loop until
    /// the process is torn down. Every branch of the `select!` is handled
    /// synchronously against `self` — no branch awaits while broker state
    /// is partway through a mutation.
    pub async fn run(mut self, listener: TcpListener) -> std::io::Result<()> {
        let (tx, mut rx) = mpsc::channel::<BrokerEvent>(256);
        let mut ticker = crate::timer::housekeeping_ticker();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = accepted?;
                    let connection_id = self.next_connection_id;
                    self.next_connection_id += 1;
                    let (out_tx, out_rx) = mpsc::channel::<OutboundEvent>(64);
                    self.outbound.insert(connection_id, out_tx.clone());
                    self.connections.insert(
                        connection_id,
                        ConnectionState::AwaitingConnect { remote_addr: addr.to_string() },
                    );
                    tokio::task::spawn(connection::run(
                        connection_id,
                        stream,
                        tx.clone(),
                        out_rx,
                    ));
                    let _ = tx.send(BrokerEvent::NewConnection {
                        connection_id,
                        remote_addr: addr.to_string(),
                        outbound: out_tx,
                    }).await;
                }
                Some(event) = rx.recv() => {
                    self.handle_event(event).await;
                }
                _ = ticker.tick() => {
                    self.check_timeouts().await;
                }
            }
        }
    }

    async fn handle_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::NewConnection { .. } => {
                // Bookkeeping already done synchronously in `run` before the
                // connection task could possibly send its first packet.
            }
            BrokerEvent::Packet { connection_id, packet } => {
                self.handle_packet(connection_id, packet).await;
            }
            BrokerEvent::Disconnected { connection_id, graceful } => {
                self.handle_disconnect(connection_id, graceful).await;
            }
        }
    }

    async fn handle_packet(&mut self, connection_id: u64, packet: MqttPacket) {
        if !matches!(packet, MqttPacket::Connect(_))
            && matches!(self.connections.get(&connection_id), Some(ConnectionState::AwaitingConnect { .. }))
        {
            warn!("closing connection {connection_id}: expected CONNECT first");
            self.close(connection_id).await;
            return;
        }

        match packet {
            MqttPacket::Connect(connect) => self.handle_connect(connection_id, connect).await,
            MqttPacket::Publish(publish) => self.handle_publish(connection_id, publish).await,
            MqttPacket::PubAck(ack) => self.handle_puback(connection_id, ack),
            MqttPacket::PubRec(rec) => self.handle_pubrec(connection_id, rec).await,
            MqttPacket::PubRel(rel) => self.handle_pubrel(connection_id, rel).await,
            MqttPacket::PubComp(comp) => self.handle_pubcomp(connection_id, comp),
            MqttPacket::Subscribe(sub) => self.handle_subscribe(connection_id, sub).await,
            MqttPacket::Unsubscribe(unsub) => self.handle_unsubscribe(connection_id, unsub).await,
            MqttPacket::PingReq(_) => self.handle_pingreq(connection_id).await,
            MqttPacket::Disconnect(_) => self.handle_client_disconnect_request(connection_id),
            MqttPacket::ConnAck(_)
            | MqttPacket::SubAck(_)
            | MqttPacket::UnsubAck(_)
            | MqttPacket::PingResp(_) => {
                warn!("closing connection {connection_id}: received a server-to-client packet type");
                self.close(connection_id).await;
            }
        }
    }

    async fn handle_connect(&mut self, connection_id: u64, connect: ConnectPacket) {
        let remote_addr = match self.connections.get(&connection_id) {
            Some(ConnectionState::AwaitingConnect { remote_addr }) => remote_addr.clone(),
            _ => {
                warn!("connection {connection_id} sent a second CONNECT");
                self.close(connection_id).await;
                return;
            }
        };

        if connect.client_id.is_empty() && !connect.clean_session {
            info!("rejecting client with an empty id and a persistent session request");
            self.send(connection_id, MqttPacket::ConnAck(ConnAckPacket {
                session_present: false,
                return_code: ConnectReturnCode::IdentifierRejected,
            })).await;
            self.close(connection_id).await;
            return;
        }

        if !self.auth_policy.authorize(&connect) {
            info!("rejecting client {:?}: bad credentials", connect.client_id);
            self.send(connection_id, MqttPacket::ConnAck(ConnAckPacket {
                session_present: false,
                return_code: ConnectReturnCode::BadUsernameOrPassword,
            })).await;
            self.close(connection_id).await;
            return;
        }

        // Invariant 2: a clientId occupies at most one of
        // {activeSessions, persistentSessions}. Evict any existing live
        // connection for this client before installing the new one.
        if let Some((&old_id, _)) = self.connections.iter().find(|(_, state)| {
            matches!(state, ConnectionState::Connected { session, .. } if session.client_id == connect.client_id)
        }) {
            info!("client {} reconnected, closing previous connection", connect.client_id);
            self.close(old_id).await;
        }

        let (session, session_present) = if !connect.clean_session {
            match self.persistent_sessions.remove(&connect.client_id) {
                Some(mut session) => {
                    session.connected = true;
                    session.keep_alive_secs = connect.keep_alive;
                    session.protocol_level = connect.protocol_level;
                    session.will = connect.will.clone();
                    session.touch();
                    (session, true)
                }
                None => (
                    Session::new(
                        connect.client_id.clone(),
                        connect.keep_alive,
                        connect.clean_session,
                        connect.protocol_level,
                        connect.will.clone(),
                    ),
                    false,
                ),
            }
        } else {
            (
                Session::new(
                    connect.client_id.clone(),
                    connect.keep_alive,
                    connect.clean_session,
                    connect.protocol_level,
                    connect.will.clone(),
                ),
                false,
            )
        };

        self.connected_clients_info
            .insert(connect.client_id.clone(), remote_addr.clone());

        self.send(connection_id, MqttPacket::ConnAck(ConnAckPacket {
            session_present,
            return_code: ConnectReturnCode::Accept,
        })).await;

        let inherited_filters: Vec<String> = session.subscriptions.iter().map(|s| s.filter.clone()).collect();
        self.callbacks.on_client_connect(&connect.client_id);
        self.connections.insert(connection_id, ConnectionState::Connected { session, remote_addr });

        for filter in inherited_filters {
            self.replay_retained(connection_id, &filter).await;
        }
    }

    async fn handle_publish(&mut self, connection_id: u64, publish: PublishPacket) {
        if !mqtt_core::topic::is_valid_publish_topic(&publish.topic_name) {
            warn!("connection {connection_id} published to an invalid topic name");
            self.close(connection_id).await;
            return;
        }

        let client_id = match self.client_id_of(connection_id) {
            Some(id) => id,
            None => return,
        };

        if publish.retain {
            self.retained
                .apply(&publish.topic_name, publish.payload.clone(), publish.qos);
        }

        self.callbacks.on_message(&client_id, &publish.topic_name, &publish.payload, publish.qos);

        match publish.qos {
            QosLevel::AtMostOnce => {
                self.route(&client_id, &publish.topic_name, publish.payload, publish.qos, publish.retain).await;
            }
            QosLevel::AtLeastOnce => {
                self.route(&client_id, &publish.topic_name, publish.payload, publish.qos, publish.retain).await;
                if let Some(packet_id) = publish.packet_id {
                    self.send(connection_id, MqttPacket::PubAck(PubAckPacket { packet_id })).await;
                }
            }
            QosLevel::ExactlyOnce => {
                if let Some(packet_id) = publish.packet_id {
                    self.incoming_qos2.store(
                        &client_id,
                        packet_id,
                        IncomingQoS2Message {
                            topic: publish.topic_name.clone(),
                            payload: publish.payload.clone(),
                            retain: publish.retain,
                        },
                    );
                    self.send(connection_id, MqttPacket::PubRec(PubRecPacket { packet_id })).await;
                }
            }
        }
    }

    /// Fans a publish out and delivers every resulting PUBLISH to its
    /// recipient's outbound channel. Split out of `handle_publish` because
    /// the PUBREL path (QoS 2) routes on release rather than on arrival.
    async fn route(&mut self, origin_client_id: &str, topic: &str, payload: Bytes, qos: QosLevel, retain: bool) {
        let mut sessions = self.take_connected_sessions();
        let deliveries = router::fan_out(&mut sessions, Some(origin_client_id), topic, &payload, qos, retain, &self.config);
        self.restore_connected_sessions(sessions);
        for delivery in deliveries {
            match delivery.packet.try_encode() {
                Ok(bytes) => self.send_raw(delivery.connection_id, bytes).await,
                Err(e) => error!("failed to encode fan-out PUBLISH: {e}"),
            }
        }
    }

    fn handle_puback(&mut self, connection_id: u64, ack: PubAckPacket) {
        if let Some(ConnectionState::Connected { session, .. }) = self.connections.get_mut(&connection_id) {
            session.outgoing.remove(&ack.packet_id);
        }
    }

    async fn handle_pubrec(&mut self, connection_id: u64, rec: PubRecPacket) {
        let should_release = if let Some(ConnectionState::Connected { session, .. }) = self.connections.get_mut(&connection_id) {
            if let Some(message) = session.outgoing.get_mut(&rec.packet_id) {
                message.state = crate::session::OutgoingQoSState::AwaitingPubcomp;
                message.sent_at = std::time::Instant::now();
                message.retry_count = 0;
                true
            } else {
                false
            }
        } else {
            false
        };
        if should_release {
            self.send(connection_id, MqttPacket::PubRel(PubRelPacket { packet_id: rec.packet_id })).await;
        }
    }

    async fn handle_pubrel(&mut self, connection_id: u64, rel: PubRelPacket) {
        let client_id = match self.client_id_of(connection_id) {
            Some(id) => id,
            None => return,
        };
        if let Some(message) = self.incoming_qos2.release(&client_id, rel.packet_id) {
            self.route(&client_id, &message.topic, message.payload, QosLevel::ExactlyOnce, message.retain).await;
        }
        self.send(connection_id, MqttPacket::PubComp(PubCompPacket { packet_id: rel.packet_id })).await;
    }

    fn handle_pubcomp(&mut self, connection_id: u64, comp: PubCompPacket) {
        if let Some(ConnectionState::Connected { session, .. }) = self.connections.get_mut(&connection_id) {
            session.outgoing.remove(&comp.packet_id);
        }
    }

    async fn handle_subscribe(&mut self, connection_id: u64, sub: mqtt_core::codec::SubscribePacket) {
        let mut results = Vec::with_capacity(sub.filters.len());
        let mut accepted_filters = Vec::new();
        let protocol_level = match self.connections.get(&connection_id) {
            Some(ConnectionState::Connected { session, .. }) => session.protocol_level,
            _ => return,
        };

        for entry in &sub.filters {
            if !mqtt_core::topic::is_valid_topic_filter(&entry.filter) {
                results.push(SubAckQoS::Failure);
                continue;
            }
            if let Some(ConnectionState::Connected { session, .. }) = self.connections.get_mut(&connection_id) {
                session.subscribe(entry.filter.clone(), entry.qos, entry.no_local);
            }
            results.push(SubAckQoS::Granted(entry.qos));
            accepted_filters.push(entry.filter.clone());
        }

        self.send(connection_id, MqttPacket::SubAck(SubAckPacket {
            packet_id: sub.packet_id,
            protocol_level,
            results,
        })).await;

        if let Some(client_id) = self.client_id_of(connection_id) {
            for filter in &accepted_filters {
                self.callbacks.on_subscribe(&client_id, filter);
            }
        }
        for filter in accepted_filters {
            self.replay_retained(connection_id, &filter).await;
        }
    }

    async fn handle_unsubscribe(&mut self, connection_id: u64, unsub: mqtt_core::codec::UnsubscribePacket) {
        let client_id = self.client_id_of(connection_id);
        if let Some(ConnectionState::Connected { session, .. }) = self.connections.get_mut(&connection_id) {
            for filter in &unsub.filters {
                session.unsubscribe(filter);
            }
        }
        if let Some(client_id) = client_id {
            for filter in &unsub.filters {
                self.callbacks.on_unsubscribe(&client_id, filter);
            }
        }
        self.send(connection_id, MqttPacket::UnsubAck(UnsubAckPacket { packet_id: unsub.packet_id })).await;
    }

    async fn handle_pingreq(&mut self, connection_id: u64) {
        if let Some(ConnectionState::Connected { session, .. }) = self.connections.get_mut(&connection_id) {
            session.touch();
        }
        self.send(connection_id, MqttPacket::PingResp(mqtt_core::codec::PingRespPacket)).await;
    }

    fn handle_client_disconnect_request(&mut self, connection_id: u64) {
        if let Some(ConnectionState::Connected { session, .. }) = self.connections.get_mut(&connection_id) {
            session.graceful_disconnect = true;
            session.will = None;
        }
    }

    async fn handle_disconnect(&mut self, connection_id: u64, transport_graceful: bool) {
        self.outbound.remove(&connection_id);
        let state = match self.connections.remove(&connection_id) {
            Some(state) => state,
            None => return,
        };
        let ConnectionState::Connected { mut session, .. } = state else {
            return;
        };

        let graceful = transport_graceful || session.graceful_disconnect;
        self.connected_clients_info.remove(&session.client_id);
        self.incoming_qos2.drop_all_for(&session.client_id);

        if !graceful {
            if let Some(will) = session.will.take() {
                self.publish_will(&session.client_id, will).await;
            }
        }

        self.callbacks.on_client_disconnect(&session.client_id);

        if !session.clean_session {
            session.connected = false;
            self.persistent_sessions.insert(session.client_id.clone(), session);
        }
    }

    async fn publish_will(&mut self, client_id: &str, will: Will) {
        if will.retain {
            self.retained.apply(&will.topic, will.message.clone(), will.qos);
        }
        self.route(client_id, &will.topic, will.message, will.qos, will.retain).await;
    }

    async fn replay_retained(&mut self, connection_id: u64, filter: &str) {
        let matches: Vec<(String, Bytes, QosLevel)> = self
            .retained
            .matching(filter)
            .into_iter()
            .map(|m| (m.topic.clone(), m.payload.clone(), m.qos))
            .collect();

        for (topic, payload, qos) in matches {
            let mut packet = PublishPacket::new(topic, qos, payload);
            packet.retain = true;
            if let Some(ConnectionState::Connected { session, .. }) = self.connections.get_mut(&connection_id) {
                if let Some(state) = crate::qos::state_after_publish(qos) {
                    let packet_id = session.next_packet_id();
                    packet.packet_id = Some(packet_id);
                    session.outgoing.insert(packet_id, crate::session::OutgoingQoSMessage {
                        packet_id,
                        qos,
                        retain: true,
                        topic: packet.topic_name.clone(),
                        payload: packet.payload.clone(),
                        state,
                        sent_at: std::time::Instant::now(),
                        retry_count: 0,
                    });
                }
            }
            self.send(connection_id, MqttPacket::Publish(packet)).await;
        }
    }

    async fn check_timeouts(&mut self) {
        let grace_factor = self.config.broker.keep_alive_grace_factor;
        let timeout = Duration::from_secs(self.config.broker.qos_retry_timeout_secs);
        let max_retries = self.config.broker.qos_max_retries;

        let mut expired = Vec::new();
        let mut redeliveries: Vec<(u64, PublishPacket)> = Vec::new();

        for (&connection_id, state) in self.connections.iter_mut() {
            let ConnectionState::Connected { session, .. } = state else { continue };
            if session.keep_alive_expired(grace_factor) {
                expired.push(connection_id);
                continue;
            }
            for action in scan_outgoing(session, timeout, max_retries) {
                match action {
                    RetryAction::Redeliver(message) => {
                        let packet = PublishPacket {
                            topic_name: message.topic,
                            packet_id: Some(message.packet_id),
                            qos: message.qos,
                            dup: true,
                            retain: message.retain,
                            payload: message.payload,
                        };
                        redeliveries.push((connection_id, packet));
                    }
                    RetryAction::GiveUp(packet_id) => {
                        debug!("giving up on packet {packet_id} for connection {connection_id} after exhausting retries");
                    }
                }
            }
        }

        for (connection_id, packet) in redeliveries {
            self.send(connection_id, MqttPacket::Publish(packet)).await;
        }

        for connection_id in expired {
            info!("closing connection {connection_id}: keep-alive expired");
            self.close(connection_id).await;
        }
    }

    fn client_id_of(&self, connection_id: u64) -> Option<String> {
        match self.connections.get(&connection_id) {
            Some(ConnectionState::Connected { session, .. }) => Some(session.client_id.clone()),
            _ => None,
        }
    }

    /// Temporarily moves every connected session into a plain map keyed by
    /// connection-id so `router::fan_out` can borrow it independently of
    /// `self.connections`, which also holds not-yet-connected entries. The
    /// stripped-off remote address is kept so the entry can be rebuilt
    /// exactly as it was.
    fn take_connected_sessions(&mut self) -> HashMap<u64, Session> {
        let mut sessions = HashMap::new();
        let ids: Vec<u64> = self.connections.keys().copied().collect();
        for id in ids {
            if matches!(self.connections.get(&id), Some(ConnectionState::Connected { .. })) {
                if let Some(ConnectionState::Connected { session, remote_addr }) = self.connections.remove(&id) {
                    self.pending_remote_addrs.insert(id, remote_addr);
                    sessions.insert(id, session);
                }
            }
        }
        sessions
    }

    fn restore_connected_sessions(&mut self, sessions: HashMap<u64, Session>) {
        for (id, session) in sessions {
            let remote_addr = self.pending_remote_addrs.remove(&id).unwrap_or_default();
            self.connections.insert(id, ConnectionState::Connected { session, remote_addr });
        }
    }

    async fn send(&mut self, connection_id: u64, packet: MqttPacket) {
        match packet.try_encode() {
            Ok(bytes) => self.send_raw(connection_id, bytes).await,
            Err(e) => error!("failed to encode outgoing packet for connection {connection_id}: {e}"),
        }
    }

    async fn send_raw(&mut self, connection_id: u64, bytes: Bytes) {
        if let Some(sender) = self.outbound.get(&connection_id) {
            if sender.send(OutboundEvent::Send(bytes)).await.is_err() {
                self.outbound.remove(&connection_id);
            }
        }
    }

    /// A broker-initiated close is treated as an abnormal termination (the
    /// client never got to send DISCONNECT), so any LWT still fires unless
    /// the session itself was already marked gracefully disconnecting.
    async fn close(&mut self, connection_id: u64) {
        if let Some(sender) = self.outbound.remove(&connection_id) {
            let _ = sender.send(OutboundEvent::Close).await;
        }
        self.handle_disconnect(connection_id, false).await;
    }
}
