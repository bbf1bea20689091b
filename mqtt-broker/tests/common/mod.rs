//! Shared test harness: drives a real `Broker` over a real loopback TCP
//! socket using nothing but the `mqtt-core` codec, the same way a real
//! client would.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use mqtt_core::codec::{
    ConnAckPacket, ConnectPacket, FixedHeader, MqttPacket, PublishPacket, SubAckPacket,
    SubscribeFilter, SubscribePacket,
};
use mqtt_core::qos::QosLevel;
use mqtt_core::ProtocolLevel;
use mqtt_broker::broker::Broker;
use mqtt_broker::config::BrokerConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub async fn spawn_broker(config: BrokerConfig) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let broker = Broker::new(config);
    tokio::spawn(broker.run(listener));
    addr
}

pub async fn send(stream: &mut TcpStream, packet: MqttPacket) {
    let bytes = packet.try_encode().unwrap();
    stream.write_all(&bytes).await.unwrap();
}

pub async fn recv(stream: &mut TcpStream) -> MqttPacket {
    let mut buf = BytesMut::with_capacity(512);
    loop {
        if let Ok(Some((header, header_len))) = FixedHeader::parse(&buf) {
            let total = header_len + header.remaining_length;
            if buf.len() >= total {
                let frame = buf.split_to(total);
                let body = frame.freeze().slice(header_len..);
                return MqttPacket::decode(&header, body).unwrap();
            }
        }
        let mut chunk = [0u8; 512];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut chunk))
            .await
            .expect("timed out waiting for a packet")
            .unwrap();
        assert_ne!(n, 0, "connection closed before a full packet arrived");
        buf.extend_from_slice(&chunk[..n]);
    }
}

pub async fn connect_and_expect_accept(
    stream: &mut TcpStream,
    client_id: &str,
    clean_session: bool,
    will: Option<mqtt_core::codec::Will>,
) -> ConnAckPacket {
    send(
        stream,
        MqttPacket::Connect(ConnectPacket {
            protocol_level: ProtocolLevel::V4,
            clean_session,
            keep_alive: 60,
            client_id: client_id.to_string(),
            will,
            username: None,
            password: None,
        }),
    )
    .await;

    match recv(stream).await {
        MqttPacket::ConnAck(ack) => ack,
        other => panic!("expected CONNACK, got {other:?}"),
    }
}

pub async fn subscribe(stream: &mut TcpStream, packet_id: u16, filter: &str, qos: QosLevel) -> SubAckPacket {
    send(
        stream,
        MqttPacket::Subscribe(SubscribePacket {
            packet_id,
            filters: vec![SubscribeFilter {
                filter: filter.to_string(),
                qos,
                no_local: false,
            }],
        }),
    )
    .await;

    match recv(stream).await {
        MqttPacket::SubAck(ack) => ack,
        other => panic!("expected SUBACK, got {other:?}"),
    }
}

pub async fn publish(stream: &mut TcpStream, topic: &str, payload: &[u8], qos: QosLevel, retain: bool) {
    let mut packet = PublishPacket::new(topic.to_string(), qos, Bytes::copy_from_slice(payload));
    packet.retain = retain;
    if qos != QosLevel::AtMostOnce {
        packet.packet_id = Some(1);
    }
    send(stream, MqttPacket::Publish(packet)).await;
}

pub async fn connect_raw(addr: std::net::SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}
