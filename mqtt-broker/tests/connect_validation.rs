mod common;

use mqtt_core::codec::{ConnectPacket, MqttPacket};
use mqtt_core::ProtocolLevel;
use mqtt_broker::config::BrokerConfig;
use tokio::io::AsyncReadExt;

#[tokio::test]
async fn a_packet_before_connect_closes_the_connection() {
    let addr = common::spawn_broker(BrokerConfig::default()).await;
    let mut client = common::connect_raw(addr).await;

    // PINGREQ before CONNECT is a protocol violation, not a keep-alive ping.
    common::send(&mut client, MqttPacket::PingReq(mqtt_core::codec::PingReqPacket)).await;

    let mut buf = [0u8; 16];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "broker should close a connection that skips CONNECT");
}

#[tokio::test]
async fn empty_client_id_with_persistent_session_is_rejected_with_connack_0x02() {
    let addr = common::spawn_broker(BrokerConfig::default()).await;
    let mut client = common::connect_raw(addr).await;

    common::send(
        &mut client,
        MqttPacket::Connect(ConnectPacket {
            protocol_level: ProtocolLevel::V4,
            clean_session: false,
            keep_alive: 60,
            client_id: String::new(),
            will: None,
            username: None,
            password: None,
        }),
    )
    .await;

    match common::recv(&mut client).await {
        MqttPacket::ConnAck(ack) => {
            assert_eq!(ack.return_code, mqtt_core::ConnectReturnCode::IdentifierRejected);
        }
        other => panic!("expected CONNACK, got {other:?}"),
    }

    let mut buf = [0u8; 16];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "broker should close the connection after CONNACK 0x02");
}
