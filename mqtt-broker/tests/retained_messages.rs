mod common;

use mqtt_core::codec::MqttPacket;
use mqtt_core::qos::QosLevel;
use mqtt_core::ConnectReturnCode;
use mqtt_broker::config::BrokerConfig;

#[tokio::test]
async fn retained_message_is_replayed_to_a_new_subscriber() {
    let addr = common::spawn_broker(BrokerConfig::default()).await;

    let mut publisher = common::connect_raw(addr).await;
    let ack = common::connect_and_expect_accept(&mut publisher, "publisher", true, None).await;
    assert_eq!(ack.return_code, ConnectReturnCode::Accept);
    common::publish(&mut publisher, "sensors/temp", b"21.5", QosLevel::AtMostOnce, true).await;

    let mut subscriber = common::connect_raw(addr).await;
    common::connect_and_expect_accept(&mut subscriber, "subscriber", true, None).await;
    let suback = common::subscribe(&mut subscriber, 1, "sensors/temp", QosLevel::AtMostOnce).await;
    assert_eq!(suback.results.len(), 1);

    match common::recv(&mut subscriber).await {
        MqttPacket::Publish(publish) => {
            assert_eq!(publish.topic_name, "sensors/temp");
            assert_eq!(&publish.payload[..], b"21.5");
            assert!(publish.retain);
        }
        other => panic!("expected a retained PUBLISH, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_payload_clears_a_retained_message() {
    let addr = common::spawn_broker(BrokerConfig::default()).await;

    let mut publisher = common::connect_raw(addr).await;
    common::connect_and_expect_accept(&mut publisher, "publisher", true, None).await;
    common::publish(&mut publisher, "sensors/temp", b"21.5", QosLevel::AtMostOnce, true).await;
    common::publish(&mut publisher, "sensors/temp", b"", QosLevel::AtMostOnce, true).await;

    let mut subscriber = common::connect_raw(addr).await;
    common::connect_and_expect_accept(&mut subscriber, "subscriber", true, None).await;
    common::subscribe(&mut subscriber, 1, "sensors/temp", QosLevel::AtMostOnce).await;

    // No retained message should arrive; publish something live to prove
    // the connection is otherwise healthy and the subscriber isn't just
    // stuck waiting on a slow broker.
    common::publish(&mut publisher, "sensors/temp", b"22.0", QosLevel::AtMostOnce, false).await;
    match common::recv(&mut subscriber).await {
        MqttPacket::Publish(publish) => assert_eq!(&publish.payload[..], b"22.0"),
        other => panic!("expected the live PUBLISH, got {other:?}"),
    }
}
