mod common;

use mqtt_core::codec::MqttPacket;
use mqtt_core::qos::QosLevel;
use mqtt_broker::config::BrokerConfig;

#[tokio::test]
async fn unacknowledged_qos1_publish_is_redelivered_with_dup_set() {
    let mut config = BrokerConfig::default();
    config.broker.qos_retry_timeout_secs = 1;
    config.broker.qos_max_retries = 2;
    let addr = common::spawn_broker(config).await;

    let mut subscriber = common::connect_raw(addr).await;
    common::connect_and_expect_accept(&mut subscriber, "subscriber", true, None).await;
    common::subscribe(&mut subscriber, 1, "a/b", QosLevel::AtLeastOnce).await;

    let mut publisher = common::connect_raw(addr).await;
    common::connect_and_expect_accept(&mut publisher, "publisher", true, None).await;
    common::publish(&mut publisher, "a/b", b"hello", QosLevel::AtLeastOnce, false).await;

    // First delivery: fresh, no DUP. Deliberately never PUBACKs it.
    match common::recv(&mut subscriber).await {
        MqttPacket::Publish(publish) => {
            assert!(!publish.dup);
            assert_eq!(&publish.payload[..], b"hello");
        }
        other => panic!("expected the initial PUBLISH, got {other:?}"),
    }

    // The 1 Hz housekeeping tick plus the 1s retry timeout means a
    // redelivery should show up well within the harness's read timeout.
    match common::recv(&mut subscriber).await {
        MqttPacket::Publish(publish) => {
            assert!(publish.dup);
            assert_eq!(&publish.payload[..], b"hello");
        }
        other => panic!("expected a redelivered PUBLISH, got {other:?}"),
    }
}
