use std::collections::HashMap;

use bytes::Bytes;
use mqtt_core::qos::QosLevel;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetainedMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QosLevel,
}

/// At most one retained message per topic name. Keyed by exact topic, never
/// a filter: retained messages are matched against a subscriber's filter at
/// replay time, not stored per-filter.
#[derive(Debug, Default)]
pub struct RetainedStore {
    messages: HashMap<String, RetainedMessage>,
}

impl RetainedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a retained PUBLISH: a non-empty payload replaces the stored
    /// message, an empty payload clears it.
    pub fn apply(&mut self, topic: &str, payload: Bytes, qos: QosLevel) {
        if payload.is_empty() {
            self.messages.remove(topic);
        } else {
            self.messages.insert(
                topic.to_string(),
                RetainedMessage {
                    topic: topic.to_string(),
                    payload,
                    qos,
                },
            );
        }
    }

    /// All retained messages whose topic matches `filter`, for replay on a
    /// new subscription.
    pub fn matching(&self, filter: &str) -> Vec<&RetainedMessage> {
        self.messages
            .values()
            .filter(|msg| mqtt_core::topic::matches(filter, &msg.topic))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_clears_a_retained_message() {
        let mut store = RetainedStore::new();
        store.apply("a/b", Bytes::from_static(b"hello"), QosLevel::AtMostOnce);
        assert_eq!(store.matching("a/b").len(), 1);
        store.apply("a/b", Bytes::new(), QosLevel::AtMostOnce);
        assert!(store.matching("a/b").is_empty());
    }

    #[test]
    fn matches_wildcard_filters_on_replay() {
        let mut store = RetainedStore::new();
        store.apply("a/b", Bytes::from_static(b"1"), QosLevel::AtMostOnce);
        store.apply("a/c", Bytes::from_static(b"2"), QosLevel::AtMostOnce);
        assert_eq!(store.matching("a/+").len(), 2);
        assert_eq!(store.matching("a/b").len(), 1);
    }
}
