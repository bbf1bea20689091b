//! Topic name/filter validation and wildcard matching.
//!
//! [`matches`] walks both strings level-by-level with plain iterators rather
//! than materializing a `Vec` of tokens per call, since it runs once per
//! (publish, subscription) pair on every fan-out.

/// A topic name (as carried on a PUBLISH) must be non-empty and free of
/// wildcard characters.
pub fn is_valid_publish_topic(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains(['+', '#'])
}

/// A topic filter (as carried on a SUBSCRIBE) may contain `+` and a
/// trailing `#`, but `#` is only legal as the final level and `+` must
/// occupy a whole level.
pub fn is_valid_topic_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }

    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || i != levels.len() - 1) {
            return false;
        }
        if level.contains('+') && *level != "+" {
            return false;
        }
    }
    true
}

/// Returns whether `topic` (a concrete topic name) matches `filter` (a
/// possibly-wildcarded subscription filter), per MQTT 3.1.1 section 4.7.
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        let filter_level = filter_levels.next();
        let topic_level = topic_levels.next();

        match (filter_level, topic_level) {
            (Some("#"), Some(_)) => return true,
            (Some("#"), None) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) => {
                if f != t {
                    return false;
                }
            }
            (Some(_), None) | (None, Some(_)) => return false,
            (None, None) => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches("sport/tennis/player1", "sport/tennis/player1"));
        assert!(!matches("sport/tennis/player1", "sport/tennis/player2"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(matches("sport/tennis/+", "sport/tennis/player1"));
        assert!(!matches("sport/tennis/+", "sport/tennis/player1/ranking"));
        assert!(matches("sport/+", "sport/"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(matches("sport/tennis/#", "sport/tennis"));
        assert!(matches("sport/tennis/#", "sport/tennis/player1/ranking"));
        assert!(matches("#", "sport/tennis/player1"));
    }

    #[test]
    fn hash_matches_every_topic_including_dollar_prefixed_ones() {
        assert!(matches("#", "$SYS/broker/uptime"));
        assert!(matches("+/broker/uptime", "$SYS/broker/uptime"));
        assert!(matches("$SYS/#", "$SYS/broker/uptime"));
    }

    #[test]
    fn filter_validation() {
        assert!(is_valid_topic_filter("sport/tennis/#"));
        assert!(is_valid_topic_filter("+/tennis/+"));
        assert!(!is_valid_topic_filter("sport/tennis#"));
        assert!(!is_valid_topic_filter("sport/#/player1"));
        assert!(!is_valid_topic_filter("sport+"));
        assert!(!is_valid_topic_filter(""));
    }

    #[test]
    fn publish_topic_validation() {
        assert!(is_valid_publish_topic("sport/tennis/player1"));
        assert!(!is_valid_publish_topic("sport/+"));
        assert!(!is_valid_publish_topic(""));
    }
}
