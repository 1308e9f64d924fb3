//! Subscription registration for MQTT modules.

use heapless::{String, Vec};

use super::traits::TopicCollector;
use crate::packet::SubscriptionOptions;

/// Maximum length of a registered topic filter.
pub const MAX_TOPIC_LEN: usize = 128;

/// Owns the topic filters modules registered, together with the
/// subscription options each filter was registered with.
///
/// Filters are copied on add, which keeps the object-safe
/// [`TopicCollector`] trait free of lifetimes.
#[derive(Default)]
pub struct TopicRegistry<const MAX_TOPICS: usize> {
    entries: Vec<(String<MAX_TOPIC_LEN>, SubscriptionOptions), MAX_TOPICS>,
}

impl<const MAX_TOPICS: usize> TopicRegistry<MAX_TOPICS> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the filter in. Returns `false` when the registry is full or
    /// the filter is too long.
    pub fn add_filter(&mut self, filter: &str, options: SubscriptionOptions) -> bool {
        let mut owned = String::new();
        if owned.push_str(filter).is_err() {
            return false;
        }
        self.entries.push((owned, options)).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SubscriptionOptions)> {
        self.entries.iter().map(|(s, o)| (s.as_str(), *o))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<const MAX_TOPICS: usize> TopicCollector for TopicRegistry<MAX_TOPICS> {
    fn add(&mut self, filter: &str, options: SubscriptionOptions) -> bool {
        self.add_filter(filter, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::QoS;

    #[test]
    fn keeps_options_per_filter() {
        let mut registry = TopicRegistry::<2>::new();
        assert!(registry.add_filter("a/#", SubscriptionOptions::qos(QoS::AtLeastOnce)));
        assert!(registry.add_filter("b", SubscriptionOptions::default()));
        assert!(!registry.add_filter("c", SubscriptionOptions::default()));

        let collected: std::vec::Vec<_> = registry.iter().collect();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].0, "a/#");
        assert_eq!(collected[0].1.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn rejects_overlong_filter() {
        let mut registry = TopicRegistry::<2>::new();
        let long = core::str::from_utf8(&[b'x'; MAX_TOPIC_LEN + 1]).unwrap();
        assert!(!registry.add_filter(long, SubscriptionOptions::default()));
        assert!(registry.is_empty());
    }
}
