//! MQTT module trait and composition utilities.
//!
//! `MqttModule` is the object-safe surface for reusable MQTT integrations
//! (telemetry, command handling, discovery announces). It is dyn-compatible
//! so modules can be stored in `StaticCell` and handed to Embassy tasks as
//! `&mut dyn MqttModule` without generic task signatures.
//!
//! Modules never perform async I/O. Incoming messages arrive through
//! `on_message` as views borrowing the client's receive buffer; outgoing
//! publishes are queued on a `PublishOutbox` and sent by the runtime after
//! the module method returns. That keeps the trait object-safe and keeps
//! borrow lifetimes contained to the callback.

use embassy_time::Duration;

use crate::packet::{Publish, QoS, SubscriptionOptions};

/// Object-safe sink for queuing publish requests.
///
/// The runtime drains the queue and performs the actual async publishing
/// after the module method returns.
pub trait PublishOutbox {
    /// Queue a message. Synchronous; returns immediately.
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool);
}

/// Object-safe sink for collecting subscriptions during registration.
///
/// The filter string is copied, so it only needs to live for the call.
/// Returns `false` when the collector is full.
pub trait TopicCollector {
    fn add(&mut self, filter: &str, options: SubscriptionOptions) -> bool;
}

/// An MQTT integration driven by the [`MqttRuntime`](super::MqttRuntime).
///
/// Dyn-compatible by design: no `async fn`, no generic methods, no
/// transport knowledge. All I/O goes through [`PublishOutbox`].
pub trait MqttModule {
    /// Registers the topic filters this module wants to receive.
    ///
    /// Called once per connection, before `on_start`.
    fn register(&self, collector: &mut dyn TopicCollector);

    /// Handles an incoming message.
    ///
    /// `msg` borrows the client's receive buffer, so responses cannot be
    /// published from here. Update state, flag a response, and publish it in
    /// `on_tick` (use [`Self::needs_immediate_publish`] to run the tick right
    /// after this call).
    fn on_message(&mut self, msg: &Publish<'_>);

    /// Periodic work; returns the interval until the next tick.
    fn on_tick(&mut self, _outbox: &mut dyn PublishOutbox) -> Duration {
        Duration::from_secs(60)
    }

    /// Called once per connection, after subscriptions are in place.
    fn on_start(&mut self, _outbox: &mut dyn PublishOutbox) {}

    /// When `true`, the runtime ticks the module immediately after
    /// `on_message` instead of waiting for the scheduled tick.
    fn needs_immediate_publish(&self) -> bool {
        false
    }
}

/// A module that does nothing. Placeholder and test double.
pub struct NoopModule;

impl MqttModule for NoopModule {
    fn register(&self, _collector: &mut dyn TopicCollector) {}

    fn on_message(&mut self, _msg: &Publish<'_>) {}
}

/// Composes two modules into one; both see every message and tick.
pub struct ModulePair<M1, M2> {
    pub first: M1,
    pub second: M2,
}

impl<M1, M2> ModulePair<M1, M2> {
    pub fn new(first: M1, second: M2) -> Self {
        Self { first, second }
    }
}

impl<M1, M2> MqttModule for ModulePair<M1, M2>
where
    M1: MqttModule,
    M2: MqttModule,
{
    fn register(&self, collector: &mut dyn TopicCollector) {
        self.first.register(collector);
        self.second.register(collector);
    }

    fn on_message(&mut self, msg: &Publish<'_>) {
        self.first.on_message(msg);
        self.second.on_message(msg);
    }

    fn on_tick(&mut self, outbox: &mut dyn PublishOutbox) -> Duration {
        let d1 = self.first.on_tick(outbox);
        let d2 = self.second.on_tick(outbox);
        // The smaller interval keeps both modules on schedule.
        if d1 < d2 { d1 } else { d2 }
    }

    fn on_start(&mut self, outbox: &mut dyn PublishOutbox) {
        self.first.on_start(outbox);
        self.second.on_start(outbox);
    }

    fn needs_immediate_publish(&self) -> bool {
        self.first.needs_immediate_publish() || self.second.needs_immediate_publish()
    }
}

/// Lets `&mut dyn MqttModule` be used wherever `MqttModule` is expected.
impl<M: MqttModule + ?Sized> MqttModule for &mut M {
    fn register(&self, collector: &mut dyn TopicCollector) {
        (**self).register(collector)
    }

    fn on_message(&mut self, msg: &Publish<'_>) {
        (**self).on_message(msg)
    }

    fn on_tick(&mut self, outbox: &mut dyn PublishOutbox) -> Duration {
        (**self).on_tick(outbox)
    }

    fn on_start(&mut self, outbox: &mut dyn PublishOutbox) {
        (**self).on_start(outbox)
    }

    fn needs_immediate_publish(&self) -> bool {
        (**self).needs_immediate_publish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::registry::TopicRegistry;

    struct Ticker(u64);

    impl MqttModule for Ticker {
        fn register(&self, collector: &mut dyn TopicCollector) {
            collector.add("cmd/ticker", SubscriptionOptions::qos(QoS::AtLeastOnce));
        }

        fn on_message(&mut self, _msg: &Publish<'_>) {}

        fn on_tick(&mut self, _outbox: &mut dyn PublishOutbox) -> Duration {
            Duration::from_secs(self.0)
        }
    }

    struct Sink;

    impl PublishOutbox for Sink {
        fn publish(&mut self, _: &str, _: &[u8], _: QoS, _: bool) {}
    }

    #[test]
    fn module_pair_registers_both_and_keeps_shortest_interval() {
        let mut pair = ModulePair::new(Ticker(10), Ticker(3));
        let mut registry = TopicRegistry::<4>::new();
        pair.register(&mut registry);
        assert_eq!(registry.len(), 2);
        assert_eq!(pair.on_tick(&mut Sink), Duration::from_secs(3));
    }
}
