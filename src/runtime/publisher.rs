//! Publish request queues and outbox implementations.
//!
//! Two paths feed publishes into the runtime: other tasks send
//! [`PublishRequest`]s through an embassy-sync channel via a cloneable
//! [`PublisherHandle`], and module callbacks queue into a [`BufferedOutbox`]
//! that the runtime drains after the callback returns. Both end up in the
//! client's `publish` on the runtime's task, so the session state is only
//! ever touched from one execution context.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::Vec;

use super::traits::PublishOutbox;
use crate::packet::QoS;

/// A publish request crossing task boundaries through the channel.
///
/// Holds references; for the common embedded case of static topics and
/// payloads, use `'static`.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
}

pub type PublishRequestChannel<'a, const OUTBOX_DEPTH: usize> =
    Channel<CriticalSectionRawMutex, PublishRequest<'a>, OUTBOX_DEPTH>;

pub type PublishRequestSender<'a, const OUTBOX_DEPTH: usize> =
    Sender<'a, CriticalSectionRawMutex, PublishRequest<'a>, OUTBOX_DEPTH>;

pub type PublishRequestReceiver<'a, const OUTBOX_DEPTH: usize> =
    Receiver<'a, CriticalSectionRawMutex, PublishRequest<'a>, OUTBOX_DEPTH>;

/// Cloneable handle other tasks use to publish without touching the client.
///
/// Wraps a channel sender; the runtime receives the requests and performs
/// the actual publish on its own task.
#[derive(Clone, Copy)]
pub struct PublisherHandle<'a, const OUTBOX_DEPTH: usize> {
    tx: PublishRequestSender<'a, OUTBOX_DEPTH>,
}

impl<'a, const OUTBOX_DEPTH: usize> PublisherHandle<'a, OUTBOX_DEPTH> {
    pub fn new(tx: PublishRequestSender<'a, OUTBOX_DEPTH>) -> Self {
        Self { tx }
    }

    /// Queues a publish, waiting when the channel is full.
    pub async fn publish(&self, topic: &'a str, payload: &'a [u8], qos: QoS, retain: bool) {
        self.tx
            .send(PublishRequest {
                topic,
                payload,
                qos,
                retain,
            })
            .await;
    }

    /// Queues a publish without waiting; `false` when the channel is full.
    pub fn try_publish(&self, topic: &'a str, payload: &'a [u8], qos: QoS, retain: bool) -> bool {
        self.tx
            .try_send(PublishRequest {
                topic,
                payload,
                qos,
                retain,
            })
            .is_ok()
    }
}

/// An owned publish request with inline topic and payload storage, so the
/// outbox survives past the borrow that produced it.
#[derive(Clone)]
pub struct OwnedPublishRequest<const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> {
    pub topic: heapless::String<TOPIC_SIZE>,
    pub payload: heapless::Vec<u8, PAYLOAD_SIZE>,
    pub qos: QoS,
    pub retain: bool,
}

/// Collects publish requests during module callbacks; the runtime drains it
/// asynchronously afterwards.
pub struct BufferedOutbox<const CAPACITY: usize, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize>
{
    requests: Vec<OwnedPublishRequest<TOPIC_SIZE, PAYLOAD_SIZE>, CAPACITY>,
}

impl<const CAPACITY: usize, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize>
    BufferedOutbox<CAPACITY, TOPIC_SIZE, PAYLOAD_SIZE>
{
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    pub fn drain(
        &mut self,
    ) -> impl Iterator<Item = OwnedPublishRequest<TOPIC_SIZE, PAYLOAD_SIZE>> + '_ {
        self.requests.iter().cloned()
    }

    pub fn clear(&mut self) {
        self.requests.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }
}

impl<const CAPACITY: usize, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> Default
    for BufferedOutbox<CAPACITY, TOPIC_SIZE, PAYLOAD_SIZE>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize, const TOPIC_SIZE: usize, const PAYLOAD_SIZE: usize> PublishOutbox
    for BufferedOutbox<CAPACITY, TOPIC_SIZE, PAYLOAD_SIZE>
{
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool) {
        let mut topic_str = heapless::String::new();
        if topic_str.push_str(topic).is_err() {
            return;
        }
        let mut payload_vec = heapless::Vec::new();
        if payload_vec.extend_from_slice(payload).is_err() {
            return;
        }
        // Dropped silently when full; a module queuing more than CAPACITY
        // publishes per callback is oversized for this runtime.
        let _ = self.requests.push(OwnedPublishRequest {
            topic: topic_str,
            payload: payload_vec,
            qos,
            retain,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_collects_and_drains() {
        let mut outbox: BufferedOutbox<2, 32, 32> = BufferedOutbox::new();
        outbox.publish("a", b"1", QoS::AtMostOnce, false);
        outbox.publish("b", b"2", QoS::AtLeastOnce, true);
        // Over capacity: dropped.
        outbox.publish("c", b"3", QoS::AtMostOnce, false);
        assert_eq!(outbox.len(), 2);

        let drained: std::vec::Vec<_> = outbox.drain().collect();
        assert_eq!(drained[1].topic.as_str(), "b");
        assert_eq!(drained[1].payload.as_slice(), b"2");
        assert!(drained[1].retain);
        outbox.clear();
        assert!(outbox.is_empty());
    }

    #[test]
    fn outbox_rejects_oversized_payload() {
        let mut outbox: BufferedOutbox<2, 8, 4> = BufferedOutbox::new();
        outbox.publish("t", b"too large", QoS::AtMostOnce, false);
        assert!(outbox.is_empty());
    }
}
