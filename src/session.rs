//! # Session State
//!
//! The bookkeeping a client session carries across packets and, for QoS
//! delivery state, across reconnects: the in-flight table of unacknowledged
//! QoS 1/2 publishes, the packet identifier allocator, and the operating
//! limits the server announced in CONNACK.
//!
//! In-flight records keep the encoded PUBLISH frame so retransmission after
//! a reconnect is a verbatim resend with the dup bit set, in the original
//! send order and under the original packet identifier.

use crate::error::ReasonCode;
use crate::packet::{ConnAck, QoS};
use crate::property::Property;
use crate::varint;
use heapless::Vec;

/// Connection phase of the client engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// CONNECT sent, CONNACK not yet processed.
    Connecting,
    Connected,
    /// DISCONNECT queued, transport not yet closed.
    Disconnecting,
}

/// Where an outbound QoS publish stands in its acknowledgment exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeliveryState {
    /// QoS 1: waiting for PUBACK.
    AwaitingPubAck,
    /// QoS 2: waiting for PUBREC.
    AwaitingPubRec,
    /// QoS 2: PUBREC received, PUBREL sent, waiting for PUBCOMP.
    AwaitingPubComp,
}

/// One unacknowledged outbound publish.
#[derive(Debug, Clone)]
pub struct InflightRecord<const BUF: usize> {
    pub packet_id: u16,
    pub state: DeliveryState,
    /// The encoded PUBLISH frame as originally sent.
    pub frame: Vec<u8, BUF>,
}

impl<const BUF: usize> InflightRecord<BUF> {
    /// Sets the dup bit in the stored frame's fixed header.
    pub fn mark_dup(&mut self) {
        if let Some(first) = self.frame.first_mut() {
            *first |= 0x08;
        }
    }
}

/// Insertion-ordered table of in-flight publishes.
///
/// Capacity `N` bounds the number of concurrent QoS exchanges; the effective
/// limit is the smaller of `N` and the server's receive maximum. Order is
/// preserved so reconnect replay retransmits oldest first.
#[derive(Debug, Default)]
pub struct InflightTable<const N: usize, const BUF: usize> {
    records: Vec<InflightRecord<BUF>, N>,
}

impl<const N: usize, const BUF: usize> InflightTable<N, BUF> {
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.is_full()
    }

    pub fn contains(&self, packet_id: u16) -> bool {
        self.records.iter().any(|r| r.packet_id == packet_id)
    }

    /// Appends a record; fails when the table is full.
    pub fn insert(&mut self, record: InflightRecord<BUF>) -> Result<(), InflightRecord<BUF>> {
        self.records.push(record)
    }

    pub fn get_mut(&mut self, packet_id: u16) -> Option<&mut InflightRecord<BUF>> {
        self.records.iter_mut().find(|r| r.packet_id == packet_id)
    }

    /// Removes and returns the record, keeping the order of the rest.
    pub fn remove(&mut self, packet_id: u16) -> Option<InflightRecord<BUF>> {
        let idx = self.records.iter().position(|r| r.packet_id == packet_id)?;
        Some(self.records.remove(idx))
    }

    /// Oldest-first iteration, mutable so replay can set dup bits.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut InflightRecord<BUF>> {
        self.records.iter_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InflightRecord<BUF>> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Nonzero packet identifier allocator.
///
/// Walks the 16-bit space, skipping zero and any identifier still bound to
/// an in-flight exchange.
#[derive(Debug)]
pub struct PacketIdAllocator {
    next: u16,
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl PacketIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next free identifier, or `None` when all 65535 are bound.
    pub fn allocate(&mut self, in_use: impl Fn(u16) -> bool) -> Option<u16> {
        for _ in 0..u16::MAX {
            let candidate = self.next;
            self.next = self.next.checked_add(1).unwrap_or(1);
            if candidate != 0 && !in_use(candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Operating limits the server announced in its CONNACK properties.
///
/// Absent properties keep the protocol defaults. The client clamps its own
/// behavior to these: in-flight window, outgoing frame size, granted QoS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServerLimits {
    pub receive_maximum: u16,
    pub maximum_packet_size: u32,
    pub maximum_qos: QoS,
    pub retain_available: bool,
    pub topic_alias_maximum: u16,
    /// Keep-alive the server substituted for the requested one, if any.
    pub server_keep_alive: Option<u16>,
    pub session_expiry_interval: Option<u32>,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            receive_maximum: u16::MAX,
            // A frame can never exceed the VarInt ceiling plus its header.
            maximum_packet_size: varint::MAX_VARINT + 5,
            maximum_qos: QoS::ExactlyOnce,
            retain_available: true,
            topic_alias_maximum: 0,
            server_keep_alive: None,
            session_expiry_interval: None,
        }
    }
}

impl ServerLimits {
    pub fn from_connack(connack: &ConnAck<'_>) -> Self {
        let mut limits = Self::default();
        for property in connack.properties.iter().flatten() {
            match property {
                Property::ReceiveMaximum(v) if v > 0 => limits.receive_maximum = v,
                Property::MaximumPacketSize(v) if v > 0 => limits.maximum_packet_size = v,
                Property::MaximumQoS(0) => limits.maximum_qos = QoS::AtMostOnce,
                Property::MaximumQoS(1) => limits.maximum_qos = QoS::AtLeastOnce,
                Property::RetainAvailable(0) => limits.retain_available = false,
                Property::TopicAliasMaximum(v) => limits.topic_alias_maximum = v,
                Property::ServerKeepAlive(v) => limits.server_keep_alive = Some(v),
                Property::SessionExpiryInterval(v) => {
                    limits.session_expiry_interval = Some(v)
                }
                _ => {}
            }
        }
        limits
    }
}

/// Outcome of a finished QoS exchange, reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeliveryOutcome {
    pub packet_id: u16,
    pub reason: ReasonCode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Property, PropertyList};

    fn record(id: u16) -> InflightRecord<32> {
        InflightRecord {
            packet_id: id,
            state: DeliveryState::AwaitingPubAck,
            frame: Vec::from_slice(&[0x32, 0x00]).unwrap(),
        }
    }

    #[test]
    fn allocator_skips_zero_and_in_use() {
        let mut alloc = PacketIdAllocator::new();
        assert_eq!(alloc.allocate(|_| false), Some(1));
        assert_eq!(alloc.allocate(|id| id == 2), Some(3));
        assert_eq!(alloc.allocate(|_| false), Some(4));
    }

    #[test]
    fn allocator_wraps_past_u16_max() {
        let mut alloc = PacketIdAllocator { next: u16::MAX };
        assert_eq!(alloc.allocate(|_| false), Some(u16::MAX));
        // Wraps to 1, never produces 0.
        assert_eq!(alloc.allocate(|_| false), Some(1));
    }

    #[test]
    fn allocator_exhausts_when_all_bound() {
        let mut alloc = PacketIdAllocator::new();
        assert_eq!(alloc.allocate(|_| true), None);
    }

    #[test]
    fn table_preserves_insertion_order_across_removal() {
        let mut table: InflightTable<4, 32> = InflightTable::new();
        for id in [10, 20, 30] {
            table.insert(record(id)).unwrap();
        }
        table.remove(20).unwrap();
        let order: std::vec::Vec<u16> = table.iter().map(|r| r.packet_id).collect();
        assert_eq!(order, [10, 30]);
        assert!(!table.contains(20));
        assert!(table.contains(30));
    }

    #[test]
    fn table_rejects_insert_when_full() {
        let mut table: InflightTable<2, 32> = InflightTable::new();
        table.insert(record(1)).unwrap();
        table.insert(record(2)).unwrap();
        assert!(table.is_full());
        assert!(table.insert(record(3)).is_err());
    }

    #[test]
    fn mark_dup_sets_header_bit() {
        let mut r = record(1);
        r.mark_dup();
        assert_eq!(r.frame[0], 0x3A);
    }

    #[test]
    fn limits_from_connack_properties() {
        let mut props = PropertyList::new();
        props.push(Property::ReceiveMaximum(20)).unwrap();
        props.push(Property::MaximumPacketSize(4096)).unwrap();
        props.push(Property::MaximumQoS(1)).unwrap();
        props.push(Property::RetainAvailable(0)).unwrap();
        props.push(Property::ServerKeepAlive(30)).unwrap();
        let connack = ConnAck {
            session_present: false,
            reason: ReasonCode::Success,
            properties: props.into(),
        };
        let limits = ServerLimits::from_connack(&connack);
        assert_eq!(limits.receive_maximum, 20);
        assert_eq!(limits.maximum_packet_size, 4096);
        assert_eq!(limits.maximum_qos, QoS::AtLeastOnce);
        assert!(!limits.retain_available);
        assert_eq!(limits.server_keep_alive, Some(30));
    }

    #[test]
    fn limits_default_when_connack_is_bare() {
        let connack = ConnAck::default();
        assert_eq!(ServerLimits::from_connack(&connack), ServerLimits::default());
    }
}
