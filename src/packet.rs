//! # MQTT v5 Control Packets
//!
//! Structures and wire codec for all fifteen control packet types. Every
//! packet shares the same frame: a fixed header carrying the packet type,
//! four flag bits and a VarInt remaining length, then a variable header and
//! payload whose layout depends on the type.
//!
//! [`check_header`] validates the fixed header and pre-computes the full
//! frame size without touching the body, so a streaming reader knows how
//! many bytes to accumulate before calling [`Packet::decode`]. Decoded
//! packets borrow the input buffer; nothing is copied out of it.
//!
//! Encoding reserves the maximum four length bytes up front, writes the body,
//! then back-fills the actual VarInt and compacts the gap, avoiding a second
//! serialization pass to learn the length.

use crate::error::{DecodeError, EncodeError, ReasonCode};
use crate::property::{self, Properties, PropertiesView};
use crate::varint;
use crate::wire;
use heapless::Vec;

/// Maximum topic filters per SUBSCRIBE/UNSUBSCRIBE packet.
pub const MAX_TOPIC_FILTERS: usize = 8;

/// The four-bit control packet type from the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ControlPacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl ControlPacketType {
    /// Maps the type nibble; 0 is reserved and maps to `None`.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::Connect,
            2 => Self::ConnAck,
            3 => Self::Publish,
            4 => Self::PubAck,
            5 => Self::PubRec,
            6 => Self::PubRel,
            7 => Self::PubComp,
            8 => Self::Subscribe,
            9 => Self::SubAck,
            10 => Self::Unsubscribe,
            11 => Self::UnsubAck,
            12 => Self::PingReq,
            13 => Self::PingResp,
            14 => Self::Disconnect,
            15 => Self::Auth,
            _ => return None,
        })
    }

    /// The mandated flag nibble, or `None` for PUBLISH whose flags carry
    /// dup/QoS/retain.
    pub fn fixed_flags(self) -> Option<u8> {
        match self {
            Self::Publish => None,
            Self::PubRel | Self::Subscribe | Self::Unsubscribe => Some(0x02),
            _ => Some(0x00),
        }
    }
}

/// Quality of service level for message delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    /// Maps a two-bit field; the value 3 is invalid.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }
}

/// A validated fixed header plus the frame geometry derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameHeader {
    pub packet_type: ControlPacketType,
    pub flags: u8,
    pub remaining_length: u32,
    /// Bytes occupied by the fixed header itself (type byte + length bytes).
    pub header_len: usize,
}

impl FrameHeader {
    /// Full frame size: fixed header plus remaining length.
    pub fn total_len(&self) -> usize {
        self.header_len + self.remaining_length as usize
    }
}

/// Validates the fixed header at the start of `buf` and pre-computes the
/// frame size, without touching the body.
///
/// `NotEnoughData` means the header itself is still incomplete; `BadData`
/// means a reserved packet type, illegal flag bits, or a malformed length.
pub fn check_header(buf: &[u8]) -> Result<FrameHeader, DecodeError> {
    let first = *buf.first().ok_or(DecodeError::NotEnoughData)?;
    let packet_type = ControlPacketType::from_u8(first >> 4).ok_or(DecodeError::BadData)?;
    let flags = first & 0x0F;
    match packet_type.fixed_flags() {
        Some(expected) if flags != expected => return Err(DecodeError::BadData),
        None => {
            // PUBLISH: only the QoS bits can be invalid at this level.
            if (flags >> 1) & 0x03 == 3 {
                return Err(DecodeError::BadData);
            }
        }
        _ => {}
    }
    let (remaining_length, n) = varint::decode(&buf[1..])?;
    Ok(FrameHeader {
        packet_type,
        flags,
        remaining_length,
        header_len: 1 + n,
    })
}

/// How retained messages are forwarded when a subscription is made
/// (SUBSCRIBE options bits 4-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RetainHandling {
    #[default]
    SendAtSubscribe = 0,
    SendAtSubscribeNew = 1,
    DontSend = 2,
}

/// Per-filter subscription options byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubscriptionOptions {
    pub qos: QoS,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

impl SubscriptionOptions {
    pub fn qos(qos: QoS) -> Self {
        Self { qos, ..Self::default() }
    }

    pub fn to_byte(self) -> u8 {
        self.qos as u8
            | (self.no_local as u8) << 2
            | (self.retain_as_published as u8) << 3
            | (self.retain_handling as u8) << 4
    }

    /// Bits 6-7 are reserved and must be zero; retain handling 3 is invalid.
    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        if byte & 0xC0 != 0 {
            return Err(DecodeError::BadData);
        }
        let qos = QoS::from_bits(byte & 0x03).ok_or(DecodeError::BadData)?;
        let retain_handling = match (byte >> 4) & 0x03 {
            0 => RetainHandling::SendAtSubscribe,
            1 => RetainHandling::SendAtSubscribeNew,
            2 => RetainHandling::DontSend,
            _ => return Err(DecodeError::BadData),
        };
        Ok(Self {
            qos,
            no_local: byte & 0x04 != 0,
            retain_as_published: byte & 0x08 != 0,
            retain_handling,
        })
    }
}

/// One topic filter + options entry of a SUBSCRIBE packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SubscriptionEntry<'a> {
    pub filter: &'a str,
    pub options: SubscriptionOptions,
}

/// The will message registered at connect time, published by the server if
/// the session ends abnormally.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Will<'a> {
    pub properties: Properties<'a>,
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
}

/// CONNECT: the session-opening packet (always protocol level 5).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Connect<'a> {
    pub clean_start: bool,
    pub keep_alive: u16,
    pub properties: Properties<'a>,
    pub client_id: &'a str,
    pub will: Option<Will<'a>>,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_start: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_start,
            ..Self::default()
        }
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.clean_start {
            flags |= 0x02;
        }
        if let Some(will) = &self.will {
            flags |= 0x04 | (will.qos as u8) << 3;
            if will.retain {
                flags |= 0x20;
            }
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        flags
    }

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut n = wire::write_utf8_string(buf, "MQTT")?;
        n += wire::write_u8(&mut buf[n..], 5)?;
        n += wire::write_u8(&mut buf[n..], self.connect_flags())?;
        n += wire::write_u16(&mut buf[n..], self.keep_alive)?;
        n += self.properties.encode_into(&mut buf[n..])?;
        n += wire::write_utf8_string(&mut buf[n..], self.client_id)?;
        if let Some(will) = &self.will {
            n += will.properties.encode_into(&mut buf[n..])?;
            n += wire::write_utf8_string(&mut buf[n..], will.topic)?;
            n += wire::write_binary_data(&mut buf[n..], will.payload)?;
        }
        if let Some(username) = self.username {
            n += wire::write_utf8_string(&mut buf[n..], username)?;
        }
        if let Some(password) = self.password {
            n += wire::write_binary_data(&mut buf[n..], password)?;
        }
        Ok(n)
    }

    fn decode_body(cursor: &mut usize, buf: &'a [u8]) -> Result<Self, DecodeError> {
        if wire::read_utf8_string(cursor, buf)? != "MQTT" {
            return Err(DecodeError::BadData);
        }
        if wire::read_u8(cursor, buf)? != 5 {
            return Err(DecodeError::BadData);
        }
        let flags = wire::read_u8(cursor, buf)?;
        // Bit 0 is reserved and must stay clear.
        if flags & 0x01 != 0 {
            return Err(DecodeError::BadData);
        }
        let keep_alive = wire::read_u16(cursor, buf)?;
        let properties: Properties = PropertiesView::decode(cursor, buf)?.into();
        if !properties.check_for(ControlPacketType::Connect) {
            return Err(DecodeError::BadData);
        }
        let client_id = wire::read_utf8_string(cursor, buf)?;
        let will = if flags & 0x04 != 0 {
            let qos = QoS::from_bits((flags >> 3) & 0x03).ok_or(DecodeError::BadData)?;
            let will_props: Properties = PropertiesView::decode(cursor, buf)?.into();
            if !will_props
                .iter()
                .all(|p| matches!(p, Ok(p) if property::is_allowed_in_will(p.id())))
            {
                return Err(DecodeError::BadData);
            }
            let topic = wire::read_utf8_string(cursor, buf)?;
            let payload = wire::read_binary_data(cursor, buf)?;
            Some(Will {
                properties: will_props,
                topic,
                payload,
                qos,
                retain: flags & 0x20 != 0,
            })
        } else {
            // Will QoS and retain must be zero without a will.
            if flags & 0x38 != 0 {
                return Err(DecodeError::BadData);
            }
            None
        };
        let username = if flags & 0x80 != 0 {
            Some(wire::read_utf8_string(cursor, buf)?)
        } else {
            None
        };
        let password = if flags & 0x40 != 0 {
            Some(wire::read_binary_data(cursor, buf)?)
        } else {
            None
        };
        Ok(Self {
            clean_start: flags & 0x02 != 0,
            keep_alive,
            properties,
            client_id,
            will,
            username,
            password,
        })
    }
}

/// CONNACK: the server's answer to CONNECT.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConnAck<'a> {
    pub session_present: bool,
    pub reason: ReasonCode,
    pub properties: Properties<'a>,
}

impl<'a> ConnAck<'a> {
    fn encode_body(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut n = wire::write_u8(buf, self.session_present as u8)?;
        n += wire::write_u8(&mut buf[n..], self.reason.value())?;
        n += self.properties.encode_into(&mut buf[n..])?;
        Ok(n)
    }

    fn decode_body(cursor: &mut usize, buf: &'a [u8]) -> Result<Self, DecodeError> {
        let ack_flags = wire::read_u8(cursor, buf)?;
        if ack_flags & 0xFE != 0 {
            return Err(DecodeError::BadData);
        }
        let reason = ReasonCode::from(wire::read_u8(cursor, buf)?);
        let properties: Properties = PropertiesView::decode(cursor, buf)?.into();
        if !properties.check_for(ControlPacketType::ConnAck) {
            return Err(DecodeError::BadData);
        }
        Ok(Self {
            session_present: ack_flags & 0x01 != 0,
            reason,
            properties,
        })
    }
}

/// PUBLISH: an application message in either direction.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Publish<'a> {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: &'a str,
    /// Required (and nonzero) when `qos` is above `AtMostOnce`.
    pub packet_id: Option<u16>,
    pub properties: Properties<'a>,
    pub payload: &'a [u8],
}

impl<'a> Publish<'a> {
    pub fn new(topic: &'a str, payload: &'a [u8], qos: QoS) -> Self {
        Self {
            topic,
            payload,
            qos,
            ..Self::default()
        }
    }

    fn flags(&self) -> u8 {
        (self.dup as u8) << 3 | (self.qos as u8) << 1 | self.retain as u8
    }

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut n = wire::write_utf8_string(buf, self.topic)?;
        if self.qos != QoS::AtMostOnce {
            let id = match self.packet_id {
                Some(id) if id != 0 => id,
                _ => return Err(EncodeError::MissingPacketId),
            };
            n += wire::write_u16(&mut buf[n..], id)?;
        }
        n += self.properties.encode_into(&mut buf[n..])?;
        let end = n + self.payload.len();
        buf.get_mut(n..end)
            .ok_or(EncodeError::BufferTooSmall)?
            .copy_from_slice(self.payload);
        Ok(end)
    }

    fn decode_body(
        header: &FrameHeader,
        cursor: &mut usize,
        buf: &'a [u8],
    ) -> Result<Self, DecodeError> {
        let dup = header.flags & 0x08 != 0;
        let qos = QoS::from_bits((header.flags >> 1) & 0x03).ok_or(DecodeError::BadData)?;
        if dup && qos == QoS::AtMostOnce {
            return Err(DecodeError::BadData);
        }
        let topic = wire::read_utf8_string(cursor, buf)?;
        let packet_id = if qos != QoS::AtMostOnce {
            let id = wire::read_u16(cursor, buf)?;
            if id == 0 {
                return Err(DecodeError::BadData);
            }
            Some(id)
        } else {
            None
        };
        let properties: Properties = PropertiesView::decode(cursor, buf)?.into();
        if !properties.check_for(ControlPacketType::Publish) {
            return Err(DecodeError::BadData);
        }
        let payload = &buf[*cursor..];
        *cursor = buf.len();
        Ok(Self {
            dup,
            qos,
            retain: header.flags & 0x01 != 0,
            topic,
            packet_id,
            properties,
            payload,
        })
    }
}

/// Which member of the publish acknowledgment family a [`PublishAck`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckKind {
    PubAck,
    PubRec,
    PubRel,
    PubComp,
}

impl AckKind {
    pub fn packet_type(self) -> ControlPacketType {
        match self {
            Self::PubAck => ControlPacketType::PubAck,
            Self::PubRec => ControlPacketType::PubRec,
            Self::PubRel => ControlPacketType::PubRel,
            Self::PubComp => ControlPacketType::PubComp,
        }
    }
}

/// PUBACK, PUBREC, PUBREL and PUBCOMP share one shape: packet id, reason
/// code, properties. The two abbreviated forms (remaining length 2 and 3)
/// decode to a `Success` reason and empty properties, and encoding emits the
/// shortest legal form.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishAck<'a> {
    pub kind: AckKind,
    pub packet_id: u16,
    pub reason: ReasonCode,
    pub properties: Properties<'a>,
}

impl<'a> PublishAck<'a> {
    pub fn new(kind: AckKind, packet_id: u16) -> Self {
        Self {
            kind,
            packet_id,
            reason: ReasonCode::Success,
            properties: Properties::default(),
        }
    }

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut n = wire::write_u16(buf, self.packet_id)?;
        if self.reason == ReasonCode::Success && self.properties.is_empty() {
            return Ok(n);
        }
        n += wire::write_u8(&mut buf[n..], self.reason.value())?;
        if !self.properties.is_empty() {
            n += self.properties.encode_into(&mut buf[n..])?;
        }
        Ok(n)
    }

    fn decode_body(
        kind: AckKind,
        header: &FrameHeader,
        cursor: &mut usize,
        buf: &'a [u8],
    ) -> Result<Self, DecodeError> {
        let packet_id = wire::read_u16(cursor, buf)?;
        if packet_id == 0 {
            return Err(DecodeError::BadData);
        }
        let mut ack = Self::new(kind, packet_id);
        if header.remaining_length == 2 {
            return Ok(ack);
        }
        ack.reason = ReasonCode::from(wire::read_u8(cursor, buf)?);
        if header.remaining_length == 3 {
            return Ok(ack);
        }
        let properties: Properties = PropertiesView::decode(cursor, buf)?.into();
        if !properties.check_for(kind.packet_type()) {
            return Err(DecodeError::BadData);
        }
        ack.properties = properties;
        Ok(ack)
    }
}

/// SUBSCRIBE: requests one or more topic filter subscriptions.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub properties: Properties<'a>,
    pub entries: Vec<SubscriptionEntry<'a>, MAX_TOPIC_FILTERS>,
}

impl<'a> Subscribe<'a> {
    pub fn new(packet_id: u16, filter: &'a str, options: SubscriptionOptions) -> Self {
        let mut entries = Vec::new();
        let _ = entries.push(SubscriptionEntry { filter, options });
        Self {
            packet_id,
            properties: Properties::default(),
            entries,
        }
    }

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut n = wire::write_u16(buf, self.packet_id)?;
        n += self.properties.encode_into(&mut buf[n..])?;
        for entry in &self.entries {
            n += wire::write_utf8_string(&mut buf[n..], entry.filter)?;
            n += wire::write_u8(&mut buf[n..], entry.options.to_byte())?;
        }
        Ok(n)
    }

    fn decode_body(cursor: &mut usize, buf: &'a [u8]) -> Result<Self, DecodeError> {
        let packet_id = wire::read_u16(cursor, buf)?;
        let properties: Properties = PropertiesView::decode(cursor, buf)?.into();
        if !properties.check_for(ControlPacketType::Subscribe) {
            return Err(DecodeError::BadData);
        }
        let mut entries = Vec::new();
        while *cursor < buf.len() {
            let filter = wire::read_utf8_string(cursor, buf)?;
            let options = SubscriptionOptions::from_byte(wire::read_u8(cursor, buf)?)?;
            entries
                .push(SubscriptionEntry { filter, options })
                .map_err(|_| DecodeError::BadData)?;
        }
        if entries.is_empty() {
            return Err(DecodeError::BadData);
        }
        Ok(Self {
            packet_id,
            properties,
            entries,
        })
    }
}

/// SUBACK: per-filter grant or rejection codes for a SUBSCRIBE.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SubAck<'a> {
    pub packet_id: u16,
    pub properties: Properties<'a>,
    /// One reason code per requested filter, in request order.
    pub codes: &'a [u8],
}

impl<'a> SubAck<'a> {
    fn encode_body(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut n = wire::write_u16(buf, self.packet_id)?;
        n += self.properties.encode_into(&mut buf[n..])?;
        let end = n + self.codes.len();
        buf.get_mut(n..end)
            .ok_or(EncodeError::BufferTooSmall)?
            .copy_from_slice(self.codes);
        Ok(end)
    }

    fn decode_body(
        packet_type: ControlPacketType,
        cursor: &mut usize,
        buf: &'a [u8],
    ) -> Result<Self, DecodeError> {
        let packet_id = wire::read_u16(cursor, buf)?;
        let properties: Properties = PropertiesView::decode(cursor, buf)?.into();
        if !properties.check_for(packet_type) {
            return Err(DecodeError::BadData);
        }
        let codes = &buf[*cursor..];
        *cursor = buf.len();
        if codes.is_empty() {
            return Err(DecodeError::BadData);
        }
        Ok(Self {
            packet_id,
            properties,
            codes,
        })
    }
}

/// UNSUBSCRIBE: removes one or more topic filter subscriptions.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Unsubscribe<'a> {
    pub packet_id: u16,
    pub properties: Properties<'a>,
    pub filters: Vec<&'a str, MAX_TOPIC_FILTERS>,
}

impl<'a> Unsubscribe<'a> {
    pub fn new(packet_id: u16, filter: &'a str) -> Self {
        let mut filters = Vec::new();
        let _ = filters.push(filter);
        Self {
            packet_id,
            properties: Properties::default(),
            filters,
        }
    }

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut n = wire::write_u16(buf, self.packet_id)?;
        n += self.properties.encode_into(&mut buf[n..])?;
        for filter in &self.filters {
            n += wire::write_utf8_string(&mut buf[n..], filter)?;
        }
        Ok(n)
    }

    fn decode_body(cursor: &mut usize, buf: &'a [u8]) -> Result<Self, DecodeError> {
        let packet_id = wire::read_u16(cursor, buf)?;
        let properties: Properties = PropertiesView::decode(cursor, buf)?.into();
        if !properties.check_for(ControlPacketType::Unsubscribe) {
            return Err(DecodeError::BadData);
        }
        let mut filters = Vec::new();
        while *cursor < buf.len() {
            filters
                .push(wire::read_utf8_string(cursor, buf)?)
                .map_err(|_| DecodeError::BadData)?;
        }
        if filters.is_empty() {
            return Err(DecodeError::BadData);
        }
        Ok(Self {
            packet_id,
            properties,
            filters,
        })
    }
}

/// DISCONNECT and AUTH share one body shape: a reason code and properties,
/// where an empty body is shorthand for `Success` with no properties.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReasonPacket<'a> {
    pub reason: ReasonCode,
    pub properties: Properties<'a>,
}

impl<'a> ReasonPacket<'a> {
    pub fn with_reason(reason: ReasonCode) -> Self {
        Self {
            reason,
            properties: Properties::default(),
        }
    }

    fn encode_body(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        if self.reason == ReasonCode::Success && self.properties.is_empty() {
            return Ok(0);
        }
        let mut n = wire::write_u8(buf, self.reason.value())?;
        if !self.properties.is_empty() {
            n += self.properties.encode_into(&mut buf[n..])?;
        }
        Ok(n)
    }

    fn decode_body(
        packet_type: ControlPacketType,
        header: &FrameHeader,
        cursor: &mut usize,
        buf: &'a [u8],
    ) -> Result<Self, DecodeError> {
        if header.remaining_length == 0 {
            return Ok(Self::default());
        }
        let reason = ReasonCode::from(wire::read_u8(cursor, buf)?);
        if header.remaining_length == 1 {
            return Ok(Self::with_reason(reason));
        }
        let properties: Properties = PropertiesView::decode(cursor, buf)?.into();
        if !properties.check_for(packet_type) {
            return Err(DecodeError::BadData);
        }
        Ok(Self { reason, properties })
    }
}

/// Any decoded control packet, borrowing the frame it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet<'a> {
    Connect(Connect<'a>),
    ConnAck(ConnAck<'a>),
    Publish(Publish<'a>),
    PublishAck(PublishAck<'a>),
    Subscribe(Subscribe<'a>),
    SubAck(SubAck<'a>),
    Unsubscribe(Unsubscribe<'a>),
    UnsubAck(SubAck<'a>),
    PingReq,
    PingResp,
    Disconnect(ReasonPacket<'a>),
    Auth(ReasonPacket<'a>),
}

impl<'a> Packet<'a> {
    pub fn packet_type(&self) -> ControlPacketType {
        match self {
            Self::Connect(_) => ControlPacketType::Connect,
            Self::ConnAck(_) => ControlPacketType::ConnAck,
            Self::Publish(_) => ControlPacketType::Publish,
            Self::PublishAck(ack) => ack.kind.packet_type(),
            Self::Subscribe(_) => ControlPacketType::Subscribe,
            Self::SubAck(_) => ControlPacketType::SubAck,
            Self::Unsubscribe(_) => ControlPacketType::Unsubscribe,
            Self::UnsubAck(_) => ControlPacketType::UnsubAck,
            Self::PingReq => ControlPacketType::PingReq,
            Self::PingResp => ControlPacketType::PingResp,
            Self::Disconnect(_) => ControlPacketType::Disconnect,
            Self::Auth(_) => ControlPacketType::Auth,
        }
    }

    /// Decodes one complete frame from the start of `buf`.
    ///
    /// Returns the packet and the number of bytes it occupied, so a streaming
    /// reader can drop exactly one frame from its buffer. `NotEnoughData`
    /// means the frame is incomplete and the caller should read more bytes.
    pub fn decode(buf: &'a [u8]) -> Result<(Self, usize), DecodeError> {
        let header = check_header(buf)?;
        let total = header.total_len();
        let frame = buf.get(..total).ok_or(DecodeError::NotEnoughData)?;
        let mut cursor = header.header_len;
        let packet = match header.packet_type {
            ControlPacketType::Connect => {
                Self::Connect(Connect::decode_body(&mut cursor, frame)?)
            }
            ControlPacketType::ConnAck => {
                Self::ConnAck(ConnAck::decode_body(&mut cursor, frame)?)
            }
            ControlPacketType::Publish => {
                Self::Publish(Publish::decode_body(&header, &mut cursor, frame)?)
            }
            ControlPacketType::PubAck => Self::PublishAck(PublishAck::decode_body(
                AckKind::PubAck,
                &header,
                &mut cursor,
                frame,
            )?),
            ControlPacketType::PubRec => Self::PublishAck(PublishAck::decode_body(
                AckKind::PubRec,
                &header,
                &mut cursor,
                frame,
            )?),
            ControlPacketType::PubRel => Self::PublishAck(PublishAck::decode_body(
                AckKind::PubRel,
                &header,
                &mut cursor,
                frame,
            )?),
            ControlPacketType::PubComp => Self::PublishAck(PublishAck::decode_body(
                AckKind::PubComp,
                &header,
                &mut cursor,
                frame,
            )?),
            ControlPacketType::Subscribe => {
                Self::Subscribe(Subscribe::decode_body(&mut cursor, frame)?)
            }
            ControlPacketType::SubAck => Self::SubAck(SubAck::decode_body(
                ControlPacketType::SubAck,
                &mut cursor,
                frame,
            )?),
            ControlPacketType::Unsubscribe => {
                Self::Unsubscribe(Unsubscribe::decode_body(&mut cursor, frame)?)
            }
            ControlPacketType::UnsubAck => Self::UnsubAck(SubAck::decode_body(
                ControlPacketType::UnsubAck,
                &mut cursor,
                frame,
            )?),
            ControlPacketType::PingReq | ControlPacketType::PingResp => {
                if header.remaining_length != 0 {
                    return Err(DecodeError::BadData);
                }
                if header.packet_type == ControlPacketType::PingReq {
                    Self::PingReq
                } else {
                    Self::PingResp
                }
            }
            ControlPacketType::Disconnect => Self::Disconnect(ReasonPacket::decode_body(
                ControlPacketType::Disconnect,
                &header,
                &mut cursor,
                frame,
            )?),
            ControlPacketType::Auth => Self::Auth(ReasonPacket::decode_body(
                ControlPacketType::Auth,
                &header,
                &mut cursor,
                frame,
            )?),
        };
        // The body must consume the frame exactly.
        if cursor != total {
            return Err(DecodeError::BadData);
        }
        Ok((packet, total))
    }

    /// Encodes the packet into `buf`, returning the frame length.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let flags = match self {
            Self::Publish(p) => p.flags(),
            other => other
                .packet_type()
                .fixed_flags()
                .unwrap_or_default(),
        };
        let first = (self.packet_type() as u8) << 4 | flags;
        wire::write_u8(buf, first)?;
        // Reserve the worst-case four length bytes; the body lands after
        // them and is compacted once the actual length is known.
        const CONTENT_START: usize = 5;
        if buf.len() < CONTENT_START {
            return Err(EncodeError::BufferTooSmall);
        }
        let body = &mut buf[CONTENT_START..];
        let body_len = match self {
            Self::Connect(p) => p.encode_body(body)?,
            Self::ConnAck(p) => p.encode_body(body)?,
            Self::Publish(p) => p.encode_body(body)?,
            Self::PublishAck(p) => p.encode_body(body)?,
            Self::Subscribe(p) => p.encode_body(body)?,
            Self::SubAck(p) | Self::UnsubAck(p) => p.encode_body(body)?,
            Self::Unsubscribe(p) => p.encode_body(body)?,
            Self::PingReq | Self::PingResp => 0,
            Self::Disconnect(p) | Self::Auth(p) => p.encode_body(body)?,
        };
        let len_bytes = varint::encode(body_len as u32, &mut buf[1..CONTENT_START])?;
        let header_len = 1 + len_bytes;
        buf.copy_within(CONTENT_START..CONTENT_START + body_len, header_len);
        Ok(header_len + body_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Property, PropertyList};

    fn round_trip(packet: Packet<'_>, buf: &mut [u8]) -> usize {
        let n = packet.encode(buf).unwrap();
        let (decoded, consumed) = Packet::decode(&buf[..n]).unwrap();
        assert_eq!(consumed, n);
        assert_eq!(decoded, packet);
        n
    }

    #[test]
    fn header_of_partial_frame() {
        // PUBLISH with a two-byte length, second length byte missing.
        assert_eq!(check_header(&[0x30]), Err(DecodeError::NotEnoughData));
        let h = check_header(&[0x32, 0x80, 0x01]).unwrap();
        assert_eq!(h.packet_type, ControlPacketType::Publish);
        assert_eq!(h.remaining_length, 128);
        assert_eq!(h.header_len, 3);
        assert_eq!(h.total_len(), 131);
    }

    #[test]
    fn header_rejects_reserved_type_and_bad_flags() {
        assert_eq!(check_header(&[0x00, 0x00]), Err(DecodeError::BadData));
        // SUBSCRIBE must carry flags 0b0010.
        assert_eq!(check_header(&[0x80, 0x00]), Err(DecodeError::BadData));
        assert!(check_header(&[0x82, 0x00]).is_ok());
        // PUBLISH with QoS bits 0b11.
        assert_eq!(check_header(&[0x36, 0x00]), Err(DecodeError::BadData));
    }

    #[test]
    fn minimal_connect_bytes() {
        let connect = Connect::new("dev1", 60, true);
        let mut buf = [0u8; 64];
        let n = Packet::Connect(connect).encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..n],
            &[
                0x10, 0x11, // CONNECT, remaining length 17
                0x00, 0x04, b'M', b'Q', b'T', b'T', 0x05, // protocol name + level
                0x02, // clean start
                0x00, 0x3C, // keep alive 60
                0x00, // no properties
                0x00, 0x04, b'd', b'e', b'v', b'1',
            ]
        );
    }

    #[test]
    fn connect_with_will_and_credentials() {
        let mut will_props = PropertyList::new();
        will_props.push(Property::WillDelayInterval(5)).unwrap();
        let mut connect = Connect::new("sensor", 30, false);
        connect.will = Some(Will {
            properties: will_props.into(),
            topic: "status/sensor",
            payload: b"offline",
            qos: QoS::AtLeastOnce,
            retain: true,
        });
        connect.username = Some("user");
        connect.password = Some(b"secret");
        let mut buf = [0u8; 128];
        round_trip(Packet::Connect(connect), &mut buf);
    }

    #[test]
    fn connect_password_without_username() {
        let mut connect = Connect::new("c", 10, true);
        connect.password = Some(b"token");
        let mut buf = [0u8; 64];
        round_trip(Packet::Connect(connect), &mut buf);
    }

    #[test]
    fn connack_round_trip() {
        let mut props = PropertyList::new();
        props.push(Property::ReceiveMaximum(10)).unwrap();
        props.push(Property::AssignedClientId("auto-17")).unwrap();
        let connack = ConnAck {
            session_present: true,
            reason: ReasonCode::Success,
            properties: props.into(),
        };
        let mut buf = [0u8; 64];
        round_trip(Packet::ConnAck(connack), &mut buf);
    }

    #[test]
    fn connack_rejects_reserved_ack_flags() {
        // ack flags 0x02, reason 0, empty properties.
        let raw = [0x20, 0x03, 0x02, 0x00, 0x00];
        assert_eq!(Packet::decode(&raw), Err(DecodeError::BadData));
    }

    #[test]
    fn publish_qos0_round_trip() {
        let mut publish = Publish::new("sensors/temp", b"21.5", QoS::AtMostOnce);
        publish.retain = true;
        let mut buf = [0u8; 64];
        round_trip(Packet::Publish(publish), &mut buf);
    }

    #[test]
    fn publish_qos2_with_properties() {
        let mut props = PropertyList::new();
        props.push(Property::MessageExpiryInterval(300)).unwrap();
        props.push(Property::ContentType("text/plain")).unwrap();
        let publish = Publish {
            dup: true,
            qos: QoS::ExactlyOnce,
            retain: false,
            topic: "a/b",
            packet_id: Some(7),
            properties: props.into(),
            payload: b"payload",
        };
        let mut buf = [0u8; 64];
        round_trip(Packet::Publish(publish), &mut buf);
    }

    #[test]
    fn publish_without_id_at_qos1_fails_to_encode() {
        let publish = Publish::new("t", b"x", QoS::AtLeastOnce);
        let mut buf = [0u8; 64];
        assert_eq!(
            Packet::Publish(publish).encode(&mut buf),
            Err(EncodeError::MissingPacketId)
        );
        let mut zero = Publish::new("t", b"x", QoS::ExactlyOnce);
        zero.packet_id = Some(0);
        assert_eq!(
            Packet::Publish(zero).encode(&mut buf),
            Err(EncodeError::MissingPacketId)
        );
    }

    #[test]
    fn publish_dup_at_qos0_rejected() {
        // flags 0b1000: dup set, QoS 0. Body: topic "a", no props, empty payload.
        let raw = [0x38, 0x04, 0x00, 0x01, b'a', 0x00];
        assert_eq!(Packet::decode(&raw), Err(DecodeError::BadData));
    }

    #[test]
    fn publish_rejects_misplaced_property() {
        let mut props = PropertyList::new();
        props.push(Property::AssignedClientId("x")).unwrap();
        let mut publish = Publish::new("t", b"", QoS::AtMostOnce);
        publish.properties = props.into();
        let mut buf = [0u8; 64];
        let n = Packet::Publish(publish).encode(&mut buf).unwrap();
        assert_eq!(Packet::decode(&buf[..n]), Err(DecodeError::BadData));
    }

    #[test]
    fn puback_shortest_form() {
        let ack = PublishAck::new(AckKind::PubAck, 42);
        let mut buf = [0u8; 16];
        let n = Packet::PublishAck(ack).encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x40, 0x02, 0x00, 0x2A]);
    }

    #[test]
    fn puback_reason_only_form() {
        let mut ack = PublishAck::new(AckKind::PubAck, 1);
        ack.reason = ReasonCode::NoMatchingSubscribers;
        let mut buf = [0u8; 16];
        let n = Packet::PublishAck(ack.clone()).encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x40, 0x03, 0x00, 0x01, 0x10]);
        let (decoded, _) = Packet::decode(&buf[..n]).unwrap();
        assert_eq!(decoded, Packet::PublishAck(ack));
    }

    #[test]
    fn pubrel_carries_fixed_flags() {
        let rel = PublishAck::new(AckKind::PubRel, 9);
        let mut buf = [0u8; 16];
        let n = Packet::PublishAck(rel).encode(&mut buf).unwrap();
        assert_eq!(buf[0], 0x62);
        // And the abbreviated frame decodes back to Success.
        let (decoded, _) = Packet::decode(&buf[..n]).unwrap();
        match decoded {
            Packet::PublishAck(ack) => {
                assert_eq!(ack.kind, AckKind::PubRel);
                assert_eq!(ack.reason, ReasonCode::Success);
                assert!(ack.properties.is_empty());
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn puback_with_reason_and_properties() {
        let mut props = PropertyList::new();
        props.push(Property::ReasonString("quota")).unwrap();
        let ack = PublishAck {
            kind: AckKind::PubRec,
            packet_id: 3,
            reason: ReasonCode::QuotaExceeded,
            properties: props.into(),
        };
        let mut buf = [0u8; 32];
        round_trip(Packet::PublishAck(ack), &mut buf);
    }

    #[test]
    fn subscribe_round_trip() {
        let mut sub = Subscribe::new(
            5,
            "sensors/#",
            SubscriptionOptions::qos(QoS::AtLeastOnce),
        );
        sub.entries
            .push(SubscriptionEntry {
                filter: "alerts/+/high",
                options: SubscriptionOptions {
                    qos: QoS::ExactlyOnce,
                    no_local: true,
                    retain_as_published: true,
                    retain_handling: RetainHandling::DontSend,
                },
            })
            .unwrap();
        let mut buf = [0u8; 64];
        round_trip(Packet::Subscribe(sub), &mut buf);
    }

    #[test]
    fn subscription_options_reserved_bits_rejected() {
        assert!(SubscriptionOptions::from_byte(0x40).is_err());
        assert!(SubscriptionOptions::from_byte(0x30).is_err());
        assert!(SubscriptionOptions::from_byte(0x03).is_err());
        let opts = SubscriptionOptions::from_byte(0x2D).unwrap();
        assert_eq!(opts.qos, QoS::AtLeastOnce);
        assert!(opts.no_local);
        assert!(opts.retain_as_published);
        assert_eq!(opts.retain_handling, RetainHandling::DontSend);
    }

    #[test]
    fn suback_and_unsuback_round_trip() {
        let suback = SubAck {
            packet_id: 5,
            properties: Properties::default(),
            codes: &[0x01, 0x80],
        };
        let mut buf = [0u8; 32];
        round_trip(Packet::SubAck(suback.clone()), &mut buf);
        round_trip(Packet::UnsubAck(suback), &mut buf);
    }

    #[test]
    fn unsubscribe_round_trip() {
        let mut unsub = Unsubscribe::new(8, "sensors/#");
        unsub.filters.push("alerts/+/high").unwrap();
        let mut buf = [0u8; 64];
        round_trip(Packet::Unsubscribe(unsub), &mut buf);
    }

    #[test]
    fn ping_packets_are_two_bytes() {
        let mut buf = [0u8; 8];
        let n = Packet::PingReq.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0xC0, 0x00]);
        let n = Packet::PingResp.encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0xD0, 0x00]);
        assert_eq!(Packet::decode(&[0xD0, 0x00]).unwrap().0, Packet::PingResp);
        // A PINGRESP with a body is malformed.
        assert_eq!(Packet::decode(&[0xD0, 0x01, 0x00]), Err(DecodeError::BadData));
    }

    #[test]
    fn disconnect_empty_body_shortcut() {
        let mut buf = [0u8; 8];
        let n = Packet::Disconnect(ReasonPacket::default()).encode(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0xE0, 0x00]);
        let (decoded, _) = Packet::decode(&[0xE0, 0x00]).unwrap();
        match decoded {
            Packet::Disconnect(d) => {
                assert_eq!(d.reason, ReasonCode::Success);
                assert!(d.properties.is_empty());
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn disconnect_with_reason_round_trip() {
        let disconnect = ReasonPacket::with_reason(ReasonCode::DisconnectWithWillMessage);
        let mut buf = [0u8; 16];
        let n = round_trip(Packet::Disconnect(disconnect), &mut buf);
        assert_eq!(&buf[..n], &[0xE0, 0x01, 0x04]);
    }

    #[test]
    fn auth_round_trip() {
        let mut props = PropertyList::new();
        props.push(Property::AuthenticationMethod("SCRAM-SHA-1")).unwrap();
        props.push(Property::AuthenticationData(b"nonce")).unwrap();
        let auth = ReasonPacket {
            reason: ReasonCode::ContinueAuthentication,
            properties: props.into(),
        };
        let mut buf = [0u8; 64];
        round_trip(Packet::Auth(auth), &mut buf);
    }

    #[test]
    fn truncated_body_is_not_enough_data() {
        let publish = Publish::new("topic/x", b"0123456789", QoS::AtMostOnce);
        let mut buf = [0u8; 64];
        let n = Packet::Publish(publish).encode(&mut buf).unwrap();
        for cut in 1..n {
            assert_eq!(
                Packet::decode(&buf[..cut]),
                Err(DecodeError::NotEnoughData),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn trailing_garbage_in_frame_rejected() {
        // CONNACK claiming one byte more than its fields occupy.
        let raw = [0x20, 0x04, 0x00, 0x00, 0x00, 0xAA];
        assert_eq!(Packet::decode(&raw), Err(DecodeError::BadData));
    }
}
