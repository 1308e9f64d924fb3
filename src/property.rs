//! # MQTT v5 Property System
//!
//! Properties are optional typed metadata items attached to control packets
//! (section 2.2.2). Each property is a one-byte code followed by a value
//! whose shape is fixed by the code. The byte stream is not self-describing,
//! so decoding goes through the registry in this module.
//!
//! Two representations exist, mirroring the two directions of traffic:
//! [`PropertyList`] is an ordered, bounded list used when building outgoing
//! packets, and [`PropertiesView`] is a zero-copy cursor over the property
//! bytes of a parsed packet, decoding one property per iterator step. Both
//! are carried inside packets through the [`Properties`] wrapper.

use crate::error::{DecodeError, EncodeError};
use crate::packet::ControlPacketType;
use crate::varint;
use crate::wire;
use heapless::Vec;

/// Maximum number of entries an outgoing property list can hold.
pub const MAX_PROPERTIES: usize = 8;

/// The value shape of a property, per the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ValueKind {
    Byte,
    TwoByteInt,
    FourByteInt,
    VarInt,
    Utf8String,
    BinaryData,
    Utf8StringPair,
}

/// The 27 standardized property codes (section 2.2.2.2).
///
/// Codes are sparse in 0x01..=0x2A; the gaps are reserved and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PropertyId {
    PayloadFormat = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionId = 0x0B,
    SessionExpiryInterval = 0x11,
    AssignedClientId = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInfo = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInfo = 0x19,
    ResponseInfo = 0x1A,
    ServerReference = 0x1C,
    ReasonString = 0x1F,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubAvailable = 0x28,
    SubscriptionIdAvailable = 0x29,
    SharedSubAvailable = 0x2A,
}

impl PropertyId {
    /// Looks up a wire code, returning `None` for reserved values.
    pub fn from_u8(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => Self::PayloadFormat,
            0x02 => Self::MessageExpiryInterval,
            0x03 => Self::ContentType,
            0x08 => Self::ResponseTopic,
            0x09 => Self::CorrelationData,
            0x0B => Self::SubscriptionId,
            0x11 => Self::SessionExpiryInterval,
            0x12 => Self::AssignedClientId,
            0x13 => Self::ServerKeepAlive,
            0x15 => Self::AuthenticationMethod,
            0x16 => Self::AuthenticationData,
            0x17 => Self::RequestProblemInfo,
            0x18 => Self::WillDelayInterval,
            0x19 => Self::RequestResponseInfo,
            0x1A => Self::ResponseInfo,
            0x1C => Self::ServerReference,
            0x1F => Self::ReasonString,
            0x21 => Self::ReceiveMaximum,
            0x22 => Self::TopicAliasMaximum,
            0x23 => Self::TopicAlias,
            0x24 => Self::MaximumQoS,
            0x25 => Self::RetainAvailable,
            0x26 => Self::UserProperty,
            0x27 => Self::MaximumPacketSize,
            0x28 => Self::WildcardSubAvailable,
            0x29 => Self::SubscriptionIdAvailable,
            0x2A => Self::SharedSubAvailable,
            _ => return None,
        })
    }

    /// The value shape this code carries on the wire.
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::PayloadFormat
            | Self::RequestProblemInfo
            | Self::RequestResponseInfo
            | Self::MaximumQoS
            | Self::RetainAvailable
            | Self::WildcardSubAvailable
            | Self::SubscriptionIdAvailable
            | Self::SharedSubAvailable => ValueKind::Byte,
            Self::ServerKeepAlive
            | Self::ReceiveMaximum
            | Self::TopicAliasMaximum
            | Self::TopicAlias => ValueKind::TwoByteInt,
            Self::MessageExpiryInterval
            | Self::SessionExpiryInterval
            | Self::WillDelayInterval
            | Self::MaximumPacketSize => ValueKind::FourByteInt,
            Self::SubscriptionId => ValueKind::VarInt,
            Self::ContentType
            | Self::ResponseTopic
            | Self::AssignedClientId
            | Self::AuthenticationMethod
            | Self::ResponseInfo
            | Self::ServerReference
            | Self::ReasonString => ValueKind::Utf8String,
            Self::CorrelationData | Self::AuthenticationData => ValueKind::BinaryData,
            Self::UserProperty => ValueKind::Utf8StringPair,
        }
    }

    /// Bitmask of the packet types this property may appear in, one bit per
    /// control packet type value. Bit 0 (the reserved type) marks properties
    /// valid inside a CONNECT will-properties block.
    fn allowed_mask(self) -> u16 {
        const PUBLISH: u16 = 1 << 3;
        const WILL: u16 = 1;
        match self {
            Self::PayloadFormat
            | Self::MessageExpiryInterval
            | Self::ContentType
            | Self::ResponseTopic
            | Self::CorrelationData => PUBLISH | WILL,
            Self::TopicAlias => PUBLISH,
            Self::WillDelayInterval => WILL,
            Self::SubscriptionId => PUBLISH | (1 << 8),
            Self::SessionExpiryInterval => (1 << 1) | (1 << 2) | (1 << 14),
            Self::AuthenticationMethod | Self::AuthenticationData => (1 << 1) | (1 << 2) | (1 << 15),
            Self::ReceiveMaximum | Self::TopicAliasMaximum | Self::MaximumPacketSize => {
                (1 << 1) | (1 << 2)
            }
            Self::RequestProblemInfo | Self::RequestResponseInfo => 1 << 1,
            Self::AssignedClientId
            | Self::ServerKeepAlive
            | Self::MaximumQoS
            | Self::RetainAvailable
            | Self::WildcardSubAvailable
            | Self::SubscriptionIdAvailable
            | Self::SharedSubAvailable
            | Self::ResponseInfo => 1 << 2,
            Self::ServerReference => (1 << 2) | (1 << 14),
            Self::ReasonString => {
                (1 << 2)
                    | (1 << 4)
                    | (1 << 5)
                    | (1 << 6)
                    | (1 << 7)
                    | (1 << 9)
                    | (1 << 11)
                    | (1 << 14)
                    | (1 << 15)
            }
            Self::UserProperty => 0xFFFF,
        }
    }
}

/// O(1) check that `id` may legally appear in a packet of type `packet`.
pub fn is_allowed(id: PropertyId, packet: ControlPacketType) -> bool {
    id.allowed_mask() & (1 << packet as u8) != 0
}

/// Check against the CONNECT will-properties block, which has its own column
/// in the standard's table.
pub fn is_allowed_in_will(id: PropertyId) -> bool {
    id.allowed_mask() & 1 != 0
}

/// A single decoded property. Values borrow the buffer they were parsed
/// from (or, when building, the caller's data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Property<'a> {
    PayloadFormat(u8),
    MessageExpiryInterval(u32),
    ContentType(&'a str),
    ResponseTopic(&'a str),
    CorrelationData(&'a [u8]),
    SubscriptionId(u32),
    SessionExpiryInterval(u32),
    AssignedClientId(&'a str),
    ServerKeepAlive(u16),
    AuthenticationMethod(&'a str),
    AuthenticationData(&'a [u8]),
    RequestProblemInfo(u8),
    WillDelayInterval(u32),
    RequestResponseInfo(u8),
    ResponseInfo(&'a str),
    ServerReference(&'a str),
    ReasonString(&'a str),
    ReceiveMaximum(u16),
    TopicAliasMaximum(u16),
    TopicAlias(u16),
    MaximumQoS(u8),
    RetainAvailable(u8),
    UserProperty(&'a str, &'a str),
    MaximumPacketSize(u32),
    WildcardSubAvailable(u8),
    SubscriptionIdAvailable(u8),
    SharedSubAvailable(u8),
}

impl<'a> Property<'a> {
    /// The property code of this value.
    pub fn id(&self) -> PropertyId {
        match self {
            Self::PayloadFormat(_) => PropertyId::PayloadFormat,
            Self::MessageExpiryInterval(_) => PropertyId::MessageExpiryInterval,
            Self::ContentType(_) => PropertyId::ContentType,
            Self::ResponseTopic(_) => PropertyId::ResponseTopic,
            Self::CorrelationData(_) => PropertyId::CorrelationData,
            Self::SubscriptionId(_) => PropertyId::SubscriptionId,
            Self::SessionExpiryInterval(_) => PropertyId::SessionExpiryInterval,
            Self::AssignedClientId(_) => PropertyId::AssignedClientId,
            Self::ServerKeepAlive(_) => PropertyId::ServerKeepAlive,
            Self::AuthenticationMethod(_) => PropertyId::AuthenticationMethod,
            Self::AuthenticationData(_) => PropertyId::AuthenticationData,
            Self::RequestProblemInfo(_) => PropertyId::RequestProblemInfo,
            Self::WillDelayInterval(_) => PropertyId::WillDelayInterval,
            Self::RequestResponseInfo(_) => PropertyId::RequestResponseInfo,
            Self::ResponseInfo(_) => PropertyId::ResponseInfo,
            Self::ServerReference(_) => PropertyId::ServerReference,
            Self::ReasonString(_) => PropertyId::ReasonString,
            Self::ReceiveMaximum(_) => PropertyId::ReceiveMaximum,
            Self::TopicAliasMaximum(_) => PropertyId::TopicAliasMaximum,
            Self::TopicAlias(_) => PropertyId::TopicAlias,
            Self::MaximumQoS(_) => PropertyId::MaximumQoS,
            Self::RetainAvailable(_) => PropertyId::RetainAvailable,
            Self::UserProperty(..) => PropertyId::UserProperty,
            Self::MaximumPacketSize(_) => PropertyId::MaximumPacketSize,
            Self::WildcardSubAvailable(_) => PropertyId::WildcardSubAvailable,
            Self::SubscriptionIdAvailable(_) => PropertyId::SubscriptionIdAvailable,
            Self::SharedSubAvailable(_) => PropertyId::SharedSubAvailable,
        }
    }

    /// Encoded size including the one-byte property code.
    pub fn encoded_size(&self) -> usize {
        1 + match *self {
            Self::PayloadFormat(_)
            | Self::RequestProblemInfo(_)
            | Self::RequestResponseInfo(_)
            | Self::MaximumQoS(_)
            | Self::RetainAvailable(_)
            | Self::WildcardSubAvailable(_)
            | Self::SubscriptionIdAvailable(_)
            | Self::SharedSubAvailable(_) => 1,
            Self::ServerKeepAlive(_)
            | Self::ReceiveMaximum(_)
            | Self::TopicAliasMaximum(_)
            | Self::TopicAlias(_) => 2,
            Self::MessageExpiryInterval(_)
            | Self::SessionExpiryInterval(_)
            | Self::WillDelayInterval(_)
            | Self::MaximumPacketSize(_) => 4,
            Self::SubscriptionId(v) => varint::encoded_size(v),
            Self::ContentType(s)
            | Self::ResponseTopic(s)
            | Self::AssignedClientId(s)
            | Self::AuthenticationMethod(s)
            | Self::ResponseInfo(s)
            | Self::ServerReference(s)
            | Self::ReasonString(s) => 2 + s.len(),
            Self::CorrelationData(d) | Self::AuthenticationData(d) => 2 + d.len(),
            Self::UserProperty(k, v) => 2 + k.len() + 2 + v.len(),
        }
    }

    /// Writes code byte + value, returning the bytes written.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut n = wire::write_u8(buf, self.id() as u8)?;
        n += match *self {
            Self::PayloadFormat(v)
            | Self::RequestProblemInfo(v)
            | Self::RequestResponseInfo(v)
            | Self::MaximumQoS(v)
            | Self::RetainAvailable(v)
            | Self::WildcardSubAvailable(v)
            | Self::SubscriptionIdAvailable(v)
            | Self::SharedSubAvailable(v) => wire::write_u8(&mut buf[n..], v)?,
            Self::ServerKeepAlive(v)
            | Self::ReceiveMaximum(v)
            | Self::TopicAliasMaximum(v)
            | Self::TopicAlias(v) => wire::write_u16(&mut buf[n..], v)?,
            Self::MessageExpiryInterval(v)
            | Self::SessionExpiryInterval(v)
            | Self::WillDelayInterval(v)
            | Self::MaximumPacketSize(v) => wire::write_u32(&mut buf[n..], v)?,
            Self::SubscriptionId(v) => varint::encode(v, &mut buf[n..])?,
            Self::ContentType(s)
            | Self::ResponseTopic(s)
            | Self::AssignedClientId(s)
            | Self::AuthenticationMethod(s)
            | Self::ResponseInfo(s)
            | Self::ServerReference(s)
            | Self::ReasonString(s) => wire::write_utf8_string(&mut buf[n..], s)?,
            Self::CorrelationData(d) | Self::AuthenticationData(d) => {
                wire::write_binary_data(&mut buf[n..], d)?
            }
            Self::UserProperty(k, v) => wire::write_string_pair(&mut buf[n..], k, v)?,
        };
        Ok(n)
    }

    /// Decodes one property at the cursor. The value shape is selected by
    /// the registry; reserved codes are `BadData`.
    pub fn decode(cursor: &mut usize, buf: &'a [u8]) -> Result<Self, DecodeError> {
        let code = wire::read_u8(cursor, buf)?;
        let id = PropertyId::from_u8(code).ok_or(DecodeError::BadData)?;
        Ok(match id.value_kind() {
            ValueKind::Byte => {
                let v = wire::read_u8(cursor, buf)?;
                match id {
                    PropertyId::PayloadFormat => Self::PayloadFormat(v),
                    PropertyId::RequestProblemInfo => Self::RequestProblemInfo(v),
                    PropertyId::RequestResponseInfo => Self::RequestResponseInfo(v),
                    PropertyId::MaximumQoS => Self::MaximumQoS(v),
                    PropertyId::RetainAvailable => Self::RetainAvailable(v),
                    PropertyId::WildcardSubAvailable => Self::WildcardSubAvailable(v),
                    PropertyId::SubscriptionIdAvailable => Self::SubscriptionIdAvailable(v),
                    PropertyId::SharedSubAvailable => Self::SharedSubAvailable(v),
                    _ => unreachable!(),
                }
            }
            ValueKind::TwoByteInt => {
                let v = wire::read_u16(cursor, buf)?;
                match id {
                    PropertyId::ServerKeepAlive => Self::ServerKeepAlive(v),
                    PropertyId::ReceiveMaximum => Self::ReceiveMaximum(v),
                    PropertyId::TopicAliasMaximum => Self::TopicAliasMaximum(v),
                    PropertyId::TopicAlias => Self::TopicAlias(v),
                    _ => unreachable!(),
                }
            }
            ValueKind::FourByteInt => {
                let v = wire::read_u32(cursor, buf)?;
                match id {
                    PropertyId::MessageExpiryInterval => Self::MessageExpiryInterval(v),
                    PropertyId::SessionExpiryInterval => Self::SessionExpiryInterval(v),
                    PropertyId::WillDelayInterval => Self::WillDelayInterval(v),
                    PropertyId::MaximumPacketSize => Self::MaximumPacketSize(v),
                    _ => unreachable!(),
                }
            }
            ValueKind::VarInt => {
                let (v, n) = varint::decode(&buf[*cursor..])?;
                *cursor += n;
                Self::SubscriptionId(v)
            }
            ValueKind::Utf8String => {
                let s = wire::read_utf8_string(cursor, buf)?;
                match id {
                    PropertyId::ContentType => Self::ContentType(s),
                    PropertyId::ResponseTopic => Self::ResponseTopic(s),
                    PropertyId::AssignedClientId => Self::AssignedClientId(s),
                    PropertyId::AuthenticationMethod => Self::AuthenticationMethod(s),
                    PropertyId::ResponseInfo => Self::ResponseInfo(s),
                    PropertyId::ServerReference => Self::ServerReference(s),
                    PropertyId::ReasonString => Self::ReasonString(s),
                    _ => unreachable!(),
                }
            }
            ValueKind::BinaryData => {
                let d = wire::read_binary_data(cursor, buf)?;
                match id {
                    PropertyId::CorrelationData => Self::CorrelationData(d),
                    PropertyId::AuthenticationData => Self::AuthenticationData(d),
                    _ => unreachable!(),
                }
            }
            ValueKind::Utf8StringPair => {
                let (k, v) = wire::read_string_pair(cursor, buf)?;
                Self::UserProperty(k, v)
            }
        })
    }
}

/// Ordered property list used when building outgoing packets.
///
/// Duplicates are allowed (User Property in particular); every append
/// re-validates that the total encoded length still fits a VarInt prefix.
#[derive(Debug, Default, Clone)]
pub struct PropertyList<'a> {
    entries: Vec<Property<'a>, MAX_PROPERTIES>,
}

impl<'a> PropertyList<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a property, failing when the list is full or the encoded
    /// length would leave VarInt range.
    pub fn push(&mut self, property: Property<'a>) -> Result<(), EncodeError> {
        if self.payload_size() + property.encoded_size() > varint::MAX_VARINT as usize {
            return Err(EncodeError::TooLarge);
        }
        self.entries.push(property).map_err(|_| EncodeError::TooLarge)
    }

    /// Total size of the entries, excluding the VarInt length prefix.
    pub fn payload_size(&self) -> usize {
        self.entries.iter().map(Property::encoded_size).sum()
    }

    /// Total encoded size including the VarInt length prefix.
    pub fn encoded_size(&self) -> usize {
        let payload = self.payload_size();
        varint::encoded_size(payload as u32) + payload
    }

    /// Writes length prefix + entries, returning the bytes written.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let mut n = varint::encode(self.payload_size() as u32, buf)?;
        for p in &self.entries {
            n += p.encode_into(&mut buf[n..])?;
        }
        Ok(n)
    }

    /// True when every entry is legal for a packet of type `packet`.
    pub fn check_for(&self, packet: ControlPacketType) -> bool {
        self.entries.iter().all(|p| is_allowed(p.id(), packet))
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Property<'a>> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Zero-copy view over the property bytes of a parsed packet.
///
/// Holds the raw bytes after the VarInt length prefix; [`Self::iter`] decodes
/// lazily, one property per step. The view stays valid only while the source
/// buffer does, which the lifetime enforces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PropertiesView<'a> {
    raw: &'a [u8],
}

impl<'a> PropertiesView<'a> {
    /// Reads the VarInt length prefix at the cursor and captures the
    /// following property bytes without copying.
    pub fn decode(cursor: &mut usize, buf: &'a [u8]) -> Result<Self, DecodeError> {
        let (len, n) = varint::decode(&buf[*cursor..])?;
        *cursor += n;
        let raw = buf
            .get(*cursor..*cursor + len as usize)
            .ok_or(DecodeError::NotEnoughData)?;
        *cursor += len as usize;
        Ok(Self { raw })
    }

    /// The raw property bytes (after the length prefix).
    pub fn as_bytes(&self) -> &'a [u8] {
        self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Total encoded size including the VarInt length prefix.
    pub fn encoded_size(&self) -> usize {
        varint::encoded_size(self.raw.len() as u32) + self.raw.len()
    }

    /// Re-emits the view bit-exactly: length prefix + raw bytes.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let n = varint::encode(self.raw.len() as u32, buf)?;
        let total = n + self.raw.len();
        buf.get_mut(n..total)
            .ok_or(EncodeError::BufferTooSmall)?
            .copy_from_slice(self.raw);
        Ok(total)
    }

    /// A fresh decoding cursor over the view. Restarting iteration is just
    /// calling this again.
    pub fn iter(&self) -> PropertyIter<'a> {
        PropertyIter { raw: self.raw, pos: 0 }
    }

    /// Walks the view once, rejecting undecodable entries and properties not
    /// legal for a packet of type `packet`.
    pub fn check_for(&self, packet: ControlPacketType) -> bool {
        self.iter().all(|p| match p {
            Ok(p) => is_allowed(p.id(), packet),
            Err(_) => false,
        })
    }

    /// True when every entry decodes.
    pub fn validate(&self) -> bool {
        self.iter().all(|p| p.is_ok())
    }
}

/// Pull-style cursor over a [`PropertiesView`].
#[derive(Debug, Clone)]
pub struct PropertyIter<'a> {
    raw: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for PropertyIter<'a> {
    type Item = Result<Property<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.raw.len() {
            return None;
        }
        match Property::decode(&mut self.pos, self.raw) {
            Ok(p) => Some(Ok(p)),
            Err(_) => {
                // A short read inside a complete frame means the declared
                // property length lied; either way the view is malformed.
                self.pos = self.raw.len();
                Some(Err(DecodeError::BadData))
            }
        }
    }
}

/// The property carrier inside packet structs: an owning list when building,
/// a borrowed view when parsed. Encoding either form produces identical
/// bytes; equality compares the decoded sequences.
#[derive(Debug, Clone)]
pub enum Properties<'a> {
    List(PropertyList<'a>),
    View(PropertiesView<'a>),
}

impl<'a> Default for Properties<'a> {
    fn default() -> Self {
        Self::List(PropertyList::new())
    }
}

impl<'a> From<PropertyList<'a>> for Properties<'a> {
    fn from(list: PropertyList<'a>) -> Self {
        Self::List(list)
    }
}

impl<'a> From<PropertiesView<'a>> for Properties<'a> {
    fn from(view: PropertiesView<'a>) -> Self {
        Self::View(view)
    }
}

impl<'a> Properties<'a> {
    pub fn encoded_size(&self) -> usize {
        match self {
            Self::List(l) => l.encoded_size(),
            Self::View(v) => v.encoded_size(),
        }
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        match self {
            Self::List(l) => l.encode_into(buf),
            Self::View(v) => v.encode_into(buf),
        }
    }

    pub fn check_for(&self, packet: ControlPacketType) -> bool {
        match self {
            Self::List(l) => l.check_for(packet),
            Self::View(v) => v.check_for(packet),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::List(l) => l.is_empty(),
            Self::View(v) => v.is_empty(),
        }
    }

    /// Iterates decoded properties regardless of representation.
    pub fn iter(&self) -> PropertiesIter<'_, 'a> {
        match self {
            Self::List(l) => PropertiesIter::List(l.iter()),
            Self::View(v) => PropertiesIter::View(v.iter()),
        }
    }

    /// Mutable access to the list form for building; `None` on a parsed view.
    pub fn as_list_mut(&mut self) -> Option<&mut PropertyList<'a>> {
        match self {
            Self::List(l) => Some(l),
            Self::View(_) => None,
        }
    }
}

/// Iterator over [`Properties`] in either representation.
pub enum PropertiesIter<'l, 'a> {
    List(core::slice::Iter<'l, Property<'a>>),
    View(PropertyIter<'a>),
}

impl<'l, 'a> Iterator for PropertiesIter<'l, 'a> {
    type Item = Result<Property<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::List(it) => it.next().map(|p| Ok(*p)),
            Self::View(it) => it.next(),
        }
    }
}

impl<'a, 'b> PartialEq<Properties<'b>> for Properties<'a> {
    fn eq(&self, other: &Properties<'b>) -> bool {
        let mut a = self.iter();
        let mut b = other.iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some(Ok(x)), Some(Ok(y))) if x == y => continue,
                _ => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ControlPacketType::*;

    #[test]
    fn user_property_allowed_everywhere() {
        for t in [
            Connect, ConnAck, Publish, PubAck, PubRec, PubRel, PubComp, Subscribe, SubAck,
            Unsubscribe, UnsubAck, PingReq, PingResp, Disconnect, Auth,
        ] {
            assert!(is_allowed(PropertyId::UserProperty, t));
        }
    }

    #[test]
    fn assigned_client_id_is_connack_only() {
        assert!(is_allowed(PropertyId::AssignedClientId, ConnAck));
        assert!(!is_allowed(PropertyId::AssignedClientId, Connect));
        assert!(!is_allowed(PropertyId::AssignedClientId, Publish));
    }

    #[test]
    fn will_block_allowances() {
        assert!(is_allowed_in_will(PropertyId::WillDelayInterval));
        assert!(is_allowed_in_will(PropertyId::ContentType));
        assert!(!is_allowed_in_will(PropertyId::TopicAlias));
    }

    #[test]
    fn list_encodes_and_view_decodes_back() {
        let mut list = PropertyList::new();
        list.push(Property::SessionExpiryInterval(120)).unwrap();
        list.push(Property::ReceiveMaximum(20)).unwrap();
        list.push(Property::UserProperty("k", "v")).unwrap();
        list.push(Property::CorrelationData(b"\x01\x02")).unwrap();

        let mut buf = [0u8; 64];
        let n = list.encode_into(&mut buf).unwrap();
        assert_eq!(n, list.encoded_size());

        let mut cursor = 0;
        let view = PropertiesView::decode(&mut cursor, &buf[..n]).unwrap();
        assert_eq!(cursor, n);
        let decoded: std::vec::Vec<_> = view.iter().map(|p| p.unwrap()).collect();
        assert_eq!(
            decoded,
            [
                Property::SessionExpiryInterval(120),
                Property::ReceiveMaximum(20),
                Property::UserProperty("k", "v"),
                Property::CorrelationData(b"\x01\x02"),
            ]
        );

        // Either-form equality.
        assert_eq!(Properties::from(list), Properties::from(view));
    }

    #[test]
    fn reserved_code_fails_check() {
        // Code 0x04 is a gap in the registry: one byte of pretend payload.
        let raw = [0x02, 0x04, 0x00];
        let mut cursor = 0;
        let view = PropertiesView::decode(&mut cursor, &raw).unwrap();
        assert!(!view.check_for(Publish));
        assert!(!view.validate());
    }

    #[test]
    fn misplaced_property_fails_check() {
        let mut list = PropertyList::new();
        list.push(Property::AssignedClientId("srv")).unwrap();
        assert!(list.check_for(ConnAck));
        assert!(!list.check_for(Publish));
    }

    #[test]
    fn subscription_id_varint_shape() {
        let p = Property::SubscriptionId(268_435_455);
        assert_eq!(p.encoded_size(), 1 + 4);
        let mut buf = [0u8; 8];
        let n = p.encode_into(&mut buf).unwrap();
        assert_eq!(n, 5);
        let mut cursor = 0;
        assert_eq!(Property::decode(&mut cursor, &buf[..n]).unwrap(), p);
    }

    #[test]
    fn truncated_view_is_not_enough_data() {
        // Declared length 4, only 2 property bytes present.
        let raw = [0x04, 0x13, 0x00];
        let mut cursor = 0;
        assert_eq!(
            PropertiesView::decode(&mut cursor, &raw),
            Err(DecodeError::NotEnoughData)
        );
    }
}
