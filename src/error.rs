//! # Error Types
//!
//! Error types for the codec and the client engine. The codec layer has its
//! own small taxonomy (`DecodeError`/`EncodeError`) so parsing can tell a
//! recoverable short read apart from malformed input; the client wraps those
//! together with transport failures into `MqttError<T>`, generic over the
//! transport error type `T`.

use crate::transport;

/// Errors raised while parsing wire bytes.
///
/// `NotEnoughData` is recoverable: the frame is simply incomplete and the
/// caller should retry once more transport bytes arrive. `BadData` means the
/// encoding itself is malformed; the packet is unusable and the connection
/// must be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// The buffer ends before the field or packet does.
    NotEnoughData,
    /// The bytes violate the MQTT v5 encoding rules.
    BadData,
}

/// Errors raised while serializing packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// The output buffer cannot hold the encoded form.
    BufferTooSmall,
    /// A field exceeds its encodable range (e.g. a string over 65535 bytes
    /// or a remaining length over the VarInt maximum).
    TooLarge,
    /// A QoS 1/2 PUBLISH has no packet identifier; the frame would carry the
    /// forbidden identifier zero.
    MissingPacketId,
}

/// Protocol violations detected above the byte level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// A reserved or unknown control packet type was received.
    InvalidPacketType(u8),
    /// The fixed-header flag bits do not match the packet type's fixed mask.
    InvalidFlags(u8),
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// A property appeared in a packet type that may not carry it.
    PropertyNotAllowed,
    /// The server stopped answering PINGREQ within the keep-alive window.
    KeepAliveTimeout,
    /// The broker closed the connection.
    ConnectionClosed,
    /// A packet arrived that is not valid in the current session phase.
    UnexpectedPacket,
}

/// The primary error enum for the MQTT client.
///
/// It is generic over the transport error type `T`, allowing it to wrap
/// specific errors from the underlying network transport (e.g. TCP, UART).
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// A protocol-level violation of the MQTT specification.
    Protocol(ProtocolError),
    /// Inbound bytes could not be decoded.
    Decode(DecodeError),
    /// An outgoing packet could not be serialized.
    Encode(EncodeError),
    /// The broker refused the connection with the enclosed reason code.
    ConnectionRefused(ReasonCode),
    /// The client is not currently connected to the broker.
    NotConnected,
    /// The in-flight table (or the server's receive maximum) is exhausted;
    /// the QoS publish must wait for outstanding acknowledgments.
    InflightFull,
    /// The packet exceeds the maximum size granted by the server.
    PacketTooLarge,
    /// An operation timed out.
    Timeout,
}

/// Allows automatic conversion of any transport error into an `MqttError`,
/// so the `?` operator works seamlessly on transport results.
impl<T: transport::TransportError> From<T> for MqttError<T> {
    fn from(err: T) -> Self {
        MqttError::Transport(err)
    }
}

impl<T> From<DecodeError> for MqttError<T> {
    fn from(err: DecodeError) -> Self {
        MqttError::Decode(err)
    }
}

impl<T> From<EncodeError> for MqttError<T> {
    fn from(err: EncodeError) -> Self {
        MqttError::Encode(err)
    }
}

impl<T> From<ProtocolError> for MqttError<T> {
    fn from(err: ProtocolError) -> Self {
        MqttError::Protocol(err)
    }
}

/// MQTT v5 reason codes (section 2.4).
///
/// A single shared enum rather than one per acknowledgment packet: the client
/// mostly forwards these to the application, and the numeric space is common.
/// `0x00` is `Success`, which also stands for "normal disconnection" and
/// "granted QoS 0" in the packets that use those meanings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReasonCode {
    Success,
    GrantedQoS1,
    GrantedQoS2,
    DisconnectWithWillMessage,
    NoMatchingSubscribers,
    NoSubscriptionExisted,
    ContinueAuthentication,
    ReAuthenticate,
    UnspecifiedError,
    MalformedPacket,
    ProtocolError,
    ImplementationSpecificError,
    UnsupportedProtocolVersion,
    ClientIdentifierNotValid,
    BadUserNameOrPassword,
    NotAuthorized,
    ServerUnavailable,
    ServerBusy,
    Banned,
    ServerShuttingDown,
    BadAuthenticationMethod,
    KeepAliveTimeout,
    SessionTakenOver,
    TopicFilterInvalid,
    TopicNameInvalid,
    PacketIdentifierInUse,
    PacketIdentifierNotFound,
    ReceiveMaximumExceeded,
    TopicAliasInvalid,
    PacketTooLarge,
    MessageRateTooHigh,
    QuotaExceeded,
    AdministrativeAction,
    PayloadFormatInvalid,
    RetainNotSupported,
    QoSNotSupported,
    UseAnotherServer,
    ServerMoved,
    SharedSubscriptionsNotSupported,
    ConnectionRateExceeded,
    MaximumConnectTime,
    SubscriptionIdentifiersNotSupported,
    WildcardSubscriptionsNotSupported,
    /// A code outside the standardized table, carried verbatim.
    Other(u8),
}

impl Default for ReasonCode {
    fn default() -> Self {
        Self::Success
    }
}

impl ReasonCode {
    /// The wire value of this reason code.
    pub fn value(self) -> u8 {
        match self {
            Self::Success => 0x00,
            Self::GrantedQoS1 => 0x01,
            Self::GrantedQoS2 => 0x02,
            Self::DisconnectWithWillMessage => 0x04,
            Self::NoMatchingSubscribers => 0x10,
            Self::NoSubscriptionExisted => 0x11,
            Self::ContinueAuthentication => 0x18,
            Self::ReAuthenticate => 0x19,
            Self::UnspecifiedError => 0x80,
            Self::MalformedPacket => 0x81,
            Self::ProtocolError => 0x82,
            Self::ImplementationSpecificError => 0x83,
            Self::UnsupportedProtocolVersion => 0x84,
            Self::ClientIdentifierNotValid => 0x85,
            Self::BadUserNameOrPassword => 0x86,
            Self::NotAuthorized => 0x87,
            Self::ServerUnavailable => 0x88,
            Self::ServerBusy => 0x89,
            Self::Banned => 0x8A,
            Self::ServerShuttingDown => 0x8B,
            Self::BadAuthenticationMethod => 0x8C,
            Self::KeepAliveTimeout => 0x8D,
            Self::SessionTakenOver => 0x8E,
            Self::TopicFilterInvalid => 0x8F,
            Self::TopicNameInvalid => 0x90,
            Self::PacketIdentifierInUse => 0x91,
            Self::PacketIdentifierNotFound => 0x92,
            Self::ReceiveMaximumExceeded => 0x93,
            Self::TopicAliasInvalid => 0x94,
            Self::PacketTooLarge => 0x95,
            Self::MessageRateTooHigh => 0x96,
            Self::QuotaExceeded => 0x97,
            Self::AdministrativeAction => 0x98,
            Self::PayloadFormatInvalid => 0x99,
            Self::RetainNotSupported => 0x9A,
            Self::QoSNotSupported => 0x9B,
            Self::UseAnotherServer => 0x9C,
            Self::ServerMoved => 0x9D,
            Self::SharedSubscriptionsNotSupported => 0x9E,
            Self::ConnectionRateExceeded => 0x9F,
            Self::MaximumConnectTime => 0xA0,
            Self::SubscriptionIdentifiersNotSupported => 0xA1,
            Self::WildcardSubscriptionsNotSupported => 0xA2,
            Self::Other(v) => v,
        }
    }

    /// Reason codes below 0x80 indicate success.
    pub fn is_success(self) -> bool {
        self.value() < 0x80
    }
}

impl From<u8> for ReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0x00 => Self::Success,
            0x01 => Self::GrantedQoS1,
            0x02 => Self::GrantedQoS2,
            0x04 => Self::DisconnectWithWillMessage,
            0x10 => Self::NoMatchingSubscribers,
            0x11 => Self::NoSubscriptionExisted,
            0x18 => Self::ContinueAuthentication,
            0x19 => Self::ReAuthenticate,
            0x80 => Self::UnspecifiedError,
            0x81 => Self::MalformedPacket,
            0x82 => Self::ProtocolError,
            0x83 => Self::ImplementationSpecificError,
            0x84 => Self::UnsupportedProtocolVersion,
            0x85 => Self::ClientIdentifierNotValid,
            0x86 => Self::BadUserNameOrPassword,
            0x87 => Self::NotAuthorized,
            0x88 => Self::ServerUnavailable,
            0x89 => Self::ServerBusy,
            0x8A => Self::Banned,
            0x8B => Self::ServerShuttingDown,
            0x8C => Self::BadAuthenticationMethod,
            0x8D => Self::KeepAliveTimeout,
            0x8E => Self::SessionTakenOver,
            0x8F => Self::TopicFilterInvalid,
            0x90 => Self::TopicNameInvalid,
            0x91 => Self::PacketIdentifierInUse,
            0x92 => Self::PacketIdentifierNotFound,
            0x93 => Self::ReceiveMaximumExceeded,
            0x94 => Self::TopicAliasInvalid,
            0x95 => Self::PacketTooLarge,
            0x96 => Self::MessageRateTooHigh,
            0x97 => Self::QuotaExceeded,
            0x98 => Self::AdministrativeAction,
            0x99 => Self::PayloadFormatInvalid,
            0x9A => Self::RetainNotSupported,
            0x9B => Self::QoSNotSupported,
            0x9C => Self::UseAnotherServer,
            0x9D => Self::ServerMoved,
            0x9E => Self::SharedSubscriptionsNotSupported,
            0x9F => Self::ConnectionRateExceeded,
            0xA0 => Self::MaximumConnectTime,
            0xA1 => Self::SubscriptionIdentifiersNotSupported,
            0xA2 => Self::WildcardSubscriptionsNotSupported,
            other => Self::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_code_wire_round_trip() {
        for v in 0..=0xFFu8 {
            assert_eq!(ReasonCode::from(v).value(), v);
        }
    }

    #[test]
    fn success_threshold() {
        assert!(ReasonCode::Success.is_success());
        assert!(ReasonCode::GrantedQoS2.is_success());
        assert!(!ReasonCode::UnspecifiedError.is_success());
        assert!(!ReasonCode::Other(0xFE).is_success());
    }
}
