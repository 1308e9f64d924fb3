//! # Async MQTT v5 Client for Embedded Systems
//!
//! A `no_std`, allocation-free MQTT v5.0 packet codec and client session
//! engine, built on the [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Runs on bare-metal microcontrollers; all
//!   buffers are fixed arrays or `heapless` containers sized by const
//!   generics.
//! - **Zero-copy decoding:** Parsed packets borrow the receive buffer.
//!   Topics, payloads and property views are handed to the application
//!   without copying; data that must outlive the frame is copied into
//!   bounded storage at exactly that point.
//! - **Full v5 codec:** All fifteen control packet types, the complete
//!   property registry with per-packet legality checks, and the abbreviated
//!   acknowledgment encodings.
//! - **Stateful sessions:** QoS 0/1/2 delivery tracking, packet identifier
//!   allocation, keep-alive scheduling, and retransmission with the dup flag
//!   after reconnecting into an existing session.
//! - **Transport agnostic:** The `MqttTransport` trait runs the client over
//!   any reliable ordered byte stream; a TCP implementation over
//!   `embassy-net` is included.
//! - **Rust 2024 Edition:** Native `async fn` in traits, no `async-trait`.
//!
//! ## Architecture
//!
//! ### 1. Direct client usage
//!
//! Drive [`MqttClient`] yourself for simple applications:
//!
//! ```ignore
//! let mut client = MqttClient::<_, 4, 1024>::new(transport, MqttOptions::new("dev1"));
//! client.connect("broker.local", 1883, false).await?;
//! client.subscribe("sensors/#", SubscriptionOptions::qos(QoS::AtLeastOnce)).await?;
//! loop {
//!     if let MqttEvent::Message(msg) = client.poll().await? {
//!         handle(msg.topic, msg.payload);
//!     }
//! }
//! ```
//!
//! ### 2. Runtime with modules
//!
//! Use [`runtime::MqttRuntime`] with the [`runtime::MqttModule`] trait for
//! applications composed of several concerns (telemetry, command handling,
//! discovery). The runtime owns the client, reconnects with backoff, and
//! other tasks publish through a channel-backed
//! [`runtime::PublisherHandle`], so session state never crosses execution
//! contexts.
//!
//! ## Codec layering
//!
//! The wire layer is usable on its own: [`packet::check_header`] sizes a
//! frame from its first bytes, [`packet::Packet::decode`] parses exactly one
//! frame, and [`packet::Packet::encode`] serializes one. Incomplete input is
//! reported as [`error::DecodeError::NotEnoughData`] and is retryable;
//! malformed input is [`error::DecodeError::BadData`] and is fatal for the
//! connection.

#![cfg_attr(not(test), no_std)]

// Must come first so the log shims are visible crate-wide.
#[macro_use]
mod fmt;

pub mod client;
pub mod error;
pub mod packet;
pub mod property;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod varint;
pub mod wire;

#[cfg(test)]
mod test_transport;

// Re-export key types for easier access at the crate root.
pub use client::{MqttClient, MqttEvent, MqttOptions};
pub use error::{DecodeError, EncodeError, MqttError, ReasonCode};
pub use packet::{Packet, Publish, QoS, SubscriptionOptions};
pub use property::{Properties, Property};
pub use transport::{MqttTransport, TcpTransport};
