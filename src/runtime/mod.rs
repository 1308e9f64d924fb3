//! Modular application runtime over the MQTT client.
//!
//! The runtime lets an application be assembled from reusable
//! [`MqttModule`]s that register subscriptions, react to messages, and
//! publish on a schedule, while one event loop owns the client and the
//! session state.
//!
//! # Object-safe design
//!
//! `MqttModule` is dyn-compatible so modules can live in `StaticCell` and be
//! passed to Embassy tasks as `&mut dyn MqttModule`, keeping task functions
//! free of generic parameters.
//!
//! # Publishing pattern
//!
//! Modules never perform async I/O. Callbacks queue publishes on a
//! [`PublishOutbox`]; other tasks send [`PublishRequest`]s through a
//! channel via [`PublisherHandle`]. The runtime drains both on its own task,
//! so the client is only ever driven from one execution context.

pub(crate) mod event_loop;
pub(crate) mod publisher;
pub(crate) mod registry;
pub(crate) mod traits;

pub use event_loop::MqttRuntime;
pub use publisher::{
    BufferedOutbox, OwnedPublishRequest, PublishRequest, PublishRequestChannel,
    PublishRequestReceiver, PublishRequestSender, PublisherHandle,
};
pub use registry::{TopicRegistry, MAX_TOPIC_LEN};
pub use traits::{ModulePair, MqttModule, NoopModule, PublishOutbox, TopicCollector};

// Re-export Publish for convenient use in modules.
pub use crate::packet::Publish;
