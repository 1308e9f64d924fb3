//! The runtime event loop driving modules over an [`MqttClient`].
//!
//! One task owns the client and therefore the whole session state. Inside a
//! session the loop races three things: the client's `poll`, the publish
//! request channel fed by other tasks, and the module tick timer. When the
//! session ends (server disconnect, transport failure, keep-alive timeout)
//! the loop reconnects with exponential backoff and re-registers the
//! module's subscriptions.

use embassy_futures::select::{select3, Either3};
use embassy_time::{Duration, Instant, Timer};

use super::publisher::{BufferedOutbox, PublishRequestReceiver};
use super::registry::{TopicRegistry, MAX_TOPIC_LEN};
use super::traits::MqttModule;
use crate::client::{MqttClient, MqttEvent};
use crate::error::MqttError;
use crate::packet::Publish;
use crate::transport::MqttTransport;

const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(60);
/// Inline payload capacity of the module outbox.
const OUTBOX_PAYLOAD: usize = 256;

/// Drives an [`MqttModule`] over a client session, forever.
pub struct MqttRuntime<
    'a,
    T: MqttTransport,
    M: MqttModule,
    const MAX_TOPICS: usize = 8,
    const OUTBOX_DEPTH: usize = 4,
> {
    client: MqttClient<'a, T>,
    module: M,
    registry: TopicRegistry<MAX_TOPICS>,
    requests: PublishRequestReceiver<'a, OUTBOX_DEPTH>,
    outbox: BufferedOutbox<OUTBOX_DEPTH, MAX_TOPIC_LEN, OUTBOX_PAYLOAD>,
    host: &'a str,
    port: u16,
    tls: bool,
}

impl<'a, T: MqttTransport, M: MqttModule, const MAX_TOPICS: usize, const OUTBOX_DEPTH: usize>
    MqttRuntime<'a, T, M, MAX_TOPICS, OUTBOX_DEPTH>
{
    /// Collects the module's subscriptions and wires the pieces together.
    /// Nothing touches the network until [`Self::run`].
    pub fn new(
        client: MqttClient<'a, T>,
        module: M,
        requests: PublishRequestReceiver<'a, OUTBOX_DEPTH>,
        host: &'a str,
        port: u16,
        tls: bool,
    ) -> Self {
        let mut registry = TopicRegistry::new();
        module.register(&mut registry);
        Self {
            client,
            module,
            registry,
            requests,
            outbox: BufferedOutbox::new(),
            host,
            port,
            tls,
        }
    }

    /// Runs sessions forever, reconnecting with exponential backoff.
    pub async fn run(&mut self) -> ! {
        let mut backoff = RECONNECT_MIN;
        loop {
            match self.session().await {
                Ok(()) => {
                    debug!("mqtt session ended, reconnecting");
                    backoff = RECONNECT_MIN;
                }
                Err(_) => {
                    warn!("mqtt session failed, reconnecting in {} s", backoff.as_secs());
                }
            }
            Timer::after(backoff).await;
            backoff = core::cmp::min(backoff * 2, RECONNECT_MAX);
        }
    }

    /// One connection's lifetime: handshake, subscriptions, module start,
    /// then the poll/publish/tick race until the session ends.
    async fn session(&mut self) -> Result<(), MqttError<T::Error>> {
        self.client.connect(self.host, self.port, self.tls).await?;
        for (filter, options) in self.registry.iter() {
            self.client.subscribe(filter, options).await?;
        }
        self.module.on_start(&mut self.outbox);
        self.flush_outbox().await?;

        let mut next_tick = Instant::now();
        loop {
            if Instant::now() >= next_tick {
                let interval = self.module.on_tick(&mut self.outbox);
                self.flush_outbox().await?;
                next_tick = Instant::now() + interval;
            }
            // A polled event borrows the client, so a queued request is only
            // extracted here and published once the event is gone.
            let request = match select3(
                self.client.poll(),
                self.requests.receive(),
                Timer::at(next_tick),
            )
            .await
            {
                Either3::First(Ok(event)) => {
                    let immediate = match event {
                        MqttEvent::Message(ref message) => {
                            trace!("message on {}", message.topic);
                            self.module.on_message(message);
                            self.module.needs_immediate_publish()
                        }
                        MqttEvent::Disconnected { reason } => {
                            debug!("server closed the session: {:?}", reason);
                            return Ok(());
                        }
                        MqttEvent::SubAck { packet_id, .. } => {
                            trace!("subscription {} acknowledged", packet_id);
                            false
                        }
                        _ => false,
                    };
                    if immediate {
                        // Tick right away so the module's response goes out
                        // before the next scheduled interval.
                        next_tick = Instant::now();
                    }
                    None
                }
                Either3::First(Err(e)) => return Err(e),
                Either3::Second(request) => Some(request),
                Either3::Third(()) => {
                    // Tick deadline; handled at the top of the loop.
                    None
                }
            };
            if let Some(request) = request {
                let mut message = Publish::new(request.topic, request.payload, request.qos);
                message.retain = request.retain;
                self.client.publish(message).await?;
            }
        }
    }

    async fn flush_outbox(&mut self) -> Result<(), MqttError<T::Error>> {
        for request in self.outbox.drain() {
            let mut message =
                Publish::new(request.topic.as_str(), &request.payload, request.qos);
            message.retain = request.retain;
            self.client.publish(message).await?;
        }
        self.outbox.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MqttOptions;
    use crate::error::ReasonCode;
    use crate::packet::{ConnAck, Packet, QoS, ReasonPacket, SubscriptionOptions};
    use crate::property::Properties;
    use crate::runtime::publisher::PublishRequestChannel;
    use crate::runtime::traits::{PublishOutbox, TopicCollector};
    use crate::test_transport::ScriptTransport;
    use futures::executor::block_on;

    /// Announces "online" at start, answers "device/cmd" with a state
    /// publish on the immediately-following tick.
    #[derive(Default)]
    struct StateModule {
        last_command: Option<heapless::Vec<u8, 32>>,
        respond: bool,
    }

    impl MqttModule for StateModule {
        fn register(&self, collector: &mut dyn TopicCollector) {
            collector.add("device/cmd", SubscriptionOptions::qos(QoS::AtMostOnce));
        }

        fn on_message(&mut self, msg: &Publish<'_>) {
            if msg.topic == "device/cmd" {
                self.last_command = heapless::Vec::from_slice(msg.payload).ok();
                self.respond = true;
            }
        }

        fn on_tick(&mut self, outbox: &mut dyn PublishOutbox) -> Duration {
            if self.respond {
                outbox.publish("device/state", b"ok", QoS::AtMostOnce, false);
                self.respond = false;
            }
            Duration::from_secs(60)
        }

        fn on_start(&mut self, outbox: &mut dyn PublishOutbox) {
            outbox.publish("device/state", b"online", QoS::AtMostOnce, true);
        }

        fn needs_immediate_publish(&self) -> bool {
            self.respond
        }
    }

    #[test]
    fn session_subscribes_announces_and_answers_commands() {
        let mut transport = ScriptTransport::default();
        transport.push_packet(&Packet::ConnAck(ConnAck::default()));
        let mut command = Publish::new("device/cmd", b"reboot", QoS::AtMostOnce);
        command.retain = false;
        transport.push_packet(&Packet::Publish(command));
        transport.push_packet(&Packet::Disconnect(ReasonPacket::with_reason(
            ReasonCode::ServerShuttingDown,
        )));

        // The channel outlives the runtime's borrow of it, as it would as a
        // `static` in firmware.
        static CHANNEL: PublishRequestChannel<'static, 4> = PublishRequestChannel::new();
        let client = MqttClient::new(&mut transport, MqttOptions::new("rt-dev"));
        let mut runtime = MqttRuntime::<_, _, 8, 4>::new(
            client,
            StateModule::default(),
            CHANNEL.receiver(),
            "broker.local",
            1883,
            false,
        );
        block_on(runtime.session()).unwrap();

        assert_eq!(
            runtime.module.last_command.as_deref(),
            Some(b"reboot".as_slice())
        );
        drop(runtime);

        let frames = transport.sent_packets();
        // CONNECT, SUBSCRIBE, the start announce, then the command response.
        match &frames[1] {
            Packet::Subscribe(sub) => assert_eq!(sub.entries[0].filter, "device/cmd"),
            other => panic!("expected subscribe, got {other:?}"),
        }
        match &frames[2] {
            Packet::Publish(p) => {
                assert_eq!(p.topic, "device/state");
                assert_eq!(p.payload, b"online");
                assert!(p.retain);
            }
            other => panic!("expected announce, got {other:?}"),
        }
        match &frames[3] {
            Packet::Publish(p) => {
                assert_eq!(p.topic, "device/state");
                assert_eq!(p.payload, b"ok");
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn queued_requests_reach_the_broker() {
        let mut transport = ScriptTransport::default();
        transport.push_packet(&Packet::ConnAck(ConnAck {
            session_present: false,
            reason: ReasonCode::Success,
            properties: Properties::default(),
        }));
        transport.push_packet(&Packet::Disconnect(ReasonPacket::default()));

        static CHANNEL: PublishRequestChannel<'static, 4> = PublishRequestChannel::new();
        CHANNEL
            .sender()
            .try_send(crate::runtime::publisher::PublishRequest {
                topic: "tele/uptime",
                payload: b"42",
                qos: QoS::AtMostOnce,
                retain: false,
            })
            .unwrap();

        let client = MqttClient::new(&mut transport, MqttOptions::new("rt-dev"));
        let mut runtime = MqttRuntime::<_, _, 8, 4>::new(
            client,
            crate::runtime::traits::NoopModule,
            CHANNEL.receiver(),
            "broker.local",
            1883,
            false,
        );
        block_on(runtime.session()).unwrap();
        drop(runtime);

        let published = transport.sent_packets().iter().any(|p| {
            matches!(p, Packet::Publish(m) if m.topic == "tele/uptime" && m.payload == b"42")
        });
        assert!(published);
    }
}
