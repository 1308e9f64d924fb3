//! # MQTT v5 Client Engine
//!
//! A poll-driven client session over any [`MqttTransport`]. The engine owns
//! two fixed buffers: one accumulates inbound bytes until a complete frame
//! is present, one stages outgoing frames. Decoded events borrow the inbound
//! buffer, so a received payload is handed to the application without a
//! copy; the frame is discarded on the next [`MqttClient::poll`] call, after
//! the application has had its look.
//!
//! Acknowledgments for inbound QoS messages are deferred the same way: the
//! PUBACK (or PUBREC) for a delivered message goes out at the start of the
//! next poll, so the broker only sees the ack once the application has
//! observed the message.
//!
//! Outbound QoS 1/2 publishes are tracked in the in-flight table and
//! retransmitted with the dup flag, under their original identifiers and in
//! the original order, when a connection is re-established into an existing
//! session.

use crate::error::{DecodeError, MqttError, ProtocolError, ReasonCode};
use crate::packet::{
    check_header, AckKind, Connect, Packet, Publish, PublishAck, QoS, ReasonPacket, Subscribe,
    SubscriptionOptions, Unsubscribe, Will,
};
use crate::property::Properties;
use crate::session::{
    ConnectionState, DeliveryOutcome, DeliveryState, InflightRecord, InflightTable,
    PacketIdAllocator, ServerLimits,
};
use crate::transport::MqttTransport;
use embassy_time::{Duration, Instant};
use heapless::Vec;

/// Connection parameters, borrowed from the caller for the client's life.
#[derive(Debug, Clone)]
pub struct MqttOptions<'a> {
    pub client_id: &'a str,
    /// Keep-alive interval in seconds; 0 disables the ping schedule.
    pub keep_alive: u16,
    pub clean_start: bool,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
    pub will: Option<Will<'a>>,
    pub properties: Properties<'a>,
}

impl<'a> MqttOptions<'a> {
    pub fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            keep_alive: 60,
            clean_start: true,
            username: None,
            password: None,
            will: None,
            properties: Properties::default(),
        }
    }
}

/// What a [`MqttClient::poll`] call surfaced.
///
/// Borrowing variants point into the client's receive buffer and are valid
/// until the next call on the client.
#[derive(Debug)]
pub enum MqttEvent<'a> {
    /// Nothing happened within the transport's time budget.
    None,
    /// An application message arrived.
    Message(Publish<'a>),
    /// The broker answered a subscribe; one reason code per filter.
    SubAck { packet_id: u16, codes: &'a [u8] },
    /// The broker answered an unsubscribe.
    UnsubAck { packet_id: u16, codes: &'a [u8] },
    /// An outbound QoS 1/2 publish finished its acknowledgment exchange.
    Published(DeliveryOutcome),
    /// The broker ended the session.
    Disconnected { reason: ReasonCode },
    /// An AUTH exchange packet, surfaced for the application to answer. The
    /// properties carry the authentication method and data untouched.
    Auth {
        reason: ReasonCode,
        properties: Properties<'a>,
    },
}

/// The client session engine.
///
/// `MAX_INFLIGHT` bounds concurrent QoS 1/2 exchanges in each direction;
/// `BUF_SIZE` is the size of the receive and transmit buffers and therefore
/// the largest frame the client can handle.
pub struct MqttClient<'a, T: MqttTransport, const MAX_INFLIGHT: usize = 4, const BUF_SIZE: usize = 1024>
{
    transport: T,
    options: MqttOptions<'a>,
    state: ConnectionState,
    limits: ServerLimits,
    inflight: InflightTable<MAX_INFLIGHT, BUF_SIZE>,
    ids: PacketIdAllocator,
    /// Inbound QoS 2 identifiers between PUBLISH and PUBREL, for exactly-once
    /// duplicate suppression.
    inbound_qos2: Vec<u16, MAX_INFLIGHT>,
    rx: [u8; BUF_SIZE],
    rx_len: usize,
    /// Length of the frame handed out by the previous poll, dropped from the
    /// buffer on the next one.
    consumed: usize,
    /// Ack owed for a message the application saw last poll.
    pending_ack: Option<(AckKind, u16)>,
    tx: [u8; BUF_SIZE],
    keep_alive: Duration,
    last_send: Instant,
    ping_sent: Option<Instant>,
}

impl<'a, T: MqttTransport, const MAX_INFLIGHT: usize, const BUF_SIZE: usize>
    MqttClient<'a, T, MAX_INFLIGHT, BUF_SIZE>
{
    pub fn new(transport: T, options: MqttOptions<'a>) -> Self {
        let keep_alive = Duration::from_secs(options.keep_alive as u64);
        Self {
            transport,
            options,
            state: ConnectionState::Disconnected,
            limits: ServerLimits::default(),
            inflight: InflightTable::new(),
            ids: PacketIdAllocator::new(),
            inbound_qos2: Vec::new(),
            rx: [0; BUF_SIZE],
            rx_len: 0,
            consumed: 0,
            pending_ack: None,
            tx: [0; BUF_SIZE],
            keep_alive,
            last_send: Instant::now(),
            ping_sent: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Limits announced by the server in the last CONNACK.
    pub fn server_limits(&self) -> &ServerLimits {
        &self.limits
    }

    /// Opens the transport and performs the CONNECT/CONNACK handshake.
    ///
    /// On a refused connection the transport is closed again and the reason
    /// code is returned in [`MqttError::ConnectionRefused`]. When the server
    /// resumes an existing session, unacknowledged QoS publishes are
    /// retransmitted with the dup flag, oldest first, before this returns.
    pub async fn connect(
        &mut self,
        host: &str,
        port: u16,
        tls: bool,
    ) -> Result<(), MqttError<T::Error>> {
        self.rx_len = 0;
        self.consumed = 0;
        self.pending_ack = None;
        self.inbound_qos2.clear();
        self.ping_sent = None;
        self.limits = ServerLimits::default();
        self.state = ConnectionState::Connecting;

        match self.handshake(host, port, tls).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn handshake(
        &mut self,
        host: &str,
        port: u16,
        tls: bool,
    ) -> Result<(), MqttError<T::Error>> {
        self.transport.connect(host, port, tls).await?;

        let connect = Connect {
            clean_start: self.options.clean_start,
            keep_alive: self.options.keep_alive,
            properties: self.options.properties.clone(),
            client_id: self.options.client_id,
            will: self.options.will.clone(),
            username: self.options.username,
            password: self.options.password,
        };
        self.send_packet(&Packet::Connect(connect)).await?;

        let total = self.read_frame().await?;
        let (reason, session_present, limits) = {
            let (packet, _) = Packet::decode(&self.rx[..total])?;
            let Packet::ConnAck(connack) = packet else {
                return Err(ProtocolError::UnexpectedPacket.into());
            };
            (
                connack.reason,
                connack.session_present,
                ServerLimits::from_connack(&connack),
            )
        };
        self.rx.copy_within(total..self.rx_len, 0);
        self.rx_len -= total;

        if !reason.is_success() {
            warn!("connection refused: {:?}", reason);
            self.transport.close().await;
            return Err(MqttError::ConnectionRefused(reason));
        }

        self.limits = limits;
        let keep_alive_secs = limits
            .server_keep_alive
            .unwrap_or(self.options.keep_alive);
        self.keep_alive = Duration::from_secs(keep_alive_secs as u64);
        self.state = ConnectionState::Connected;
        self.last_send = Instant::now();
        debug!(
            "connected, session_present={}, receive_maximum={}",
            session_present, limits.receive_maximum
        );

        if session_present {
            self.replay_inflight().await?;
        } else {
            // The server kept no session; the old exchanges are gone.
            self.inflight.clear();
        }
        Ok(())
    }

    /// Retransmits unacknowledged exchanges, oldest first. PUBLISH frames go
    /// out with the dup flag under their original identifiers; exchanges
    /// already past PUBREC resend their PUBREL instead.
    async fn replay_inflight(&mut self) -> Result<(), MqttError<T::Error>> {
        for record in self.inflight.iter_mut() {
            if record.state != DeliveryState::AwaitingPubComp {
                record.mark_dup();
            }
            trace!("replaying packet id {}", record.packet_id);
            self.transport.send(&record.frame).await?;
            self.last_send = Instant::now();
        }
        Ok(())
    }

    /// Publishes a message. `packet_id` and `dup` on the argument are
    /// ignored; the client assigns its own identifier for QoS above 0 and
    /// returns it.
    ///
    /// The QoS is clamped to the server's maximum and the retain flag is
    /// dropped if the server does not support retained messages.
    pub async fn publish(
        &mut self,
        message: Publish<'_>,
    ) -> Result<Option<u16>, MqttError<T::Error>> {
        if self.state != ConnectionState::Connected {
            return Err(MqttError::NotConnected);
        }
        let qos = if message.qos > self.limits.maximum_qos {
            debug!("publish qos clamped to server maximum");
            self.limits.maximum_qos
        } else {
            message.qos
        };
        let retain = message.retain && self.limits.retain_available;

        let packet_id = if qos != QoS::AtMostOnce {
            if self.inflight.is_full()
                || self.inflight.len() >= self.limits.receive_maximum as usize
            {
                return Err(MqttError::InflightFull);
            }
            Some(
                self.ids
                    .allocate(|id| self.inflight.contains(id))
                    .ok_or(MqttError::InflightFull)?,
            )
        } else {
            None
        };

        let publish = Publish {
            dup: false,
            qos,
            retain,
            topic: message.topic,
            packet_id,
            properties: message.properties,
            payload: message.payload,
        };
        let n = self.send_packet(&Packet::Publish(publish)).await?;

        if let Some(id) = packet_id {
            let state = match qos {
                QoS::AtLeastOnce => DeliveryState::AwaitingPubAck,
                _ => DeliveryState::AwaitingPubRec,
            };
            let frame = Vec::from_slice(&self.tx[..n]).map_err(|_| MqttError::PacketTooLarge)?;
            let record = InflightRecord {
                packet_id: id,
                state,
                frame,
            };
            // Capacity was checked before allocating the identifier.
            let _ = self.inflight.insert(record);
        }
        Ok(packet_id)
    }

    /// Sends a SUBSCRIBE for one filter and returns its packet identifier;
    /// the grant arrives later as [`MqttEvent::SubAck`].
    pub async fn subscribe(
        &mut self,
        filter: &str,
        options: SubscriptionOptions,
    ) -> Result<u16, MqttError<T::Error>> {
        if self.state != ConnectionState::Connected {
            return Err(MqttError::NotConnected);
        }
        let id = self
            .ids
            .allocate(|id| self.inflight.contains(id))
            .ok_or(MqttError::InflightFull)?;
        self.send_packet(&Packet::Subscribe(Subscribe::new(id, filter, options)))
            .await?;
        Ok(id)
    }

    /// Sends an UNSUBSCRIBE for one filter and returns its packet
    /// identifier; the result arrives later as [`MqttEvent::UnsubAck`].
    pub async fn unsubscribe(&mut self, filter: &str) -> Result<u16, MqttError<T::Error>> {
        if self.state != ConnectionState::Connected {
            return Err(MqttError::NotConnected);
        }
        let id = self
            .ids
            .allocate(|id| self.inflight.contains(id))
            .ok_or(MqttError::InflightFull)?;
        self.send_packet(&Packet::Unsubscribe(Unsubscribe::new(id, filter)))
            .await?;
        Ok(id)
    }

    /// Ends the session with a DISCONNECT and closes the transport.
    pub async fn disconnect(&mut self, reason: ReasonCode) -> Result<(), MqttError<T::Error>> {
        if self.state != ConnectionState::Connected {
            return Err(MqttError::NotConnected);
        }
        self.state = ConnectionState::Disconnecting;
        let result = self
            .send_packet(&Packet::Disconnect(ReasonPacket::with_reason(reason)))
            .await;
        self.transport.close().await;
        self.state = ConnectionState::Disconnected;
        result.map(|_| ())
    }

    /// Drives the session one step: flushes the ack owed from the previous
    /// poll, keeps the connection alive, and surfaces at most one inbound
    /// event.
    ///
    /// Returns [`MqttEvent::None`] when nothing arrived within the
    /// transport's time budget. Fatal errors leave the client disconnected.
    pub async fn poll(&mut self) -> Result<MqttEvent<'_>, MqttError<T::Error>> {
        if self.state != ConnectionState::Connected {
            return Err(MqttError::NotConnected);
        }

        // The application has seen last poll's message; ack it now.
        if let Some((kind, id)) = self.pending_ack.take() {
            self.send_packet(&Packet::PublishAck(PublishAck::new(kind, id)))
                .await?;
        }
        // Drop the frame handed out last time.
        if self.consumed > 0 {
            self.rx.copy_within(self.consumed..self.rx_len, 0);
            self.rx_len -= self.consumed;
            self.consumed = 0;
        }

        self.keep_alive_step().await?;

        // Accumulate until one frame is complete, without blocking past the
        // transport's time budget.
        let total = loop {
            match check_header(&self.rx[..self.rx_len]) {
                Ok(header) => {
                    let total = header.total_len();
                    if total > BUF_SIZE {
                        self.drop_connection().await;
                        return Err(MqttError::PacketTooLarge);
                    }
                    if total <= self.rx_len {
                        break total;
                    }
                }
                Err(DecodeError::NotEnoughData) => {}
                Err(e) => {
                    self.drop_connection().await;
                    return Err(e.into());
                }
            }
            let n = match self.transport.recv(&mut self.rx[self.rx_len..]).await {
                Ok(n) => n,
                Err(e) => {
                    self.drop_connection().await;
                    return Err(MqttError::Transport(e));
                }
            };
            if n == 0 {
                return Ok(MqttEvent::None);
            }
            self.rx_len += n;
        };

        self.consumed = total;
        self.process_frame(total).await
    }

    /// Interprets one complete frame sitting at the start of the receive
    /// buffer. Session mutations happen on an owned summary of the packet;
    /// the frame is decoded a second time only for events that borrow it.
    async fn process_frame(&mut self, total: usize) -> Result<MqttEvent<'_>, MqttError<T::Error>> {
        enum Inbound {
            Message { qos: QoS, packet_id: Option<u16> },
            Ack(AckKind, u16, ReasonCode),
            SubAck(u16),
            UnsubAck(u16),
            PingResp,
            Disconnect(ReasonCode),
            Auth(ReasonCode),
            Malformed(DecodeError),
            Unexpected,
        }

        // The summary owns no part of the frame, so the decode borrow ends
        // here and the session below is free to mutate the buffer.
        let inbound = match Packet::decode(&self.rx[..total]) {
            Ok((packet, _)) => match packet {
                Packet::Publish(p) => Inbound::Message {
                    qos: p.qos,
                    packet_id: p.packet_id,
                },
                Packet::PublishAck(a) => Inbound::Ack(a.kind, a.packet_id, a.reason),
                Packet::SubAck(a) => Inbound::SubAck(a.packet_id),
                Packet::UnsubAck(a) => Inbound::UnsubAck(a.packet_id),
                Packet::PingResp => Inbound::PingResp,
                Packet::Disconnect(d) => Inbound::Disconnect(d.reason),
                Packet::Auth(a) => Inbound::Auth(a.reason),
                _ => Inbound::Unexpected,
            },
            Err(e) => Inbound::Malformed(e),
        };

        match inbound {
            Inbound::Message { qos, packet_id } => {
                match (qos, packet_id) {
                    (QoS::AtMostOnce, _) => {}
                    (QoS::AtLeastOnce, Some(id)) => {
                        self.pending_ack = Some((AckKind::PubAck, id));
                    }
                    (QoS::ExactlyOnce, Some(id)) => {
                        if self.inbound_qos2.contains(&id) {
                            // Duplicate delivery attempt; already handed to
                            // the application once.
                            trace!("suppressing duplicate qos2 message {}", id);
                            self.pending_ack = Some((AckKind::PubRec, id));
                            return Ok(MqttEvent::None);
                        }
                        if self.inbound_qos2.push(id).is_err() {
                            // No tracking slot left. Withholding the PUBREC
                            // keeps the message pending on the broker side
                            // until the window drains.
                            warn!("inbound qos2 window full, deferring message {}", id);
                            return Ok(MqttEvent::None);
                        }
                        self.pending_ack = Some((AckKind::PubRec, id));
                    }
                    _ => return Ok(MqttEvent::None),
                }
                match Packet::decode(&self.rx[..total]) {
                    Ok((Packet::Publish(publish), _)) => Ok(MqttEvent::Message(publish)),
                    _ => Err(DecodeError::BadData.into()),
                }
            }
            Inbound::Ack(AckKind::PubAck, id, reason) => {
                if self.inflight.remove(id).is_none() {
                    warn!("puback for unknown packet id {}", id);
                    return Ok(MqttEvent::None);
                }
                Ok(MqttEvent::Published(DeliveryOutcome {
                    packet_id: id,
                    reason,
                }))
            }
            Inbound::Ack(AckKind::PubRec, id, reason) => {
                if !self.inflight.contains(id) {
                    warn!("pubrec for unknown packet id {}", id);
                    return Ok(MqttEvent::None);
                }
                if !reason.is_success() {
                    // The exchange is over; the server rejected the message.
                    self.inflight.remove(id);
                    return Ok(MqttEvent::Published(DeliveryOutcome {
                        packet_id: id,
                        reason,
                    }));
                }
                let n = self
                    .send_packet(&Packet::PublishAck(PublishAck::new(AckKind::PubRel, id)))
                    .await?;
                if let Some(record) = self.inflight.get_mut(id) {
                    record.state = DeliveryState::AwaitingPubComp;
                    // Replay after this point resends the PUBREL.
                    record.frame = Vec::from_slice(&self.tx[..n]).unwrap_or_default();
                }
                Ok(MqttEvent::None)
            }
            Inbound::Ack(AckKind::PubComp, id, reason) => {
                if self.inflight.remove(id).is_none() {
                    warn!("pubcomp for unknown packet id {}", id);
                    return Ok(MqttEvent::None);
                }
                Ok(MqttEvent::Published(DeliveryOutcome {
                    packet_id: id,
                    reason,
                }))
            }
            Inbound::Ack(AckKind::PubRel, id, _) => {
                // Inbound QoS 2 completion: answer with PUBCOMP right away.
                self.inbound_qos2.retain(|&pending| pending != id);
                self.send_packet(&Packet::PublishAck(PublishAck::new(AckKind::PubComp, id)))
                    .await?;
                Ok(MqttEvent::None)
            }
            Inbound::SubAck(packet_id) => match Packet::decode(&self.rx[..total]) {
                Ok((Packet::SubAck(ack), _)) => Ok(MqttEvent::SubAck {
                    packet_id,
                    codes: ack.codes,
                }),
                _ => Err(DecodeError::BadData.into()),
            },
            Inbound::UnsubAck(packet_id) => match Packet::decode(&self.rx[..total]) {
                Ok((Packet::UnsubAck(ack), _)) => Ok(MqttEvent::UnsubAck {
                    packet_id,
                    codes: ack.codes,
                }),
                _ => Err(DecodeError::BadData.into()),
            },
            Inbound::PingResp => {
                trace!("pingresp");
                self.ping_sent = None;
                Ok(MqttEvent::None)
            }
            Inbound::Disconnect(reason) => {
                debug!("server disconnect: {:?}", reason);
                self.drop_connection().await;
                Ok(MqttEvent::Disconnected { reason })
            }
            Inbound::Auth(reason) => match Packet::decode(&self.rx[..total]) {
                Ok((Packet::Auth(packet), _)) => Ok(MqttEvent::Auth {
                    reason,
                    properties: packet.properties,
                }),
                _ => Err(DecodeError::BadData.into()),
            },
            Inbound::Malformed(e) => {
                self.drop_connection().await;
                Err(e.into())
            }
            Inbound::Unexpected => {
                self.drop_connection().await;
                Err(ProtocolError::UnexpectedPacket.into())
            }
        }
    }

    /// Sends PINGREQ when the keep-alive interval elapsed without outbound
    /// traffic, and fails the connection when a ping stays unanswered for a
    /// full further interval.
    async fn keep_alive_step(&mut self) -> Result<(), MqttError<T::Error>> {
        if self.keep_alive.as_ticks() == 0 {
            return Ok(());
        }
        let now = Instant::now();
        if let Some(sent) = self.ping_sent {
            if now.saturating_duration_since(sent) > self.keep_alive {
                warn!("keep-alive timeout");
                self.drop_connection().await;
                return Err(ProtocolError::KeepAliveTimeout.into());
            }
        } else if now.saturating_duration_since(self.last_send) >= self.keep_alive {
            self.send_packet(&Packet::PingReq).await?;
            self.ping_sent = Some(now);
        }
        Ok(())
    }

    /// Encodes into the transmit buffer, enforces the server's packet size
    /// limit, and sends.
    async fn send_packet(&mut self, packet: &Packet<'_>) -> Result<usize, MqttError<T::Error>> {
        let n = packet.encode(&mut self.tx)?;
        if n as u32 > self.limits.maximum_packet_size {
            return Err(MqttError::PacketTooLarge);
        }
        self.transport.send(&self.tx[..n]).await?;
        self.last_send = Instant::now();
        Ok(n)
    }

    /// Reads until one complete frame is buffered. Used during the
    /// handshake, where an idle transport is a timeout rather than "no
    /// event".
    async fn read_frame(&mut self) -> Result<usize, MqttError<T::Error>> {
        loop {
            match check_header(&self.rx[..self.rx_len]) {
                Ok(header) => {
                    let total = header.total_len();
                    if total > BUF_SIZE {
                        return Err(MqttError::PacketTooLarge);
                    }
                    if total <= self.rx_len {
                        return Ok(total);
                    }
                }
                Err(DecodeError::NotEnoughData) => {}
                Err(e) => return Err(e.into()),
            }
            let n = self
                .transport
                .recv(&mut self.rx[self.rx_len..])
                .await
                .map_err(MqttError::Transport)?;
            if n == 0 {
                return Err(MqttError::Timeout);
            }
            self.rx_len += n;
        }
    }

    async fn drop_connection(&mut self) {
        self.transport.close().await;
        self.state = ConnectionState::Disconnected;
    }
}
