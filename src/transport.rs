//! # Transport Abstraction
//!
//! The [`MqttTransport`] trait abstracts the byte stream under the client
//! (TCP, TLS offload, serial bridges), keeping the engine network-stack
//! agnostic. With the 2024 edition the trait uses native `async fn`.
//!
//! The `recv` contract is deliberately poll-friendly: `Ok(0)` means no bytes
//! arrived within the transport's time budget and the caller should come
//! back later, while a peer disconnect or I/O failure is an `Err`. This lets
//! the client's `poll` stay responsive without owning a timer.

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::Stack;
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;

/// Marker trait for transport error types.
pub trait TransportError: core::fmt::Debug {}

/// A byte-stream transport for MQTT frames.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    type Error: TransportError;

    /// Opens the underlying connection. `tls` requests a TLS-wrapped stream;
    /// transports without TLS support must fail rather than silently
    /// downgrade.
    async fn connect(&mut self, host: &str, port: u16, tls: bool) -> Result<(), Self::Error>;

    /// Sends the whole buffer.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Receives available bytes into `buf`.
    ///
    /// Returns `Ok(0)` when nothing arrived within the transport's time
    /// budget; a closed connection is an error.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Shuts the connection down.
    async fn close(&mut self);
}

/// Errors of the embassy-net TCP transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpTransportError {
    /// DNS lookup failed or returned no address.
    Dns,
    Connect(embassy_net::tcp::ConnectError),
    Io(embassy_net::tcp::Error),
    /// The peer closed the connection.
    Closed,
    /// TLS was requested but this transport cannot provide it.
    TlsUnsupported,
}

impl TransportError for TcpTransportError {}

/// TCP transport over `embassy-net`, with a per-read time budget.
pub struct TcpTransport<'a> {
    stack: Stack<'a>,
    socket: TcpSocket<'a>,
    timeout: Duration,
}

impl<'a> TcpTransport<'a> {
    /// Wraps an unconnected socket. `timeout` is the budget a single `recv`
    /// waits for bytes before reporting `Ok(0)`.
    pub fn new(stack: Stack<'a>, socket: TcpSocket<'a>, timeout: Duration) -> Self {
        Self {
            stack,
            socket,
            timeout,
        }
    }
}

impl<'a> MqttTransport for TcpTransport<'a> {
    type Error = TcpTransportError;

    async fn connect(&mut self, host: &str, port: u16, tls: bool) -> Result<(), Self::Error> {
        if tls {
            return Err(TcpTransportError::TlsUnsupported);
        }
        let addrs = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|_| TcpTransportError::Dns)?;
        let addr = *addrs.first().ok_or(TcpTransportError::Dns)?;
        debug!("connecting to {}:{}", host, port);
        self.socket
            .connect((addr, port))
            .await
            .map_err(TcpTransportError::Connect)
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.socket
            .write_all(buf)
            .await
            .map_err(TcpTransportError::Io)?;
        // Flush so small control packets are not held back.
        self.socket.flush().await.map_err(TcpTransportError::Io)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let read_fut = self.socket.read(buf);
        let timer = Timer::after(self.timeout);
        match futures::future::select(core::pin::pin!(read_fut), core::pin::pin!(timer)).await {
            futures::future::Either::Left((Ok(0), _)) => {
                warn!("tcp connection closed by peer");
                Err(TcpTransportError::Closed)
            }
            futures::future::Either::Left((Ok(n), _)) => {
                trace!("tcp read: {} bytes", n);
                Ok(n)
            }
            futures::future::Either::Left((Err(e), _)) => Err(TcpTransportError::Io(e)),
            futures::future::Either::Right(((), _)) => Ok(0),
        }
    }

    async fn close(&mut self) {
        self.socket.close();
    }
}
