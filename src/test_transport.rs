//! Scripted in-memory transport for driving the client and runtime in tests.

use crate::packet::Packet;
use crate::transport::{MqttTransport, TransportError};
use std::collections::VecDeque;
use std::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScriptError;

impl TransportError for ScriptError {}

/// Hands out one scripted inbound chunk per `recv` call and records every
/// outbound frame. Reports "no data" once the script runs dry, so polls
/// terminate instead of blocking.
#[derive(Default)]
pub(crate) struct ScriptTransport {
    pub(crate) incoming: VecDeque<Vec<u8>>,
    pub(crate) sent: Vec<Vec<u8>>,
    pub(crate) connects: usize,
}

impl ScriptTransport {
    pub(crate) fn push_packet(&mut self, packet: &Packet<'_>) {
        let mut buf = [0u8; 512];
        let n = packet.encode(&mut buf).unwrap();
        self.incoming.push_back(buf[..n].to_vec());
    }

    /// Decodes every recorded outbound frame.
    pub(crate) fn sent_packets(&self) -> Vec<Packet<'_>> {
        self.sent
            .iter()
            .map(|frame| Packet::decode(frame).unwrap().0)
            .collect()
    }
}

impl MqttTransport for &mut ScriptTransport {
    type Error = ScriptError;

    async fn connect(&mut self, _: &str, _: u16, _: bool) -> Result<(), ScriptError> {
        self.connects += 1;
        Ok(())
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), ScriptError> {
        self.sent.push(buf.to_vec());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ScriptError> {
        // A real socket read suspends at least once; yielding here keeps
        // select-based callers honest about concurrent readiness.
        embassy_futures::yield_now().await;
        match self.incoming.pop_front() {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => Ok(0),
        }
    }

    async fn close(&mut self) {}
}
