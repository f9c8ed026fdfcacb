//! Transport boundary consumed by the engine.

use std::net::Ipv4Addr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The ICMP socket could not be opened. Fatal at startup.
    #[error("failed to open ICMP channel: {0}")]
    Open(#[source] std::io::Error),

    /// A single echo request could not be emitted.
    #[error("failed to send echo request to {target}: {reason}")]
    Send {
        /// Probe target.
        target: Ipv4Addr,
        /// Underlying cause.
        reason: String,
    },
}

/// An echo reply decoded by the transport.
///
/// Only echo replies carrying this instance's identifier are published;
/// everything else is dropped before it reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyEvent {
    /// Source address of the reply.
    pub address: Ipv4Addr,
    /// ICMP echo identifier.
    pub identifier: u16,
    /// ICMP echo sequence number.
    pub sequence: u16,
    /// Round-trip time, when the transport measured one.
    pub rtt: Option<Duration>,
}

impl ReplyEvent {
    /// Create a reply event without a round-trip measurement.
    pub fn new(address: Ipv4Addr, identifier: u16, sequence: u16) -> Self {
        Self {
            address,
            identifier,
            sequence,
            rtt: None,
        }
    }

    /// Attach a round-trip time.
    pub fn with_rtt(mut self, rtt: Duration) -> Self {
        self.rtt = Some(rtt);
        self
    }
}

/// Item on the inbound transport stream.
#[derive(Debug)]
pub enum TransportEvent {
    /// A matching echo reply.
    Reply(ReplyEvent),

    /// An echo request that was accepted by [`Transport::send`] but failed on
    /// the wire afterwards.
    SendFailed {
        /// Probe target.
        target: Ipv4Addr,
        /// Sequence number of the failed request.
        sequence: u16,
        /// Underlying cause.
        error: TransportError,
    },
}

impl From<ReplyEvent> for TransportEvent {
    fn from(reply: ReplyEvent) -> Self {
        Self::Reply(reply)
    }
}

/// Send side of an ICMP echo channel.
///
/// Implementations must not block on replies: `send` returns once the request
/// is handed off, and replies arrive on the receiver returned alongside the
/// transport. Failures detected after `send` returned are published on that
/// receiver as [`TransportEvent::SendFailed`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Identifier stamped on every request, fixed for the transport lifetime.
    fn identifier(&self) -> u16;

    /// Emit one echo request.
    async fn send(
        &self,
        target: Ipv4Addr,
        identifier: u16,
        sequence: u16,
    ) -> Result<(), TransportError>;
}
