//! ICMP echo transport backed by `surge-ping`.
//!
//! One [`Client`] owns the ICMP socket and its reader task for the lifetime of
//! the process. Each [`Transport::send`] spawns a short-lived task that emits
//! the request, waits for the matching echo reply and publishes the result on
//! the event channel. `surge-ping` performs the write and the wait in a single
//! call, so a wire-level send error surfaces in that task and is published as
//! [`TransportEvent::SendFailed`] rather than returned from `send`.
//!
//! Replies that are malformed, not echo replies, or carry a foreign identifier
//! are filtered by the client and only show up here as lost pings. The
//! client matches replies to requests itself; the published [`ReplyEvent`]
//! carries the identifier and sequence of the request it answered, not values
//! re-decoded from the datagram. With this transport the engine's identifier
//! and sequence checks therefore only reject replies that arrive after their
//! round ended; filtering of foreign traffic happens here.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError};
use tokio::sync::mpsc;

use super::traits::{ReplyEvent, Transport, TransportError, TransportEvent};

/// Default capacity of the reply channel.
pub const DEFAULT_REPLY_CAPACITY: usize = 1024;

/// Echo payload. Empty, like the requests of the classic tool.
const PAYLOAD: [u8; 0] = [];

/// Counters kept by [`IcmpTransport`].
#[derive(Debug, Default)]
pub struct TransportStats {
    sent: AtomicU64,
    replied: AtomicU64,
    lost: AtomicU64,
    failed: AtomicU64,
}

impl TransportStats {
    /// Echo requests handed to the socket.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Matching echo replies published to the engine.
    pub fn replied(&self) -> u64 {
        self.replied.load(Ordering::Relaxed)
    }

    /// Probes that saw no matching reply within the reply window.
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Probes that failed on the wire (send error, decode error).
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// ICMPv4 echo transport.
pub struct IcmpTransport {
    client: Client,
    identifier: u16,
    reply_window: Duration,
    events: mpsc::Sender<TransportEvent>,
    stats: Arc<TransportStats>,
}

impl IcmpTransport {
    /// Open the ICMP channel.
    ///
    /// Returns the transport together with the receiving end of its event
    /// stream. `reply_window` bounds how long an in-flight request waits for its
    /// reply and should match the engine's per-round deadline.
    ///
    /// # Errors
    /// Returns `TransportError::Open` if the socket cannot be created (for
    /// example missing `CAP_NET_RAW` and no unprivileged ICMP sockets).
    pub fn open(
        identifier: u16,
        reply_window: Duration,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), TransportError> {
        let client = Client::new(&Config::default()).map_err(TransportError::Open)?;
        let (tx, rx) = mpsc::channel(capacity.max(1));

        tracing::debug!(identifier, reply_window = ?reply_window, "ICMP channel opened");

        Ok((
            Self {
                client,
                identifier,
                reply_window,
                events: tx,
                stats: Arc::new(TransportStats::default()),
            },
            rx,
        ))
    }

    /// Shared transport counters.
    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }
}

impl std::fmt::Debug for IcmpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcmpTransport")
            .field("identifier", &self.identifier)
            .field("reply_window", &self.reply_window)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Transport for IcmpTransport {
    fn identifier(&self) -> u16 {
        self.identifier
    }

    async fn send(
        &self,
        target: Ipv4Addr,
        identifier: u16,
        sequence: u16,
    ) -> Result<(), TransportError> {
        if self.events.is_closed() {
            return Err(TransportError::Send {
                target,
                reason: "reply channel closed".to_string(),
            });
        }

        let mut pinger = self
            .client
            .pinger(IpAddr::V4(target), PingIdentifier(identifier))
            .await;
        pinger.timeout(self.reply_window);

        let events = self.events.clone();
        let stats = Arc::clone(&self.stats);
        stats.sent.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            let result = pinger.ping(PingSequence(sequence), &PAYLOAD).await;
            let Some(event) = ping_event(target, identifier, sequence, result, &stats) else {
                return;
            };
            if events.send(event).await.is_err() {
                tracing::debug!(host = %target, sequence, "Event channel closed, dropping ping result");
            }
        });

        Ok(())
    }
}

/// Map one finished ping to the event the engine should see.
///
/// A timeout is not an event: the engine's own deadline accounts for it.
fn ping_event<P>(
    target: Ipv4Addr,
    identifier: u16,
    sequence: u16,
    result: Result<(P, Duration), SurgeError>,
    stats: &TransportStats,
) -> Option<TransportEvent> {
    match result {
        Ok((_, rtt)) => {
            stats.replied.fetch_add(1, Ordering::Relaxed);
            Some(ReplyEvent::new(target, identifier, sequence).with_rtt(rtt).into())
        }
        Err(SurgeError::Timeout { .. }) => {
            stats.lost.fetch_add(1, Ordering::Relaxed);
            None
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(host = %target, sequence, error = %e, "Echo request failed");
            Some(TransportEvent::SendFailed {
                target,
                sequence,
                error: TransportError::Send {
                    target,
                    reason: e.to_string(),
                },
            })
        }
    }
}
