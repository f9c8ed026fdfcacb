//! Observability collaborator for the engine.
//!
//! The engine never logs directly; it reports to an [`EngineObserver`] handed
//! in at construction. [`NoopObserver`] is the default and [`TracingObserver`]
//! is what the binary installs.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::transport::{ReplyEvent, TransportError};

use super::engine::{DiscardReason, RoundStats};
use super::group::Verdict;
use super::host::HostStatus;

/// Receives engine notifications. Every method defaults to a no-op.
pub trait EngineObserver: Send + Sync {
    /// Engine is about to run its first round.
    fn started(&self, _hosts: usize, _identifier: u16, _group_alive: usize, _group_dead: usize) {}

    /// An echo request could not be sent.
    fn send_failed(&self, _host: Ipv4Addr, _error: &TransportError) {}

    /// A matching reply was credited to `host`.
    fn replied(&self, _host: Ipv4Addr, _streak: u32, _rtt: Option<Duration>) {}

    /// A reply was not attributed to any host.
    fn discarded(&self, _reply: &ReplyEvent, _reason: DiscardReason) {}

    /// `host` saw no reply before the round deadline.
    fn timed_out(&self, _host: Ipv4Addr, _streak: u32) {}

    /// `host` changed state.
    fn host_changed(&self, _host: Ipv4Addr, _status: HostStatus) {}

    /// The group verdict changed.
    fn group_changed(&self, _verdict: Verdict, _up_count: usize, _total: usize) {}

    /// A round finished evaluating.
    fn round_finished(&self, _stats: &RoundStats) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {}

/// Observer that emits `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl EngineObserver for TracingObserver {
    fn started(&self, hosts: usize, identifier: u16, group_alive: usize, group_dead: usize) {
        tracing::info!(
            hosts,
            identifier,
            alive_on = group_alive,
            dead_on = group_dead,
            "Starting the pinger"
        );
    }

    fn send_failed(&self, host: Ipv4Addr, error: &TransportError) {
        tracing::warn!(host = %host, error = %error, "Failed to send ICMP echo request");
    }

    fn replied(&self, host: Ipv4Addr, streak: u32, rtt: Option<Duration>) {
        tracing::debug!(host = %host, streak, rtt = ?rtt, "Successful ping");
    }

    fn discarded(&self, reply: &ReplyEvent, reason: DiscardReason) {
        tracing::debug!(
            host = %reply.address,
            identifier = reply.identifier,
            sequence = reply.sequence,
            reason = %reason,
            "Discarding echo reply"
        );
    }

    fn timed_out(&self, host: Ipv4Addr, streak: u32) {
        tracing::debug!(host = %host, streak, "Ping timed out");
    }

    fn host_changed(&self, host: Ipv4Addr, status: HostStatus) {
        match status {
            HostStatus::Up => tracing::info!(host = %host, status = %status, "Remote host is alive"),
            HostStatus::Down => tracing::info!(host = %host, status = %status, "Remote host is dead"),
        }
    }

    fn group_changed(&self, verdict: Verdict, up_count: usize, total: usize) {
        tracing::info!(verdict = %verdict, up_count, total, "Group verdict changed");
    }

    fn round_finished(&self, stats: &RoundStats) {
        tracing::debug!(
            sequence = stats.sequence,
            sent = stats.sent,
            send_failures = stats.send_failures,
            replies = stats.replies,
            discarded = stats.discarded,
            timed_out = stats.timed_out,
            "Round complete"
        );
    }
}
