//! Round scheduler.
//!
//! Each round: bump the sequence number, send an echo to every host, then
//! select over the round deadline and the reply channel. Matching replies are
//! credited immediately; hosts still unanswered when the deadline fires are
//! fed a timeout. The engine then sleeps for the configured pause.
//!
//! The engine is the only owner of host and group state. The transport's
//! receive side only publishes [`TransportEvent`]s onto the channel.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};

use crate::action::ActionDispatcher;
use crate::config::ConfigError;
use crate::transport::{ReplyEvent, Transport, TransportError, TransportEvent};

use super::group::{GroupAggregator, GroupEvent, GroupThresholds, Verdict};
use super::host::{HostEvent, HostState, HostStatus, Outcome, Thresholds};
use super::observer::{EngineObserver, NoopObserver};

/// Errors that stop the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The transport failed in a way that cannot be recovered.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Every reply sender is gone; no reply could ever arrive again.
    #[error("reply channel closed")]
    ReceiverClosed,
}

/// Why a reply was not credited to a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Source address is not monitored.
    UnknownHost,
    /// Identifier belongs to another pinger.
    ForeignIdentifier,
    /// Sequence number is not the current round's.
    StaleSequence,
    /// Host already replied this round.
    Duplicate,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnknownHost => "unknown_host",
            Self::ForeignIdentifier => "foreign_identifier",
            Self::StaleSequence => "stale_sequence",
            Self::Duplicate => "duplicate",
        };
        f.write_str(s)
    }
}

/// Validated engine settings.
///
/// Built with [`EngineSettings::new`] or
/// [`crate::config::PingerConfig::engine_settings`]; group thresholds are
/// always resolved against the final target list.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    targets: Vec<Ipv4Addr>,
    wait_timeout: Duration,
    pause: Duration,
    thresholds: Thresholds,
    group: GroupThresholds,
}

impl EngineSettings {
    /// Validate and build settings.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` for an empty or duplicated
    /// target list, a zero `wait_timeout`, or group thresholds out of range
    /// for the number of targets.
    pub fn new(
        targets: Vec<Ipv4Addr>,
        wait_timeout: Duration,
        pause: Duration,
        thresholds: Thresholds,
        group_alive: Option<usize>,
        group_dead: Option<usize>,
    ) -> Result<Self, ConfigError> {
        if targets.is_empty() {
            return Err(ConfigError::invalid("at least one target address is required"));
        }

        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target) {
                return Err(ConfigError::invalid(format!(
                    "duplicate target address: '{target}'"
                )));
            }
        }

        if wait_timeout.is_zero() {
            return Err(ConfigError::invalid("wait_timeout must be non-zero"));
        }

        let group = GroupThresholds::resolve(group_alive, group_dead, targets.len())?;

        Ok(Self {
            targets,
            wait_timeout,
            pause,
            thresholds,
            group,
        })
    }

    /// Addresses to ping, without duplicates.
    pub fn targets(&self) -> &[Ipv4Addr] {
        &self.targets
    }

    /// Per-round reply deadline.
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Sleep between rounds.
    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Per-host hysteresis thresholds.
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Group thresholds, resolved against [`EngineSettings::targets`].
    pub fn group(&self) -> GroupThresholds {
        self.group
    }
}

/// Counters for one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundStats {
    pub sequence: u16,
    pub sent: usize,
    pub send_failures: usize,
    pub replies: usize,
    pub discarded: usize,
    pub timed_out: usize,
}

/// Everything that happened in one round.
#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    pub stats: RoundStats,
    /// Host transitions, in the order they happened.
    pub host_events: Vec<(Ipv4Addr, HostEvent)>,
    /// Verdict transitions, in the order they happened.
    pub group_events: Vec<GroupEvent>,
}

/// Point-in-time view of one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSnapshot {
    pub address: Ipv4Addr,
    pub status: HostStatus,
    pub streak: u32,
}

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub sequence: u16,
    pub hosts: Vec<HostSnapshot>,
    pub up_count: usize,
    pub verdict: Verdict,
}

impl EngineSnapshot {
    /// Status of `address`, if it is monitored.
    pub fn status_of(&self, address: Ipv4Addr) -> Option<HostStatus> {
        self.hosts
            .iter()
            .find(|h| h.address == address)
            .map(|h| h.status)
    }
}

/// Probing and aggregation engine.
pub struct Engine<T, A> {
    transport: T,
    events: mpsc::Receiver<TransportEvent>,
    actions: A,
    observer: Arc<dyn EngineObserver>,
    hosts: Vec<HostState>,
    index: HashMap<Ipv4Addr, usize>,
    group: GroupAggregator,
    identifier: u16,
    sequence: u16,
    wait_timeout: Duration,
    pause: Duration,
}

impl<T: Transport, A: ActionDispatcher> Engine<T, A> {
    /// Create an engine over `transport` and its event stream.
    pub fn new(
        settings: EngineSettings,
        transport: T,
        events: mpsc::Receiver<TransportEvent>,
        actions: A,
    ) -> Self {
        let hosts: Vec<HostState> = settings
            .targets
            .iter()
            .map(|addr| HostState::new(*addr, settings.thresholds))
            .collect();
        let index = hosts
            .iter()
            .enumerate()
            .map(|(i, h)| (h.address(), i))
            .collect();
        let group = GroupAggregator::new(settings.group, hosts.len());
        let identifier = transport.identifier();

        Self {
            transport,
            events,
            actions,
            observer: Arc::new(NoopObserver),
            hosts,
            index,
            group,
            identifier,
            sequence: 0,
            wait_timeout: settings.wait_timeout,
            pause: settings.pause,
        }
    }

    /// Install an observer.
    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Identifier expected on replies.
    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    /// Current state of hosts and group.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            sequence: self.sequence,
            hosts: self
                .hosts
                .iter()
                .map(|h| HostSnapshot {
                    address: h.address(),
                    status: h.status(),
                    streak: h.streak(),
                })
                .collect(),
            up_count: self.group.up_count(),
            verdict: self.group.verdict(),
        }
    }

    /// Run rounds until a fatal error.
    ///
    /// Per-round failures are absorbed; only a closed reply channel ends the
    /// loop.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        let thresholds = self.group.thresholds();
        self.observer.started(
            self.hosts.len(),
            self.identifier,
            thresholds.alive(),
            thresholds.dead(),
        );

        loop {
            self.run_round().await?;
            sleep(self.pause).await;
        }
    }

    /// Run one send / wait / evaluate cycle.
    pub async fn run_round(&mut self) -> Result<RoundReport, EngineError> {
        self.sequence = self.sequence.wrapping_add(1);
        let mut report = RoundReport {
            stats: RoundStats {
                sequence: self.sequence,
                ..RoundStats::default()
            },
            ..RoundReport::default()
        };

        self.send_all(&mut report).await;

        let deadline = sleep_until(Instant::now() + self.wait_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => break,
                event = self.events.recv() => match event {
                    Some(TransportEvent::Reply(reply)) => self.handle_reply(reply, &mut report).await,
                    Some(TransportEvent::SendFailed { target, sequence, error }) => {
                        self.handle_send_failure(target, sequence, &error, &mut report);
                    }
                    None => return Err(EngineError::ReceiverClosed),
                },
            }
        }

        for idx in 0..self.hosts.len() {
            if self.hosts[idx].replied_this_round() {
                continue;
            }
            report.stats.timed_out += 1;
            self.apply_outcome(idx, Outcome::TimedOut, None, &mut report)
                .await;
        }

        self.observer.round_finished(&report.stats);
        Ok(report)
    }

    async fn send_all(&mut self, report: &mut RoundReport) {
        for host in &mut self.hosts {
            host.begin_round();
        }

        for host in &self.hosts {
            let address = host.address();
            report.stats.sent += 1;
            if let Err(e) = self
                .transport
                .send(address, self.identifier, self.sequence)
                .await
            {
                report.stats.send_failures += 1;
                self.observer.send_failed(address, &e);
            }
        }
    }

    /// Failures reported after `send` returned. Those of earlier rounds were
    /// already accounted for as timeouts and are ignored.
    fn handle_send_failure(
        &self,
        target: Ipv4Addr,
        sequence: u16,
        error: &TransportError,
        report: &mut RoundReport,
    ) {
        if sequence != self.sequence || !self.index.contains_key(&target) {
            return;
        }
        report.stats.send_failures += 1;
        self.observer.send_failed(target, error);
    }

    async fn handle_reply(&mut self, reply: ReplyEvent, report: &mut RoundReport) {
        let idx = match self.classify(&reply) {
            Ok(idx) => idx,
            Err(reason) => {
                report.stats.discarded += 1;
                self.observer.discarded(&reply, reason);
                return;
            }
        };

        self.hosts[idx].mark_replied();
        report.stats.replies += 1;
        self.apply_outcome(idx, Outcome::Replied, reply.rtt, report)
            .await;
    }

    fn classify(&self, reply: &ReplyEvent) -> Result<usize, DiscardReason> {
        let idx = *self
            .index
            .get(&reply.address)
            .ok_or(DiscardReason::UnknownHost)?;
        if reply.identifier != self.identifier {
            return Err(DiscardReason::ForeignIdentifier);
        }
        if reply.sequence != self.sequence {
            return Err(DiscardReason::StaleSequence);
        }
        if self.hosts[idx].replied_this_round() {
            return Err(DiscardReason::Duplicate);
        }
        Ok(idx)
    }

    async fn apply_outcome(
        &mut self,
        idx: usize,
        outcome: Outcome,
        rtt: Option<Duration>,
        report: &mut RoundReport,
    ) {
        let host = &mut self.hosts[idx];
        let address = host.address();
        let event = host.observe(outcome);
        let streak = host.streak();
        let status = host.status();

        match outcome {
            Outcome::Replied => self.observer.replied(address, streak, rtt),
            Outcome::TimedOut => self.observer.timed_out(address, streak),
        }

        let Some(event) = event else {
            return;
        };
        self.observer.host_changed(address, status);
        report.host_events.push((address, event));

        let Some(group_event) = self.group.on_host_event(event) else {
            return;
        };
        self.observer
            .group_changed(self.group.verdict(), self.group.up_count(), self.group.total());
        report.group_events.push(group_event);

        match group_event {
            GroupEvent::BecameAlive => self.actions.on_alive().await,
            GroupEvent::BecameDead => self.actions.on_dead().await,
        }
    }
}

impl<T, A> fmt::Debug for Engine<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("hosts", &self.hosts.len())
            .field("identifier", &self.identifier)
            .field("sequence", &self.sequence)
            .field("up_count", &self.group.up_count())
            .field("verdict", &self.group.verdict())
            .finish_non_exhaustive()
    }
}
