//! Per-host hysteresis state machine.
//!
//! A host is either [`HostStatus::Down`] (initial) or [`HostStatus::Up`]. It
//! changes state only on the round where the run of consecutive opposite
//! outcomes reaches exactly the configured threshold, so isolated lost
//! packets never flap the reported state.

use std::fmt;
use std::net::Ipv4Addr;
use std::num::NonZeroU32;

use crate::config::ConfigError;

/// Result of one round for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A matching echo reply arrived before the deadline.
    Replied,
    /// The round deadline fired without a matching reply.
    TimedOut,
}

/// Debounced host state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostStatus {
    /// Not reachable (initial state).
    #[default]
    Down,
    /// Reachable.
    Up,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Down => f.write_str("down"),
            Self::Up => f.write_str("up"),
        }
    }
}

/// Emitted when a host changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// `Down -> Up`.
    BecameUp,
    /// `Up -> Down`.
    BecameDown,
}

/// Per-host hysteresis thresholds, both at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    alive: NonZeroU32,
    dead: NonZeroU32,
}

impl Thresholds {
    /// Create thresholds.
    ///
    /// # Errors
    /// A zero threshold would fire before any outcome has been observed and is
    /// rejected with `ConfigError::ValidationError`.
    pub fn new(alive: u32, dead: u32) -> Result<Self, ConfigError> {
        let alive = NonZeroU32::new(alive)
            .ok_or_else(|| ConfigError::invalid("alive_count must be at least 1"))?;
        let dead = NonZeroU32::new(dead)
            .ok_or_else(|| ConfigError::invalid("dead_count must be at least 1"))?;
        Ok(Self { alive, dead })
    }

    /// Consecutive replies needed for `Down -> Up`.
    pub fn alive(&self) -> u32 {
        self.alive.get()
    }

    /// Consecutive timeouts needed for `Up -> Down`.
    pub fn dead(&self) -> u32 {
        self.dead.get()
    }
}

/// State of one monitored address.
#[derive(Debug, Clone)]
pub struct HostState {
    address: Ipv4Addr,
    thresholds: Thresholds,
    status: HostStatus,
    streak: u32,
    last_outcome: Option<Outcome>,
    replied_this_round: bool,
}

impl HostState {
    /// Create a host in the `Down` state with no observed outcomes.
    pub fn new(address: Ipv4Addr, thresholds: Thresholds) -> Self {
        Self {
            address,
            thresholds,
            status: HostStatus::Down,
            streak: 0,
            last_outcome: None,
            replied_this_round: false,
        }
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn status(&self) -> HostStatus {
        self.status
    }

    /// Consecutive same-direction outcomes, counted from 1 again after a
    /// transition.
    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn replied_this_round(&self) -> bool {
        self.replied_this_round
    }

    pub(crate) fn begin_round(&mut self) {
        self.replied_this_round = false;
    }

    pub(crate) fn mark_replied(&mut self) {
        self.replied_this_round = true;
    }

    /// Feed one round outcome.
    ///
    /// Returns an event only on the round where the streak of outcomes
    /// opposite to the current status reaches its threshold.
    pub fn observe(&mut self, outcome: Outcome) -> Option<HostEvent> {
        self.streak = match self.last_outcome {
            Some(previous) if previous == outcome => self.streak.saturating_add(1),
            _ => 1,
        };
        self.last_outcome = Some(outcome);

        let (target, threshold, event) = match outcome {
            Outcome::Replied => (HostStatus::Up, self.thresholds.alive(), HostEvent::BecameUp),
            Outcome::TimedOut => (
                HostStatus::Down,
                self.thresholds.dead(),
                HostEvent::BecameDown,
            ),
        };

        if self.status == target || self.streak != threshold {
            return None;
        }

        self.status = target;
        self.streak = 1;
        Some(event)
    }
}
