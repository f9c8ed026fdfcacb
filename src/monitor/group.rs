//! Group-level verdict aggregation.

use std::fmt;

use crate::config::ConfigError;

use super::host::HostEvent;

/// Group verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verdict {
    /// Initial verdict.
    #[default]
    Dead,
    Alive,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dead => f.write_str("dead"),
            Self::Alive => f.write_str("alive"),
        }
    }
}

/// Emitted when the group verdict flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEvent {
    BecameAlive,
    BecameDead,
}

/// Group thresholds, resolved against the number of monitored hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupThresholds {
    alive: usize,
    dead: usize,
}

impl GroupThresholds {
    /// Resolve optional thresholds for `total` hosts.
    ///
    /// `alive` defaults to `total` (every host must be up), `dead` defaults
    /// to 0 (no host up).
    ///
    /// # Errors
    /// Rejects an alive threshold outside `1..=total` and a dead threshold
    /// that every possible up count would satisfy.
    pub fn resolve(
        alive: Option<usize>,
        dead: Option<usize>,
        total: usize,
    ) -> Result<Self, ConfigError> {
        let alive = alive.unwrap_or(total);
        let dead = dead.unwrap_or(0);

        if alive == 0 {
            return Err(ConfigError::invalid("group_alive must be at least 1"));
        }
        if alive > total {
            return Err(ConfigError::invalid(format!(
                "group_alive ({alive}) exceeds the number of targets ({total})"
            )));
        }
        if dead >= total {
            return Err(ConfigError::invalid(format!(
                "group_dead ({dead}) must be lower than the number of targets ({total})"
            )));
        }

        Ok(Self { alive, dead })
    }

    /// Up count at or above which the group becomes alive.
    pub fn alive(&self) -> usize {
        self.alive
    }

    /// Up count at or below which the group becomes dead.
    pub fn dead(&self) -> usize {
        self.dead
    }
}

/// Counts up hosts and derives the group verdict.
///
/// Each host event is applied on its own: a round that raises and drops
/// several hosts may flip the verdict more than once.
#[derive(Debug, Clone)]
pub struct GroupAggregator {
    thresholds: GroupThresholds,
    total: usize,
    up_count: usize,
    verdict: Verdict,
}

impl GroupAggregator {
    pub fn new(thresholds: GroupThresholds, total: usize) -> Self {
        Self {
            thresholds,
            total,
            up_count: 0,
            verdict: Verdict::Dead,
        }
    }

    pub fn up_count(&self) -> usize {
        self.up_count
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn thresholds(&self) -> GroupThresholds {
        self.thresholds
    }

    /// Apply one host transition.
    pub fn on_host_event(&mut self, event: HostEvent) -> Option<GroupEvent> {
        match event {
            HostEvent::BecameUp => {
                debug_assert!(self.up_count < self.total, "more hosts up than monitored");
                self.up_count = (self.up_count + 1).min(self.total);
                if self.verdict == Verdict::Dead && self.up_count >= self.thresholds.alive {
                    self.verdict = Verdict::Alive;
                    return Some(GroupEvent::BecameAlive);
                }
            }
            HostEvent::BecameDown => {
                debug_assert!(self.up_count > 0, "host went down while none were up");
                self.up_count = self.up_count.saturating_sub(1);
                if self.verdict == Verdict::Alive && self.up_count <= self.thresholds.dead {
                    self.verdict = Verdict::Dead;
                    return Some(GroupEvent::BecameDead);
                }
            }
        }
        None
    }
}
