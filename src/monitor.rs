//! Probing and aggregation engine.
//!
//! # Architecture
//!
//! - [`HostState`]: per-host hysteresis (`Down`/`Up` plus a streak counter)
//! - [`GroupAggregator`]: up count and the group `Alive`/`Dead` verdict
//! - [`Engine`]: round scheduler, sole owner of the two above
//! - [`EngineObserver`]: observability collaborator, no-op by default
//!
//! Data flows `Engine -> HostState -> GroupAggregator -> ActionDispatcher`.

mod engine;
mod group;
mod host;
mod observer;

pub use engine::{
    DiscardReason, Engine, EngineError, EngineSettings, EngineSnapshot, HostSnapshot,
    RoundReport, RoundStats,
};
pub use group::{GroupAggregator, GroupEvent, GroupThresholds, Verdict};
pub use host::{HostEvent, HostState, HostStatus, Outcome, Thresholds};
pub use observer::{EngineObserver, NoopObserver, TracingObserver};
