//! netpinger - ICMP group liveness monitor
//!
//! Probes a set of IPv4 hosts with ICMP echo in rounds, debounces each host
//! into an up/down state, folds those states into a single alive/dead group
//! verdict, and runs an action whenever the verdict flips.
//!
//! # Architecture
//!
//! - **Transport**: one ICMP channel, `send` plus an inbound reply stream
//! - **Monitor**: round scheduler, per-host hysteresis, group aggregation
//! - **Actions**: shell commands fired on verdict transitions
//! - **Config**: YAML file with command-line overrides
//!
//! # Example
//!
//! ```rust,no_run
//! use netpinger::{Engine, IcmpTransport, PingerConfig, ShellAction, DEFAULT_REPLY_CAPACITY};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PingerConfig::load("configs/netpinger.yaml")?;
//! let (transport, events) =
//!     IcmpTransport::open(4242, config.wait_timeout, DEFAULT_REPLY_CAPACITY)?;
//! let actions = ShellAction::from_config(&config.actions);
//!
//! let mut engine = Engine::new(config.engine_settings()?, transport, events, actions);
//! engine.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod config;
pub mod monitor;
pub mod transport;

pub use action::{ActionDispatcher, NoopActions, ShellAction};
pub use config::{ConfigError, PingerConfig};
pub use monitor::{
    Engine, EngineError, EngineObserver, EngineSettings, GroupEvent, HostEvent, HostStatus,
    NoopObserver, TracingObserver, Verdict,
};
pub use transport::{
    DEFAULT_REPLY_CAPACITY, IcmpTransport, ReplyEvent, Transport, TransportError, TransportEvent,
};
