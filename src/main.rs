//! netpinger binary entry point.
//!
//! Parses the command line, loads configuration, opens the ICMP channel and
//! runs the engine until it fails or the process is signalled.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use netpinger::{
    DEFAULT_REPLY_CAPACITY, Engine, IcmpTransport, PingerConfig, ShellAction, TracingObserver,
    config::parse_duration,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Ping a group of hosts and run commands when the group goes up or down.
#[derive(Parser, Debug)]
#[command(name = "netpinger", version, about, long_about = None)]
struct Cli {
    /// Addresses to ping (appended to the config file targets)
    #[arg(value_name = "IP")]
    targets: Vec<Ipv4Addr>,

    /// Path to a YAML configuration file
    #[arg(short, long, env = "NETPINGER_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Command to run when the group becomes alive
    #[arg(short = 'a', long, env = "NETPINGER_ALIVE_CMD")]
    alive_cmd: Option<String>,

    /// Command to run when the group becomes dead
    #[arg(short = 'd', long, env = "NETPINGER_DEAD_CMD")]
    dead_cmd: Option<String>,

    /// Per-round reply deadline [default: 1s]
    #[arg(long, value_parser = parse_duration)]
    wait: Option<Duration>,

    /// Pause between rounds [default: 5s]
    #[arg(long, value_parser = parse_duration)]
    pause: Option<Duration>,

    /// Consecutive replies to consider a host alive [default: 3]
    #[arg(long)]
    alive_count: Option<u32>,

    /// Consecutive timeouts to consider a host dead [default: 3]
    #[arg(long)]
    dead_count: Option<u32>,

    /// Hosts that must be alive for the group to be alive [default: all]
    #[arg(long)]
    group_alive: Option<usize>,

    /// The group is dead once at most this many hosts are alive [default: 0]
    #[arg(long)]
    group_dead: Option<usize>,
}

impl Cli {
    /// Apply flags on top of file configuration (CLI > ENV > config file).
    fn apply(self, config: &mut PingerConfig) {
        config.targets.extend(self.targets);
        if let Some(cmd) = self.alive_cmd {
            config.actions.on_alive = Some(cmd);
        }
        if let Some(cmd) = self.dead_cmd {
            config.actions.on_dead = Some(cmd);
        }
        if let Some(wait) = self.wait {
            config.wait_timeout = wait;
        }
        if let Some(pause) = self.pause {
            config.pause = pause;
        }
        if let Some(count) = self.alive_count {
            config.alive_count = count;
        }
        if let Some(count) = self.dead_count {
            config.dead_count = count;
        }
        if self.group_alive.is_some() {
            config.group_alive = self.group_alive;
        }
        if self.group_dead.is_some() {
            config.group_dead = self.group_dead;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match cli.config.as_deref() {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            PingerConfig::read(path)?
        }
        None => PingerConfig::default(),
    };
    cli.apply(&mut config);

    let settings = config.engine_settings()?;
    let identifier = config.identifier.unwrap_or_else(rand::random);

    tracing::info!(
        targets = settings.targets().len(),
        wait = ?settings.wait_timeout(),
        pause = ?settings.pause(),
        alive_count = settings.thresholds().alive(),
        dead_count = settings.thresholds().dead(),
        "Configuration loaded"
    );

    let (transport, events) =
        IcmpTransport::open(identifier, settings.wait_timeout(), DEFAULT_REPLY_CAPACITY)?;
    let stats = transport.stats();
    let actions = ShellAction::from_config(&config.actions);

    let mut engine = Engine::new(settings, transport, events, actions)
        .with_observer(Arc::new(TracingObserver));

    let result = tokio::select! {
        result = engine.run() => result,
        _ = shutdown_signal() => Ok(()),
    };

    tracing::info!(
        sent = stats.sent(),
        replied = stats.replied(),
        lost = stats.lost(),
        failed = stats.failed(),
        "Pinger stopped"
    );

    result?;
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
