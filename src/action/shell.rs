//! Shell command actions.

use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;

use crate::config::ActionsConfig;

use super::ActionDispatcher;

/// Shell used to interpret action strings.
const SHELL: &str = "/bin/sh";

/// Errors from running an action command.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The shell could not be started.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command exited unsuccessfully.
    #[error("'{command}' exited with {status}")]
    Failed { command: String, status: ExitStatus },
}

/// Runs configured commands through `/bin/sh -c`.
///
/// stdout and stderr are inherited; the engine waits for the command to exit
/// before continuing with the round.
#[derive(Debug, Clone, Default)]
pub struct ShellAction {
    on_alive: Option<String>,
    on_dead: Option<String>,
}

impl ShellAction {
    /// Create from optional commands. Blank commands are treated as absent.
    pub fn new(on_alive: Option<String>, on_dead: Option<String>) -> Self {
        let keep = |c: Option<String>| c.filter(|c| !c.trim().is_empty());
        Self {
            on_alive: keep(on_alive),
            on_dead: keep(on_dead),
        }
    }

    pub fn from_config(config: &ActionsConfig) -> Self {
        Self::new(config.on_alive.clone(), config.on_dead.clone())
    }

    /// Run one command and wait for it.
    pub async fn run(command: &str) -> Result<(), ActionError> {
        tracing::debug!(command, "Running command");

        let status = Command::new(SHELL)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| ActionError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ActionError::Failed {
                command: command.to_string(),
                status,
            })
        }
    }

    async fn dispatch(&self, command: Option<&str>, verdict: &str) {
        let Some(command) = command else {
            tracing::debug!(verdict, "No command configured");
            return;
        };
        if let Err(e) = Self::run(command).await {
            tracing::warn!(verdict, error = %e, "Action command failed");
        }
    }
}

#[async_trait::async_trait]
impl ActionDispatcher for ShellAction {
    async fn on_alive(&self) {
        self.dispatch(self.on_alive.as_deref(), "alive").await;
    }

    async fn on_dead(&self) {
        self.dispatch(self.on_dead.as_deref(), "dead").await;
    }
}
