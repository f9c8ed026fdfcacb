//! Verdict actions.
//!
//! The engine invokes [`ActionDispatcher::on_alive`] / [`ActionDispatcher::on_dead`]
//! inline, exactly once per group verdict flip and in event order. Results are
//! never inspected by the engine.

mod shell;

pub use shell::{ActionError, ShellAction};

/// Actions fired on group verdict transitions.
#[async_trait::async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Group became alive.
    async fn on_alive(&self);

    /// Group became dead.
    async fn on_dead(&self);
}

/// Dispatcher that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopActions;

#[async_trait::async_trait]
impl ActionDispatcher for NoopActions {
    async fn on_alive(&self) {}

    async fn on_dead(&self) {}
}
