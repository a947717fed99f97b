//! The per-client response sink.
//!
//! Clients observe ordinary conversation traffic through the `Updated`
//! replay; the sink is the direct path for content that must reach the user
//! even when replay is not wired — error system messages — plus the typing
//! indicator hooks that bracket a turn.

use async_trait::async_trait;

use crate::error::Result;
use crate::message::ConvMessage;

#[async_trait]
pub trait ResponseSink: Send + Sync {
    /// Deliver a message directly to the client surface.
    async fn deliver(&self, message: &ConvMessage) -> Result<()>;

    /// Signal that the bot started composing. Default: no-op.
    async fn start_typing(&self) {}

    /// Signal that the bot stopped composing. Default: no-op.
    async fn stop_typing(&self) {}
}

/// A sink that swallows everything; useful for tests and headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl ResponseSink for NullSink {
    async fn deliver(&self, _message: &ConvMessage) -> Result<()> {
        Ok(())
    }
}
