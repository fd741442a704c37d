//! Channel trait: the seam between the chat transport and the router.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

use super::event::{InboundEvent, Reply};

/// Stream of inbound events produced by a channel.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    /// Begin receiving events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Deliver the router's replies for `event`, in order.
    async fn deliver(&self, event: &InboundEvent, replies: Vec<Reply>)
    -> Result<(), ChannelError>;

    /// Check that the transport is reachable.
    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Release transport resources.
    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
