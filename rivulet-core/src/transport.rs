//! Traits implemented by transport collaborators.
//!
//! A [`Transport`] performs the protocol handshake and hands out the
//! [`ProducerImpl`] and [`Channel`] the broker installs once connected.
//! Wire encoding and protocol clients live behind these traits.

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A stream of consumed messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Message>> + Send>>;

/// Protocol hook owned by a broker.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connection handle produced by the handshake.
    type Connection: Send + Sync + 'static;

    /// Protocol name, e.g. `"kafka"` or `"memory"`.
    fn protocol(&self) -> &str;

    /// Perform the handshake.
    async fn connect(&self) -> Result<Arc<Self::Connection>>;

    /// Producer publishing over `conn`.
    fn producer(&self, conn: &Arc<Self::Connection>) -> Arc<dyn ProducerImpl>;

    /// Channel subscribers consume from.
    fn channel(&self, conn: &Arc<Self::Connection>) -> Arc<dyn Channel>;

    /// Tear the connection down.
    async fn disconnect(&self, conn: Arc<Self::Connection>) -> Result<()>;

    /// Health check bounded by `timeout`.
    async fn ping(&self, conn: &Arc<Self::Connection>, timeout: Duration) -> bool;
}

/// Consuming side of a connection.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Start consuming `subject`.
    async fn subscribe(&self, subject: &str) -> Result<MessageStream>;

    async fn ack(&self, _message: &Message) -> Result<()> {
        Ok(())
    }

    async fn nack(&self, _message: &Message, _requeue: bool) -> Result<()> {
        Ok(())
    }

    /// Release server-side resources of a subscription whose stream was dropped.
    async fn unsubscribe(&self, _subject: &str) -> Result<()> {
        Ok(())
    }
}

/// Publishing side of a connection.
#[async_trait]
pub trait ProducerImpl: Send + Sync {
    async fn publish(&self, message: Message) -> Result<()>;
}
