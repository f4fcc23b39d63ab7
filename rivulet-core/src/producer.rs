//! Fixed-identity producer holder.
//!
//! Every hierarchy node creates one [`ProducerContainer`] and hands the same
//! `Arc` to its publishers. The broker swaps the inner implementation at
//! connect and disconnect time, so publishers built before the connection
//! existed never need to refetch it.

use crate::error::{BrokerError, Result};
use crate::message::Message;
use crate::transport::ProducerImpl;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
enum ProducerVariant {
    #[default]
    Unset,
    Live(Arc<dyn ProducerImpl>),
    Disconnected,
}

/// Producer phase, as observed from outside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerPhase {
    Unset,
    Live,
    Disconnected,
}

/// Holder whose inner producer swaps from unset to live to disconnected.
#[derive(Default)]
pub struct ProducerContainer {
    inner: RwLock<ProducerVariant>,
}

impl ProducerContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a live producer.
    pub fn connect(&self, producer: Arc<dyn ProducerImpl>) {
        *self.inner.write() = ProducerVariant::Live(producer);
    }

    /// Drop the live producer; later publishes fail with `ChannelClosed`.
    pub fn disconnect(&self) {
        *self.inner.write() = ProducerVariant::Disconnected;
    }

    pub fn phase(&self) -> ProducerPhase {
        match &*self.inner.read() {
            ProducerVariant::Unset => ProducerPhase::Unset,
            ProducerVariant::Live(_) => ProducerPhase::Live,
            ProducerVariant::Disconnected => ProducerPhase::Disconnected,
        }
    }

    pub fn is_live(&self) -> bool {
        self.phase() == ProducerPhase::Live
    }

    /// Publish through the current producer.
    pub async fn publish(&self, message: Message) -> Result<()> {
        // Clone out so the lock is not held across the await.
        let variant = self.inner.read().clone();
        match variant {
            ProducerVariant::Live(producer) => producer.publish(message).await,
            ProducerVariant::Unset => Err(BrokerError::IncorrectState(
                "producer is not set up, call connect() first".into(),
            )),
            ProducerVariant::Disconnected => {
                Err(BrokerError::ChannelClosed("producer is disconnected".into()))
            }
        }
    }
}

impl fmt::Debug for ProducerContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerContainer")
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Sink {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProducerImpl for Sink {
        async fn publish(&self, message: Message) -> Result<()> {
            self.sent.lock().push(message.subject);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unset_producer_fails() {
        let producer = ProducerContainer::new();
        let err = producer.publish(Message::new("a", "x")).await.unwrap_err();
        assert!(err.is_incorrect_state());
    }

    #[tokio::test]
    async fn test_swap_keeps_identity() {
        let producer = Arc::new(ProducerContainer::new());
        let held = Arc::clone(&producer);
        let sink = Arc::new(Sink::default());

        producer.connect(sink.clone());
        held.publish(Message::new("orders", "x")).await.unwrap();
        assert_eq!(sink.sent.lock().as_slice(), ["orders"]);

        producer.disconnect();
        assert!(matches!(
            held.publish(Message::new("orders", "x")).await,
            Err(BrokerError::ChannelClosed(_))
        ));
        assert!(Arc::ptr_eq(&producer, &held));
    }
}
