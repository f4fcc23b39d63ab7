//! In-process transport.
//!
//! Subjects fan out to every live subscription. Published, acked and nacked
//! messages are recorded so tests can inspect them.

use crate::error::Result;
use crate::message::Message;
use crate::transport::{Channel, MessageStream, ProducerImpl, Transport};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;

#[derive(Default)]
struct Hub {
    routes: RwLock<HashMap<String, Vec<mpsc::UnboundedSender<Result<Message>>>>>,
    published: RwLock<Vec<Message>>,
    acked: RwLock<Vec<String>>,
    nacked: RwLock<Vec<String>>,
    next_tag: AtomicU64,
}

impl Hub {
    fn deliver(&self, mut message: Message) {
        message.delivery_tag = Some(self.next_tag.fetch_add(1, Ordering::SeqCst) + 1);
        self.published.write().push(message.clone());

        let mut routes = self.routes.write();
        if let Some(senders) = routes.get_mut(&message.subject) {
            senders.retain(|sender| sender.send(Ok(message.clone())).is_ok());
            trace!(subject = %message.subject, receivers = senders.len(), "Message delivered");
        }
    }
}

/// Transport keeping everything in process memory.
///
/// Clones share the same subjects and records.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    hub: Arc<Hub>,
}

/// Connection handle of a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryConnection {
    id: uuid::Uuid,
}

impl MemoryConnection {
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message published so far, in order.
    pub fn published(&self) -> Vec<Message> {
        self.hub.published.read().clone()
    }

    /// Published messages addressed to `subject`.
    pub fn published_to(&self, subject: &str) -> Vec<Message> {
        self.hub
            .published
            .read()
            .iter()
            .filter(|message| message.subject == subject)
            .cloned()
            .collect()
    }

    /// Ids of acknowledged messages.
    pub fn acked(&self) -> Vec<String> {
        self.hub.acked.read().clone()
    }

    /// Ids of rejected messages.
    pub fn nacked(&self) -> Vec<String> {
        self.hub.nacked.read().clone()
    }

    /// Take every recorded publish, leaving the record empty.
    pub fn drain_published(&self) -> Vec<Message> {
        std::mem::take(&mut *self.hub.published.write())
    }

    /// Forget published, acked and nacked records. Subscriptions stay live.
    pub fn clear_records(&self) {
        self.hub.published.write().clear();
        self.hub.acked.write().clear();
        self.hub.nacked.write().clear();
    }

    /// Live subscriptions on `subject`.
    pub fn subscription_count(&self, subject: &str) -> usize {
        self.hub
            .routes
            .read()
            .get(subject)
            .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }

    /// Deliver `message` without going through a broker.
    pub fn inject(&self, message: Message) {
        self.hub.deliver(message);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Connection = MemoryConnection;

    fn protocol(&self) -> &str {
        "memory"
    }

    async fn connect(&self) -> Result<Arc<MemoryConnection>> {
        Ok(Arc::new(MemoryConnection {
            id: uuid::Uuid::new_v4(),
        }))
    }

    fn producer(&self, _conn: &Arc<MemoryConnection>) -> Arc<dyn ProducerImpl> {
        Arc::new(MemoryProducer {
            hub: Arc::clone(&self.hub),
        })
    }

    fn channel(&self, _conn: &Arc<MemoryConnection>) -> Arc<dyn Channel> {
        Arc::new(MemoryChannel {
            hub: Arc::clone(&self.hub),
        })
    }

    async fn disconnect(&self, _conn: Arc<MemoryConnection>) -> Result<()> {
        // Dropping the senders ends every subscription stream.
        self.hub.routes.write().clear();
        Ok(())
    }

    async fn ping(&self, _conn: &Arc<MemoryConnection>, _timeout: Duration) -> bool {
        true
    }
}

struct MemoryProducer {
    hub: Arc<Hub>,
}

#[async_trait]
impl ProducerImpl for MemoryProducer {
    async fn publish(&self, message: Message) -> Result<()> {
        self.hub.deliver(message);
        Ok(())
    }
}

struct MemoryChannel {
    hub: Arc<Hub>,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn subscribe(&self, subject: &str) -> Result<MessageStream> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.hub
            .routes
            .write()
            .entry(subject.to_string())
            .or_default()
            .push(sender);
        Ok(Box::pin(UnboundedReceiverStream::new(receiver)))
    }

    async fn ack(&self, message: &Message) -> Result<()> {
        self.hub.acked.write().push(message.id.clone());
        Ok(())
    }

    async fn nack(&self, message: &Message, _requeue: bool) -> Result<()> {
        self.hub.nacked.write().push(message.id.clone());
        Ok(())
    }

    async fn unsubscribe(&self, subject: &str) -> Result<()> {
        let mut routes = self.hub.routes.write();
        if let Some(senders) = routes.get_mut(subject) {
            senders.retain(|sender| !sender.is_closed());
            if senders.is_empty() {
                routes.remove(subject);
            }
        }
        Ok(())
    }
}
