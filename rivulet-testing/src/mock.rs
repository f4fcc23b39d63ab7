// Mock transport with call counters and injectable failures

use async_trait::async_trait;
use parking_lot::Mutex;
use rivulet_core::{
    BrokerError, Channel, MemoryConnection, MemoryTransport, Message, MessageStream, ProducerImpl,
    Result, Transport,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Transport operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Connect,
    Subscribe,
    Publish,
    Unsubscribe,
    Disconnect,
}

/// Error returned by an operation armed with [`MockTransport::fail`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("injected {0:?} failure")]
pub struct InjectedFailure(pub FailPoint);

#[derive(Default)]
struct MockState {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    subscribes: AtomicUsize,
    publishes: AtomicUsize,
    unreachable: AtomicBool,
    failures: Mutex<HashSet<FailPoint>>,
    subject_failures: Mutex<HashSet<(FailPoint, String)>>,
    subscribed: Mutex<Vec<String>>,
}

impl MockState {
    fn check(&self, point: FailPoint) -> Result<()> {
        if self.failures.lock().contains(&point) {
            return Err(BrokerError::transport(InjectedFailure(point)));
        }
        Ok(())
    }

    fn check_subject(&self, point: FailPoint, subject: &str) -> Result<()> {
        self.check(point)?;
        if self
            .subject_failures
            .lock()
            .contains(&(point, subject.to_string()))
        {
            return Err(BrokerError::transport(InjectedFailure(point)));
        }
        Ok(())
    }
}

/// [`MemoryTransport`] wrapper that counts calls and fails on demand.
///
/// Clones share counters, armed failures and the underlying memory hub.
#[derive(Clone, Default)]
pub struct MockTransport {
    memory: MemoryTransport,
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped transport, for inspecting published and acked messages.
    pub fn memory(&self) -> &MemoryTransport {
        &self.memory
    }

    /// Make every later call at `point` fail until [`MockTransport::recover`].
    pub fn fail(&self, point: FailPoint) {
        self.state.failures.lock().insert(point);
    }

    pub fn failing(self, point: FailPoint) -> Self {
        self.fail(point);
        self
    }

    pub fn recover(&self, point: FailPoint) {
        self.state.failures.lock().remove(&point);
        self.state
            .subject_failures
            .lock()
            .retain(|(armed, _)| *armed != point);
    }

    /// Fail subscriptions to `subject` only.
    pub fn fail_subscribe_on(&self, subject: impl Into<String>) {
        self.state
            .subject_failures
            .lock()
            .insert((FailPoint::Subscribe, subject.into()));
    }

    /// Fail unsubscribing from `subject` only.
    pub fn fail_unsubscribe_on(&self, subject: impl Into<String>) {
        self.state
            .subject_failures
            .lock()
            .insert((FailPoint::Unsubscribe, subject.into()));
    }

    /// Subjects subscribed successfully, in order.
    pub fn subscribed_subjects(&self) -> Vec<String> {
        self.state.subscribed.lock().clone()
    }

    /// Make `ping` report the transport as unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> usize {
        self.state.subscribes.load(Ordering::SeqCst)
    }

    pub fn publish_count(&self) -> usize {
        self.state.publishes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Connection = MemoryConnection;

    fn protocol(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> Result<Arc<MemoryConnection>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.check(FailPoint::Connect)?;
        self.memory.connect().await
    }

    fn producer(&self, conn: &Arc<MemoryConnection>) -> Arc<dyn ProducerImpl> {
        Arc::new(MockProducer {
            inner: self.memory.producer(conn),
            state: Arc::clone(&self.state),
        })
    }

    fn channel(&self, conn: &Arc<MemoryConnection>) -> Arc<dyn Channel> {
        Arc::new(MockChannel {
            inner: self.memory.channel(conn),
            state: Arc::clone(&self.state),
        })
    }

    async fn disconnect(&self, conn: Arc<MemoryConnection>) -> Result<()> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        self.state.check(FailPoint::Disconnect)?;
        self.memory.disconnect(conn).await
    }

    async fn ping(&self, conn: &Arc<MemoryConnection>, timeout: Duration) -> bool {
        !self.state.unreachable.load(Ordering::SeqCst) && self.memory.ping(conn, timeout).await
    }
}

struct MockProducer {
    inner: Arc<dyn ProducerImpl>,
    state: Arc<MockState>,
}

#[async_trait]
impl ProducerImpl for MockProducer {
    async fn publish(&self, message: Message) -> Result<()> {
        self.state.publishes.fetch_add(1, Ordering::SeqCst);
        self.state.check(FailPoint::Publish)?;
        self.inner.publish(message).await
    }
}

struct MockChannel {
    inner: Arc<dyn Channel>,
    state: Arc<MockState>,
}

#[async_trait]
impl Channel for MockChannel {
    async fn subscribe(&self, subject: &str) -> Result<MessageStream> {
        self.state.subscribes.fetch_add(1, Ordering::SeqCst);
        self.state.check_subject(FailPoint::Subscribe, subject)?;
        let stream = self.inner.subscribe(subject).await?;
        self.state.subscribed.lock().push(subject.to_string());
        Ok(stream)
    }

    async fn ack(&self, message: &Message) -> Result<()> {
        self.inner.ack(message).await
    }

    async fn nack(&self, message: &Message, requeue: bool) -> Result<()> {
        self.inner.nack(message, requeue).await
    }

    async fn unsubscribe(&self, subject: &str) -> Result<()> {
        self.state.check_subject(FailPoint::Unsubscribe, subject)?;
        self.inner.unsubscribe(subject).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_core::{Broker, BrokerOptions, Registrar, SubscriberOptions, handler_fn};

    fn quiet(transport: MockTransport) -> Broker<MockTransport> {
        Broker::with_options(transport, BrokerOptions::new().without_logger())
    }

    #[tokio::test]
    async fn test_connect_failure_is_a_transport_error() {
        let transport = MockTransport::new().failing(FailPoint::Connect);
        let broker = quiet(transport.clone());

        let err = broker.connect().await.unwrap_err();
        assert!(err.is_transport());
        assert!(!broker.is_connected().await);

        transport.recover(FailPoint::Connect);
        broker.connect().await.unwrap();
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_failure_aborts_start() {
        let transport = MockTransport::new().failing(FailPoint::Subscribe);
        let mut broker = quiet(transport.clone());
        broker
            .subscriber(
                SubscriberOptions::new("orders"),
                handler_fn(|_msg, _ctx| async { Ok(()) }),
            )
            .unwrap();

        let err = broker.start().await.unwrap_err();
        assert!(matches!(err, BrokerError::Startup { ref subscriber, .. } if subscriber == "orders"));
        assert!(!broker.is_running());
        assert_eq!(transport.subscribe_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_passes_through() {
        let transport = MockTransport::new();
        let broker = quiet(transport.clone());
        broker.connect().await.unwrap();

        transport.fail(FailPoint::Publish);
        let err = broker.publish(Message::new("orders", "x")).await.unwrap_err();
        assert!(err.is_transport());
        assert!(transport.memory().published().is_empty());
    }

    #[tokio::test]
    async fn test_ping_follows_reachability() {
        let transport = MockTransport::new();
        let broker = quiet(transport.clone());
        broker.connect().await.unwrap();

        assert!(broker.ping(Duration::from_millis(10)).await);
        transport.set_unreachable(true);
        assert!(!broker.ping(Duration::from_millis(10)).await);
    }

    fn noop() -> impl rivulet_core::MessageHandler {
        handler_fn(|_msg, _ctx| async { Ok(()) })
    }

    #[tokio::test]
    async fn test_failed_start_keeps_earlier_subscribers_running() {
        let transport = MockTransport::new();
        transport.fail_subscribe_on("payments");
        let mut broker = quiet(transport.clone());
        let orders = broker.subscriber(SubscriberOptions::new("orders"), noop()).unwrap();
        let payments = broker.subscriber(SubscriberOptions::new("payments"), noop()).unwrap();
        let refunds = broker.subscriber(SubscriberOptions::new("refunds"), noop()).unwrap();

        let err = broker.start().await.unwrap_err();
        assert!(matches!(err, BrokerError::Startup { ref subscriber, .. } if subscriber == "payments"));

        assert!(orders.is_running());
        assert!(!payments.is_running());
        assert!(!refunds.is_running());
        assert_eq!(transport.subscribed_subjects(), vec!["orders".to_string()]);
        assert_eq!(transport.subscribe_count(), 2);
        assert!(!broker.is_running());
    }

    #[tokio::test]
    async fn test_failed_close_stops_remaining_closes_and_keeps_connection() {
        let transport = MockTransport::new();
        transport.fail_unsubscribe_on("payments");
        let mut broker = quiet(transport.clone());
        let orders = broker.subscriber(SubscriberOptions::new("orders"), noop()).unwrap();
        let payments = broker.subscriber(SubscriberOptions::new("payments"), noop()).unwrap();
        let refunds = broker.subscriber(SubscriberOptions::new("refunds"), noop()).unwrap();
        broker.start().await.unwrap();
        assert!(broker.is_running());

        let err = broker.close().await.unwrap_err();
        assert!(err.is_transport());

        assert!(!orders.is_running());
        assert!(!payments.is_running());
        assert!(refunds.is_running());
        assert!(!broker.is_running());
        assert!(broker.is_connected().await);
        assert_eq!(transport.disconnect_count(), 0);

        transport.recover(FailPoint::Unsubscribe);
        broker.close().await.unwrap();
        assert!(!refunds.is_running());
        assert!(!broker.is_connected().await);
    }
}
