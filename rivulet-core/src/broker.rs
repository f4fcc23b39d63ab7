//! The root hierarchy node and owner of the transport connection.
//!
//! A [`Broker`] installs real DI and logger state at construction, so every
//! router included into it (at any depth) becomes attached. `connect()`
//! performs the transport handshake once and swaps the shared producer
//! container to live; `start()` and `close()` drive every subscriber.
//!
//! ```
//! use rivulet_core::{Broker, MemoryTransport, Message, Registrar, SubscriberOptions, handler_fn};
//!
//! # tokio_test::block_on(async {
//! let mut broker = Broker::new(MemoryTransport::new());
//! broker
//!     .subscriber(
//!         SubscriberOptions::new("orders"),
//!         handler_fn(|_msg, _ctx| async { Ok(()) }),
//!     )
//!     .unwrap();
//!
//! broker.start().await.unwrap();
//! broker.publish(Message::new("orders", "hello")).await.unwrap();
//! broker.close().await.unwrap();
//! # });
//! ```

use crate::config::{ConfigNode, Visibility};
use crate::di::{Container, ContextRepo, DiState};
use crate::endpoint::{Describable, EndpointSpec, Runnable};
use crate::error::{BrokerError, Result};
use crate::message::Message;
use crate::middleware::{BoxFuture, HandlerFn, MiddlewareChain};
use crate::pointer::Pointer;
use crate::producer::ProducerContainer;
use crate::registry::{Registrar, Registry};
use crate::state::BrokerState;
use crate::transport::Transport;
use rivulet_log::{BrokerLogger, Level, LoggerState, TracingLogger};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Broker construction options.
#[derive(Clone)]
pub struct BrokerOptions {
    /// Prefix applied to every endpoint.
    pub prefix: String,
    /// Bound on each subscriber's close.
    pub graceful_timeout: Option<Duration>,
    pub include_in_schema: Visibility,
    /// Free-form description for schema readers.
    pub description: Option<String>,
    /// Values added to every message's DI context.
    pub extra_context: BTreeMap<String, Value>,
    pub log_level: Level,
    /// Sink for broker log events; `None` disables broker logging.
    pub logger: Option<Arc<dyn BrokerLogger>>,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            graceful_timeout: None,
            include_in_schema: Visibility::Unset,
            description: None,
            extra_context: BTreeMap::new(),
            log_level: Level::Info,
            logger: Some(Arc::new(TracingLogger)),
        }
    }
}

impl BrokerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn graceful_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_timeout = Some(timeout);
        self
    }

    pub fn include_in_schema(mut self, visibility: impl Into<Visibility>) -> Self {
        self.include_in_schema = visibility.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn extra_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_context.insert(key.into(), value.into());
        self
    }

    pub fn log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn BrokerLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn without_logger(mut self) -> Self {
        self.logger = None;
        self
    }

    fn logger_state(&self) -> LoggerState {
        match &self.logger {
            Some(logger) => LoggerState::new(Arc::clone(logger), self.log_level),
            None => LoggerState::disabled(),
        }
    }
}

impl fmt::Debug for BrokerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerOptions")
            .field("prefix", &self.prefix)
            .field("graceful_timeout", &self.graceful_timeout)
            .field("include_in_schema", &self.include_in_schema)
            .field("description", &self.description)
            .field("extra_context", &self.extra_context)
            .field("log_level", &self.log_level)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// Schema reader view of a broker.
#[derive(Debug, Clone, Serialize)]
pub struct BrokerDescription {
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub endpoints: Vec<EndpointSpec>,
}

/// Root hierarchy node bound to a transport.
pub struct Broker<T: Transport> {
    registry: Registry,
    transport: Arc<T>,
    connection: Mutex<Option<Arc<T::Connection>>>,
    running: AtomicBool,
    options: BrokerOptions,
}

impl<T: Transport> Broker<T> {
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, BrokerOptions::default())
    }

    pub fn with_options(transport: T, options: BrokerOptions) -> Self {
        let state = BrokerState::attached(DiState::new(), options.logger_state());
        let mut config =
            ConfigNode::with_shared(Arc::new(ProducerContainer::new()), Pointer::new(state))
                .prefix(options.prefix.clone())
                .include_in_schema(options.include_in_schema);
        config.graceful_timeout = options.graceful_timeout;
        config.extra_context = options.extra_context.clone();

        Self {
            registry: Registry::new(config),
            transport: Arc::new(transport),
            connection: Mutex::new(None),
            running: AtomicBool::new(false),
            options,
        }
    }

    pub fn options(&self) -> &BrokerOptions {
        &self.options
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> Arc<BrokerState> {
        self.registry.config().state.get()
    }

    /// Global DI context.
    pub fn context(&self) -> Result<ContextRepo> {
        Ok(self.state().di()?.context.clone())
    }

    /// DI provider registry.
    pub fn provider(&self) -> Result<Container> {
        Ok(self.state().di()?.provider.clone())
    }

    /// The producer container shared by every publisher of this broker.
    pub fn producer(&self) -> Arc<ProducerContainer> {
        Arc::clone(&self.registry.config().producer)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Connect to the transport, or return the open connection.
    pub async fn connect(&self) -> Result<Arc<T::Connection>> {
        let mut connection = self.connection.lock().await;
        if let Some(conn) = connection.as_ref() {
            return Ok(Arc::clone(conn));
        }

        info!(protocol = self.transport.protocol(), "Connecting broker");
        let conn = self.transport.connect().await?;

        self.producer().connect(self.transport.producer(&conn));
        self.state().mark_connected(self.transport.channel(&conn))?;

        *connection = Some(Arc::clone(&conn));
        debug!(protocol = self.transport.protocol(), "Broker connected");
        Ok(conn)
    }

    /// Register every subscriber's log context. Runs once per broker.
    pub fn setup(&self) -> Result<()> {
        let state = self.state();
        let logger = state.logger()?;
        if logger.setup() {
            for subscriber in self.registry.subscribers() {
                let context = subscriber.log_context(None).without("message_id");
                logger.params().register_subscriber(&context);
            }
        }
        Ok(())
    }

    /// Connect, set up logging and start every endpoint.
    ///
    /// A subscriber that fails to start aborts the remaining starts. Already
    /// started subscribers keep running until [`Broker::close`].
    pub async fn start(&self) -> Result<()> {
        self.connect().await?;
        self.setup()?;

        let state = self.state();
        let logger = state.logger()?;
        for subscriber in self.registry.subscribers() {
            let context = subscriber.log_context(None).without("message_id");
            logger.log(
                Level::Info,
                &format!("`{}` waiting for messages", subscriber.call_name()),
                &context,
            );
            subscriber
                .start()
                .await
                .map_err(|e| BrokerError::startup(subscriber.call_name(), e))?;
        }
        for publisher in self.registry.publishers() {
            publisher.start().await?;
        }

        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Close every endpoint in registration order, then disconnect.
    ///
    /// The first failing close aborts the rest and is returned; the
    /// connection is kept open in that case.
    pub async fn close(&self) -> Result<()> {
        let closed = self.close_endpoints().await;
        self.running.store(false, Ordering::SeqCst);
        closed?;

        let connection = self.connection.lock().await.take();
        if let Some(conn) = connection {
            self.producer().disconnect();
            self.state().detach_channel();
            self.transport.disconnect(conn).await?;
            info!(protocol = self.transport.protocol(), "Broker disconnected");
        }
        Ok(())
    }

    async fn close_endpoints(&self) -> Result<()> {
        for subscriber in self.registry.subscribers() {
            subscriber.close().await?;
        }
        for publisher in self.registry.publishers() {
            publisher.close().await?;
        }
        Ok(())
    }

    /// Transport health check; `false` when not connected.
    pub async fn ping(&self, timeout: Duration) -> bool {
        let connection = self.connection.lock().await.clone();
        match connection {
            Some(conn) => self.transport.ping(&conn, timeout).await,
            None => false,
        }
    }

    /// Publish through the broker's publish middlewares.
    ///
    /// The broker prefix is prepended to the message subject.
    pub async fn publish(&self, mut message: Message) -> Result<()> {
        let config = self.registry.config();
        message.subject = format!("{}{}", config.prefix, message.subject);

        let producer = self.producer();
        let terminal: HandlerFn = Arc::new(move |message: Message| {
            let producer = Arc::clone(&producer);
            Box::pin(async move { producer.publish(message).await }) as BoxFuture<Result<()>>
        });

        MiddlewareChain::publish(config.middlewares.clone())
            .apply(message, terminal)
            .await
    }

    /// Visible endpoints, subscribers first.
    pub fn describe(&self) -> BrokerDescription {
        let endpoints = self
            .registry
            .subscribers()
            .iter()
            .filter_map(|subscriber| subscriber.describe())
            .chain(
                self.registry
                    .publishers()
                    .iter()
                    .filter_map(|publisher| publisher.describe()),
            )
            .collect();

        BrokerDescription {
            protocol: self.transport.protocol().to_string(),
            description: self.options.description.clone(),
            endpoints,
        }
    }

    /// Start, wait for `shutdown`, then close.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        info!(protocol = self.transport.protocol(), "Broker running");
        shutdown.await;
        info!("Shutdown signal received, closing broker");
        self.close().await
    }
}

impl<T: Transport> Registrar for Broker<T> {
    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }
}

impl<T: Transport> fmt::Debug for Broker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("protocol", &self.transport.protocol())
            .field("options", &self.options)
            .field("subscribers", &self.registry.subscribers().len())
            .field("publishers", &self.registry.publishers().len())
            .field("running", &self.is_running())
            .finish()
    }
}
