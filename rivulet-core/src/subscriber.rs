//! Subscribers: consume a subject and feed each message through the
//! parser, decoder, dependencies and middlewares into a handler.

use crate::config::ConfigNode;
use crate::di::ContextRepo;
use crate::endpoint::{
    Describable, EndpointCore, EndpointKind, EndpointSpec, EndpointState, Registrable, Runnable,
};
use crate::error::{BrokerError, Result};
use crate::handler::{Dependency, MessageHandler, default_decode};
use crate::message::Message;
use crate::middleware::{BoxFuture, BrokerMiddleware, HandlerFn, MiddlewareChain};
use crate::state::BrokerState;
use crate::transport::MessageStream;
use async_trait::async_trait;
use futures_util::{FutureExt, StreamExt};
use parking_lot::Mutex;
use rivulet_log::{Level, LogContext};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};

/// When consumed messages are acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// Ack after the handler succeeds, nack after it fails.
    #[default]
    Auto,
    /// The handler acks through [`Subscriber::ack`].
    Manual,
}

/// Declaration-time options of a subscriber.
#[derive(Clone)]
pub struct SubscriberOptions {
    pub subject: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub include_in_schema: bool,
    pub max_workers: usize,
    pub ack_policy: AckPolicy,
    pub middlewares: Vec<Arc<dyn BrokerMiddleware>>,
    pub dependencies: Vec<Arc<dyn Dependency>>,
}

impl SubscriberOptions {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            name: None,
            title: None,
            description: None,
            include_in_schema: true,
            max_workers: 1,
            ack_policy: AckPolicy::Auto,
            middlewares: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Name used in logs. Defaults to the full subject.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn include_in_schema(mut self, include: bool) -> Self {
        self.include_in_schema = include;
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn ack_policy(mut self, policy: AckPolicy) -> Self {
        self.ack_policy = policy;
        self
    }

    /// Middleware running inside every middleware inherited from routers.
    pub fn middleware(mut self, middleware: Arc<dyn BrokerMiddleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn dependency(mut self, dependency: Arc<dyn Dependency>) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Reject option combinations no transport can honour.
    pub fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() {
            return Err(BrokerError::Configuration(
                "subscriber subject must not be empty".into(),
            ));
        }
        if self.max_workers == 0 {
            return Err(BrokerError::Configuration(format!(
                "subscriber `{}` needs at least one worker",
                self.subject
            )));
        }
        if self.max_workers > 1 && self.ack_policy == AckPolicy::Manual {
            return Err(BrokerError::Configuration(format!(
                "subscriber `{}`: max workers do not work with manual ack",
                self.subject
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for SubscriberOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberOptions")
            .field("subject", &self.subject)
            .field("name", &self.name)
            .field("include_in_schema", &self.include_in_schema)
            .field("max_workers", &self.max_workers)
            .field("ack_policy", &self.ack_policy)
            .field("middlewares", &self.middlewares.len())
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}

struct ConsumeTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// A consumer endpoint.
pub struct Subscriber {
    options: SubscriberOptions,
    handler: Arc<dyn MessageHandler>,
    core: EndpointCore,
    task: Mutex<Option<ConsumeTask>>,
}

impl Subscriber {
    /// Build an unregistered subscriber, validating `options`.
    pub fn new(options: SubscriberOptions, handler: Arc<dyn MessageHandler>) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            handler,
            core: EndpointCore::new(),
            task: Mutex::new(None),
        })
    }

    pub fn options(&self) -> &SubscriberOptions {
        &self.options
    }

    /// Subject with every inherited prefix applied.
    pub fn subject(&self) -> String {
        match self.core.config() {
            Some(config) => format!("{}{}", config.prefix, self.options.subject),
            None => self.options.subject.clone(),
        }
    }

    pub fn call_name(&self) -> String {
        self.options.name.clone().unwrap_or_else(|| self.subject())
    }

    /// Log context of this subscriber, with the id of `message` when given.
    pub fn log_context(&self, message: Option<&Message>) -> LogContext {
        LogContext::new()
            .with("subject", self.subject())
            .with("message_id", message.map(|m| m.id.as_str()).unwrap_or(""))
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    fn config(&self) -> Result<ConfigNode> {
        self.core.config().ok_or_else(|| {
            BrokerError::IncorrectState(format!(
                "subscriber `{}` is not registered with a router or broker",
                self.options.subject
            ))
        })
    }

    fn pipeline(&self) -> Result<Pipeline> {
        let config = self.config()?;
        let state = config.state.get();
        let middlewares = config
            .middlewares
            .iter()
            .chain(&self.options.middlewares)
            .cloned()
            .collect();
        let dependencies = config
            .dependencies
            .iter()
            .chain(&self.options.dependencies)
            .cloned()
            .collect();

        Ok(Pipeline {
            subject: self.subject(),
            call_name: self.call_name(),
            middlewares,
            dependencies,
            handler: Arc::clone(&self.handler),
            ack_policy: self.options.ack_policy,
            config,
            state,
        })
    }

    /// Run one message through the full consume pipeline.
    pub async fn consume(&self, message: Message) -> Result<()> {
        self.pipeline()?.process(message).await
    }

    /// Acknowledge a message consumed under [`AckPolicy::Manual`].
    pub async fn ack(&self, message: &Message) -> Result<()> {
        self.config()?.state.get().channel()?.ack(message).await
    }

    pub async fn nack(&self, message: &Message, requeue: bool) -> Result<()> {
        self.config()?
            .state
            .get()
            .channel()?
            .nack(message, requeue)
            .await
    }

    fn log(&self, level: Level, message: &str) {
        if let Some(config) = self.core.config() {
            if let Ok(logger) = config.state.get().logger() {
                logger.log(level, message, &self.log_context(None));
            }
        }
    }
}

impl Registrable for Subscriber {
    fn register(&self, outer: &ConfigNode) {
        self.core.register(outer);
    }

    fn outer_config(&self) -> Option<ConfigNode> {
        self.core.config()
    }

    fn lifecycle(&self) -> EndpointState {
        self.core.state()
    }
}

impl Describable for Subscriber {
    fn describe(&self) -> Option<EndpointSpec> {
        let config = self.core.config()?;
        if !self.options.include_in_schema || !config.include_in_schema.is_visible() {
            return None;
        }
        Some(EndpointSpec {
            kind: EndpointKind::Subscriber,
            name: self.call_name(),
            subject: self.subject(),
            title: self.options.title.clone(),
            description: self.options.description.clone(),
        })
    }
}

#[async_trait]
impl Runnable for Subscriber {
    async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let pipeline = Arc::new(self.pipeline()?);
        let channel = pipeline.state.channel()?;
        let stream = channel.subscribe(&pipeline.subject).await?;

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(consume_loop(
            pipeline,
            stream,
            stop_rx,
            self.options.max_workers,
        ));

        *self.task.lock() = Some(ConsumeTask { stop, handle });
        self.core.set_state(EndpointState::Started);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let task = self.task.lock().take();
        let Some(ConsumeTask { stop, mut handle }) = task else {
            if self.core.state() == EndpointState::Started {
                self.core.set_state(EndpointState::Closed);
            }
            return Ok(());
        };

        let _ = stop.send(true);
        let timeout = self.core.config().and_then(|config| config.graceful_timeout);

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    self.log(
                        Level::Warn,
                        &format!("`{}` did not stop within {:?}, aborting", self.call_name(), limit),
                    );
                    handle.abort();
                    Ok(())
                }
            },
            None => {
                handle.abort();
                handle.await
            }
        };
        self.core.set_state(EndpointState::Closed);

        match joined {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                return Err(BrokerError::Internal(format!(
                    "consumer task of `{}` failed: {}",
                    self.call_name(),
                    e
                )));
            }
        }

        // Not connected: the transport already dropped the subscription.
        let channel = self
            .core
            .config()
            .and_then(|config| config.state.get().channel().ok());
        match channel {
            Some(channel) => channel.unsubscribe(&self.subject()).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("subject", &self.subject())
            .field("lifecycle", &self.core.state())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Snapshot of everything one message needs on its way to the handler.
struct Pipeline {
    subject: String,
    call_name: String,
    config: ConfigNode,
    middlewares: Vec<Arc<dyn BrokerMiddleware>>,
    dependencies: Vec<Arc<dyn Dependency>>,
    handler: Arc<dyn MessageHandler>,
    ack_policy: AckPolicy,
    state: Arc<BrokerState>,
}

impl Pipeline {
    async fn process(&self, message: Message) -> Result<()> {
        let delivered = (self.ack_policy == AckPolicy::Auto).then(|| message.clone());
        let result = match AssertUnwindSafe(self.run(message)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(BrokerError::Handler(format!(
                "handler panicked: {}",
                panic_reason(panic.as_ref())
            ))),
        };

        if let Some(delivered) = delivered {
            // Not connected: nothing to acknowledge against.
            if let Ok(channel) = self.state.channel() {
                match &result {
                    Ok(()) => channel.ack(&delivered).await?,
                    Err(_) => channel.nack(&delivered, false).await?,
                }
            }
        }
        result
    }

    async fn run(&self, message: Message) -> Result<()> {
        let mut message = match &self.config.parser {
            Some(parser) => parser(message)?,
            None => message,
        };
        message.decoded = match &self.config.decoder {
            Some(decoder) => Some(decoder(&message)?),
            None => default_decode(&message)?,
        };

        let mut context = self.state.di()?.context.scope(&self.config.extra_context);
        for dependency in &self.dependencies {
            if let Some(value) = dependency.resolve(&message, &context).await? {
                context.set_local(dependency.name(), value);
            }
        }

        let handler = Arc::clone(&self.handler);
        let terminal: HandlerFn = Arc::new(move |message: Message| {
            let handler = Arc::clone(&handler);
            let context: ContextRepo = context.clone();
            Box::pin(async move { handler.handle(message, context).await }) as BoxFuture<Result<()>>
        });

        MiddlewareChain::consume(self.middlewares.clone())
            .apply(message, terminal)
            .await
    }

    /// Process a message, logging instead of propagating failures.
    async fn handle(&self, message: Message) {
        let context = LogContext::new()
            .with("subject", self.subject.as_str())
            .with("message_id", message.id.as_str());

        if let Err(e) = self.process(message).await {
            if let Ok(logger) = self.state.logger() {
                logger.log(
                    Level::Error,
                    &format!("`{}` failed to handle message: {}", self.call_name, e),
                    &context,
                );
            }
        }
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

async fn consume_loop(
    pipeline: Arc<Pipeline>,
    mut stream: MessageStream,
    mut stop: watch::Receiver<bool>,
    max_workers: usize,
) {
    let permits = Arc::new(Semaphore::new(max_workers));
    let mut workers = JoinSet::new();

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            next = stream.next() => match next {
                Some(Ok(message)) if max_workers == 1 => pipeline.handle(message).await,
                Some(Ok(message)) => {
                    let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                        break;
                    };
                    let pipeline = Arc::clone(&pipeline);
                    workers.spawn(async move {
                        pipeline.handle(message).await;
                        drop(permit);
                    });
                }
                Some(Err(e)) => {
                    if let Ok(logger) = pipeline.state.logger() {
                        logger.log(
                            Level::Error,
                            &format!("`{}` stream error: {}", pipeline.call_name, e),
                            &LogContext::new().with("subject", pipeline.subject.as_str()),
                        );
                    }
                }
                None => break,
            },
        }
        while workers.try_join_next().is_some() {}
    }

    while workers.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::DiState;
    use crate::handler::{FnDependency, handler_fn};
    use crate::middleware::Next;
    use crate::pointer::Pointer;
    use rivulet_log::LoggerState;
    use serde_json::json;

    fn noop() -> Arc<dyn MessageHandler> {
        Arc::new(handler_fn(|_msg: Message, _ctx: ContextRepo| async { Ok(()) }))
    }

    fn attached_config() -> ConfigNode {
        let state = BrokerState::attached(DiState::new(), LoggerState::disabled());
        ConfigNode {
            state: Pointer::new(state),
            ..ConfigNode::new()
        }
    }

    #[test]
    fn test_validation_rejects_bad_options() {
        let empty = SubscriberOptions::new("  ");
        assert!(Subscriber::new(empty, noop()).unwrap_err().is_configuration());

        let zero = SubscriberOptions::new("orders").max_workers(0);
        assert!(Subscriber::new(zero, noop()).unwrap_err().is_configuration());

        let manual = SubscriberOptions::new("orders")
            .max_workers(4)
            .ack_policy(AckPolicy::Manual);
        let err = Subscriber::new(manual, noop()).unwrap_err();
        assert!(err.to_string().contains("manual ack"));

        let ok = SubscriberOptions::new("orders")
            .max_workers(4)
            .ack_policy(AckPolicy::Auto);
        assert!(Subscriber::new(ok, noop()).is_ok());
    }

    #[tokio::test]
    async fn test_unregistered_subscriber_fails_fast() {
        let sub = Subscriber::new(SubscriberOptions::new("orders"), noop()).unwrap();
        assert_eq!(sub.lifecycle(), EndpointState::Declared);

        let err = sub.consume(Message::new("orders", "x")).await.unwrap_err();
        assert!(err.is_incorrect_state());
        assert!(sub.start().await.unwrap_err().is_incorrect_state());
        assert!(sub.describe().is_none());
    }

    #[tokio::test]
    async fn test_unattached_subscriber_fails_on_context() {
        let sub = Subscriber::new(SubscriberOptions::new("orders"), noop()).unwrap();
        sub.register(&ConfigNode::new());

        let err = sub.consume(Message::new("orders", "x")).await.unwrap_err();
        assert!(err.is_incorrect_state());
    }

    #[tokio::test]
    async fn test_pipeline_order() {
        struct Stage(Arc<Mutex<Vec<String>>>);

        #[async_trait]
        impl BrokerMiddleware for Stage {
            async fn on_consume(&self, message: Message, next: Next) -> Result<()> {
                self.0.lock().push("middleware".into());
                next(message).await
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let parse_log = log.clone();
        let dep_log = log.clone();
        let handler_log = log.clone();

        let config = attached_config()
            .parser(Arc::new(move |msg: Message| -> Result<Message> {
                parse_log.lock().push("parser".into());
                Ok(msg)
            }))
            .decoder(Arc::new(|msg: &Message| -> Result<serde_json::Value> {
                Ok(json!(msg.payload.len()))
            }))
            .extra_context("tenant", "acme");

        let options = SubscriberOptions::new("orders")
            .middleware(Arc::new(Stage(log.clone())))
            .dependency(Arc::new(FnDependency::new(
                "user",
                move |_msg: &Message, _ctx: &ContextRepo| {
                    dep_log.lock().push("dependency".into());
                    Ok(Some(json!("alice")))
                },
            )));
        let handler = handler_fn(move |msg: Message, ctx: ContextRepo| {
            let log = handler_log.clone();
            async move {
                assert_eq!(msg.decoded, Some(json!(5)));
                assert_eq!(ctx.get("user"), Some(json!("alice")));
                assert_eq!(ctx.get("tenant"), Some(json!("acme")));
                log.lock().push("handler".into());
                Ok(())
            }
        });

        let sub = Subscriber::new(options, Arc::new(handler)).unwrap();
        sub.register(&config);
        sub.consume(Message::new("orders", "hello")).await.unwrap();

        assert_eq!(
            log.lock().as_slice(),
            ["parser", "dependency", "middleware", "handler"]
        );
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_handler_error() {
        let handler = handler_fn(|msg: Message, _ctx: ContextRepo| async move {
            if msg.payload == b"x" {
                panic!("bad payload");
            }
            Ok(())
        });
        let sub = Subscriber::new(SubscriberOptions::new("orders"), Arc::new(handler)).unwrap();
        sub.register(&attached_config());

        let err = sub.consume(Message::new("orders", "x")).await.unwrap_err();
        assert!(matches!(&err, BrokerError::Handler(reason) if reason.contains("bad payload")));
    }

    #[test]
    fn test_log_context_and_describe() {
        let sub = Subscriber::new(
            SubscriberOptions::new("created").title("Order created"),
            noop(),
        )
        .unwrap();
        sub.register(&attached_config().prefix("orders."));

        let msg = Message::new("orders.created", "x");
        let ctx = sub.log_context(Some(&msg));
        assert_eq!(ctx.get("subject"), Some("orders.created"));
        assert_eq!(ctx.get("message_id"), Some(msg.id.as_str()));
        assert_eq!(sub.call_name(), "orders.created");

        let spec = sub.describe().unwrap();
        assert_eq!(spec.kind, EndpointKind::Subscriber);
        assert_eq!(spec.title.as_deref(), Some("Order created"));

        let hidden = Subscriber::new(
            SubscriberOptions::new("internal").include_in_schema(false),
            noop(),
        )
        .unwrap();
        hidden.register(&attached_config());
        assert!(hidden.describe().is_none());
    }
}
