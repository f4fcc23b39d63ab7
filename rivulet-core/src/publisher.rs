//! Publishers: send messages to a fixed subject through the inherited
//! publish middlewares and the node's producer container.

use crate::config::ConfigNode;
use crate::endpoint::{
    Describable, EndpointCore, EndpointKind, EndpointSpec, EndpointState, Registrable, Runnable,
};
use crate::error::{BrokerError, Result};
use crate::message::Message;
use crate::middleware::{BoxFuture, BrokerMiddleware, HandlerFn, MiddlewareChain};
use crate::producer::ProducerContainer;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Declaration-time options of a publisher.
#[derive(Clone)]
pub struct PublisherOptions {
    pub subject: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub include_in_schema: bool,
    pub middlewares: Vec<Arc<dyn BrokerMiddleware>>,
}

impl PublisherOptions {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            title: None,
            description: None,
            include_in_schema: true,
            middlewares: Vec::new(),
        }
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

    pub fn middleware(mut self, middleware: Arc<dyn BrokerMiddleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() {
            return Err(BrokerError::Configuration(
                "publisher subject must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// A producing endpoint.
pub struct Publisher {
    options: PublisherOptions,
    core: EndpointCore,
}

impl Publisher {
    pub fn new(options: PublisherOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            core: EndpointCore::new(),
        })
    }

    pub fn options(&self) -> &PublisherOptions {
        &self.options
    }

    /// Destination with every inherited prefix applied.
    pub fn subject(&self) -> String {
        match self.core.config() {
            Some(config) => format!("{}{}", config.prefix, self.options.subject),
            None => self.options.subject.clone(),
        }
    }

    fn config(&self) -> Result<ConfigNode> {
        self.core.config().ok_or_else(|| {
            BrokerError::IncorrectState(format!(
                "publisher `{}` is not registered with a router or broker",
                self.options.subject
            ))
        })
    }

    /// The producer container this publisher sends through.
    ///
    /// The container keeps its identity across connect and disconnect.
    pub fn producer(&self) -> Result<Arc<ProducerContainer>> {
        Ok(self.config()?.producer)
    }

    /// Publish `message` to this publisher's subject.
    pub async fn publish(&self, mut message: Message) -> Result<()> {
        let config = self.config()?;
        message.subject = self.subject();

        let producer = Arc::clone(&config.producer);
        let terminal: HandlerFn = Arc::new(move |message: Message| {
            let producer = Arc::clone(&producer);
            Box::pin(async move { producer.publish(message).await }) as BoxFuture<Result<()>>
        });

        let middlewares = config
            .middlewares
            .iter()
            .chain(&self.options.middlewares)
            .cloned()
            .collect();
        MiddlewareChain::publish(middlewares)
            .apply(message, terminal)
            .await
    }

    /// Serialize `value` as JSON and publish it.
    pub async fn publish_json<T: Serialize + Sync>(&self, value: &T) -> Result<()> {
        let message = Message::json(self.options.subject.clone(), value)?;
        self.publish(message).await
    }
}

impl Registrable for Publisher {
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

impl Describable for Publisher {
    fn describe(&self) -> Option<EndpointSpec> {
        let config = self.core.config()?;
        if !self.options.include_in_schema || !config.include_in_schema.is_visible() {
            return None;
        }
        let subject = self.subject();
        Some(EndpointSpec {
            kind: EndpointKind::Publisher,
            name: subject.clone(),
            subject,
            title: self.options.title.clone(),
            description: self.options.description.clone(),
        })
    }
}

#[async_trait]
impl Runnable for Publisher {
    async fn start(&self) -> Result<()> {
        self.config()?;
        self.core.set_state(EndpointState::Started);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.core.state() == EndpointState::Started {
            self.core.set_state(EndpointState::Closed);
        }
        Ok(())
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("subject", &self.subject())
            .field("lifecycle", &self.core.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Next;
    use crate::transport::ProducerImpl;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Sink {
        sent: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl ProducerImpl for Sink {
        async fn publish(&self, message: Message) -> Result<()> {
            self.sent.lock().push(message);
            Ok(())
        }
    }

    struct Stamp;

    #[async_trait]
    impl BrokerMiddleware for Stamp {
        async fn on_publish(&self, message: Message, next: Next) -> Result<()> {
            next(message.with_header("stamped", "yes")).await
        }
    }

    #[tokio::test]
    async fn test_unregistered_publisher_fails_fast() {
        let publisher = Publisher::new(PublisherOptions::new("orders")).unwrap();
        let err = publisher
            .publish(Message::new("orders", "x"))
            .await
            .unwrap_err();
        assert!(err.is_incorrect_state());
        assert!(publisher.producer().is_err());
    }

    #[test]
    fn test_empty_subject_rejected() {
        assert!(
            Publisher::new(PublisherOptions::new(""))
                .unwrap_err()
                .is_configuration()
        );
    }

    #[tokio::test]
    async fn test_publish_applies_prefix_and_middlewares() {
        let config = ConfigNode::new()
            .prefix("shop.")
            .middleware(Arc::new(Stamp));
        let publisher = Publisher::new(PublisherOptions::new("orders")).unwrap();
        publisher.register(&config);

        let sink = Arc::new(Sink::default());
        config.producer.connect(sink.clone());
        publisher
            .publish_json(&serde_json::json!({"id": 1}))
            .await
            .unwrap();

        let sent = sink.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "shop.orders");
        assert_eq!(sent[0].headers["stamped"], "yes");
    }

    #[tokio::test]
    async fn test_captured_producer_survives_connect() {
        let config = ConfigNode::new();
        let publisher = Publisher::new(PublisherOptions::new("orders")).unwrap();
        publisher.register(&config);
        let captured = publisher.producer().unwrap();

        assert!(publisher.publish(Message::new("", "x")).await.is_err());

        let sink = Arc::new(Sink::default());
        config.producer.connect(sink.clone());
        captured.publish(Message::new("orders", "x")).await.unwrap();

        assert!(Arc::ptr_eq(&captured, &config.producer));
        assert_eq!(sink.sent.lock().len(), 1);
    }
}
