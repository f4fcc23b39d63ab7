//! Endpoint lists and the include protocol shared by routers and brokers.

use crate::config::{ConfigNode, Visibility};
use crate::error::Result;
use crate::endpoint::Registrable;
use crate::handler::{Dependency, MessageHandler};
use crate::middleware::BrokerMiddleware;
use crate::publisher::{Publisher, PublisherOptions};
use crate::router::Router;
use crate::subscriber::{Subscriber, SubscriberOptions};
use std::sync::Arc;
use tracing::debug;

/// Overrides applied when including a router.
#[derive(Clone, Default)]
pub struct IncludeOptions {
    pub prefix: String,
    pub dependencies: Vec<Arc<dyn Dependency>>,
    pub middlewares: Vec<Arc<dyn BrokerMiddleware>>,
    pub include_in_schema: Visibility,
}

impl IncludeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn dependency(mut self, dependency: Arc<dyn Dependency>) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn BrokerMiddleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn include_in_schema(mut self, visibility: impl Into<Visibility>) -> Self {
        self.include_in_schema = visibility.into();
        self
    }

    fn delta(&self) -> ConfigNode {
        ConfigNode::new()
            .prefix(self.prefix.clone())
            .include_in_schema(self.include_in_schema)
            .middlewares(self.middlewares.iter().cloned())
            .dependencies(self.dependencies.iter().cloned())
    }
}

/// Local config plus the flattened endpoint lists of one hierarchy node.
#[derive(Debug)]
pub struct Registry {
    config: ConfigNode,
    subscribers: Vec<Arc<Subscriber>>,
    publishers: Vec<Arc<Publisher>>,
}

impl Registry {
    pub fn new(config: ConfigNode) -> Self {
        Self {
            config,
            subscribers: Vec::new(),
            publishers: Vec::new(),
        }
    }

    pub fn config(&self) -> &ConfigNode {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigNode {
        &mut self.config
    }

    pub fn subscribers(&self) -> &[Arc<Subscriber>] {
        &self.subscribers
    }

    pub fn publishers(&self) -> &[Arc<Publisher>] {
        &self.publishers
    }

    /// Register `subscriber` with the local config and list it.
    pub fn add_subscriber(&mut self, subscriber: Arc<Subscriber>) -> Arc<Subscriber> {
        subscriber.register(&self.config);
        push_unique(&mut self.subscribers, Arc::clone(&subscriber));
        subscriber
    }

    pub fn add_publisher(&mut self, publisher: Arc<Publisher>) -> Arc<Publisher> {
        publisher.register(&self.config);
        push_unique(&mut self.publishers, Arc::clone(&publisher));
        publisher
    }

    /// Mount `child`'s endpoints under this node.
    pub fn include(&mut self, child: &Registry, options: &IncludeOptions) {
        let state = self.config.state.get();
        if !Arc::ptr_eq(&child.config.state.get(), &state) {
            child.config.state.set(state);
        }

        let merged = self.config.merge(&options.delta());
        for subscriber in &child.subscribers {
            subscriber.register(&merged);
            push_unique(&mut self.subscribers, Arc::clone(subscriber));
        }
        for publisher in &child.publishers {
            publisher.register(&merged);
            push_unique(&mut self.publishers, Arc::clone(publisher));
        }

        debug!(
            prefix = %merged.prefix,
            subscribers = child.subscribers.len(),
            publishers = child.publishers.len(),
            "Router included"
        );
    }
}

fn push_unique<T>(list: &mut Vec<Arc<T>>, item: Arc<T>) {
    if !list.iter().any(|existing| Arc::ptr_eq(existing, &item)) {
        list.push(item);
    }
}

/// Declaration and include operations of a hierarchy node.
///
/// Setup takes `&mut self`, so a node is configured by one writer before it
/// is shared.
pub trait Registrar {
    fn registry(&self) -> &Registry;

    fn registry_mut(&mut self) -> &mut Registry;

    /// Local config of this node.
    fn config(&self) -> &ConfigNode {
        self.registry().config()
    }

    fn subscribers(&self) -> &[Arc<Subscriber>] {
        self.registry().subscribers()
    }

    fn publishers(&self) -> &[Arc<Publisher>] {
        self.registry().publishers()
    }

    /// Declare a subscriber; it is registered with this node's config.
    fn subscriber<H>(&mut self, options: SubscriberOptions, handler: H) -> Result<Arc<Subscriber>>
    where
        H: MessageHandler + 'static,
    {
        let subscriber = Subscriber::new(options, Arc::new(handler))?;
        Ok(self.registry_mut().add_subscriber(Arc::new(subscriber)))
    }

    /// Declare a publisher; it is registered with this node's config.
    fn publisher(&mut self, options: PublisherOptions) -> Result<Arc<Publisher>> {
        let publisher = Publisher::new(options)?;
        Ok(self.registry_mut().add_publisher(Arc::new(publisher)))
    }

    fn include_router(&mut self, router: &Router) {
        self.include_router_with(router, IncludeOptions::default());
    }

    fn include_router_with(&mut self, router: &Router, options: IncludeOptions) {
        self.registry_mut().include(router.registry(), &options);
    }

    /// Include each router in argument order.
    fn include_routers<'a, I>(&mut self, routers: I)
    where
        I: IntoIterator<Item = &'a Router>,
    {
        for router in routers {
            self.include_router(router);
        }
    }

    /// Append a middleware for endpoints declared or included from now on.
    fn add_middleware(&mut self, middleware: Arc<dyn BrokerMiddleware>) {
        self.registry_mut().config_mut().add_middleware(middleware);
    }
}
