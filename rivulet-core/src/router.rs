//! Routers group endpoints under shared configuration.
//!
//! A router is a non-root hierarchy node. It can be built, populated and
//! nested before any broker exists; including it into a broker (directly or
//! through other routers) re-merges every endpoint's config and attaches the
//! broker's state.
//!
//! ```
//! use rivulet_core::{IncludeOptions, Registrar, Router, SubscriberOptions, handler_fn};
//!
//! let mut orders = Router::new().prefix("orders.");
//! orders
//!     .subscriber(
//!         SubscriberOptions::new("created"),
//!         handler_fn(|_msg, _ctx| async { Ok(()) }),
//!     )
//!     .unwrap();
//!
//! let mut api = Router::new().prefix("v1.");
//! api.include_router_with(&orders, IncludeOptions::new().prefix("eu."));
//!
//! assert_eq!(api.subscribers()[0].subject(), "v1.eu.orders.created");
//! ```

use crate::config::{ConfigNode, Visibility};
use crate::handler::{DecoderFn, Dependency, ParserFn};
use crate::middleware::BrokerMiddleware;
use crate::pointer::Pointer;
use crate::producer::ProducerContainer;
use crate::registry::{Registrar, Registry};
use crate::state::BrokerState;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Non-root hierarchy node.
///
/// Builder methods change the local config; they apply to endpoints
/// declared afterwards.
#[derive(Debug)]
pub struct Router {
    registry: Registry,
}

impl Router {
    pub fn new() -> Self {
        let state = Pointer::new(BrokerState::empty("router is not attached to a broker"));
        let config = ConfigNode::with_shared(Arc::new(ProducerContainer::new()), state);
        Self {
            registry: Registry::new(config),
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.registry.config_mut().prefix = prefix.into();
        self
    }

    pub fn include_in_schema(mut self, visibility: impl Into<Visibility>) -> Self {
        self.registry.config_mut().include_in_schema = visibility.into();
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn BrokerMiddleware>) -> Self {
        self.registry.config_mut().add_middleware(middleware);
        self
    }

    pub fn dependency(mut self, dependency: Arc<dyn Dependency>) -> Self {
        self.registry.config_mut().dependencies.push(dependency);
        self
    }

    pub fn parser(mut self, parser: ParserFn) -> Self {
        self.registry.config_mut().parser = Some(parser);
        self
    }

    pub fn decoder(mut self, decoder: DecoderFn) -> Self {
        self.registry.config_mut().decoder = Some(decoder);
        self
    }

    /// Only effective on the outermost node of an include chain.
    pub fn graceful_timeout(mut self, timeout: Duration) -> Self {
        self.registry.config_mut().graceful_timeout = Some(timeout);
        self
    }

    pub fn extra_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.registry
            .config_mut()
            .extra_context
            .insert(key.into(), value.into());
        self
    }

    /// State currently installed in this router's pointer.
    pub fn state(&self) -> Arc<BrokerState> {
        self.registry.config().state.get()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Registrar for Router {
    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::ContextRepo;
    use crate::endpoint::Registrable;
    use crate::handler::handler_fn;
    use crate::message::Message;
    use crate::registry::IncludeOptions;
    use crate::subscriber::SubscriberOptions;
    use crate::Result;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl BrokerMiddleware for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn declare(router: &mut Router, subject: &str) -> Arc<crate::Subscriber> {
        router
            .subscriber(
                SubscriberOptions::new(subject),
                handler_fn(|_msg: Message, _ctx: ContextRepo| async { Result::Ok(()) }),
            )
            .unwrap()
    }

    #[test]
    fn test_nested_prefixes() {
        let mut a = Router::new().prefix("1.");
        let mut b = Router::new();
        let mut c = Router::new().prefix("5.");

        let in_b = declare(&mut b, "b");
        let in_c = declare(&mut c, "c");

        b.include_router_with(&c, IncludeOptions::new().prefix("4."));
        a.include_router(&b);

        assert_eq!(in_b.outer_config().unwrap().prefix, "1.");
        assert_eq!(in_c.outer_config().unwrap().prefix, "1.4.5.");
        assert_eq!(in_c.subject(), "1.4.5.c");
        assert_eq!(a.subscribers().len(), 2);
    }

    #[test]
    fn test_add_middleware_applies_to_later_declarations() {
        let mut router = Router::new().middleware(Arc::new(Named("1")));
        let early = declare(&mut router, "early");
        router.add_middleware(Arc::new(Named("2")));
        let late = declare(&mut router, "late");

        let names = |sub: &crate::Subscriber| -> Vec<String> {
            sub.outer_config()
                .unwrap()
                .middlewares
                .iter()
                .map(|m| m.name().to_string())
                .collect()
        };
        assert_eq!(names(&early), ["1"]);
        assert_eq!(names(&late), ["1", "2"]);
    }

    #[test]
    fn test_including_twice_does_not_duplicate() {
        let mut parent = Router::new();
        let mut child = Router::new();
        declare(&mut child, "orders");

        parent.include_router(&child);
        parent.include_router(&child);

        assert_eq!(parent.subscribers().len(), 1);
    }

    #[test]
    fn test_unattached_router_state_fails_fast() {
        let router = Router::new();
        let err = router.state().logger().unwrap_err();
        assert!(err.is_incorrect_state());
        assert!(router.state().di().is_err());
    }
}
