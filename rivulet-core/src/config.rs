//! Config composition.
//!
//! Every hierarchy node and every registered endpoint carries a
//! [`ConfigNode`]. Including a router merges the includer's node with an
//! override delta and then re-merges the result onto each endpoint of the
//! included subtree. [`ConfigNode::merge`] is a fixed rule table, applied
//! field by field:
//!
//! | field | rule |
//! |---|---|
//! | `prefix` | outer + delta |
//! | `include_in_schema` | hidden if either side is hidden, visible otherwise |
//! | `middlewares`, `dependencies` | outer ++ delta |
//! | `parser`, `decoder` | outer's if set, else delta's |
//! | `extra_context` | key union, outer wins on collision |
//! | `graceful_timeout` | outer's, even when unset |
//! | `producer`, `state` | outer's, shared |

use crate::handler::{DecoderFn, Dependency, ParserFn};
use crate::middleware::BrokerMiddleware;
use crate::pointer::Pointer;
use crate::producer::ProducerContainer;
use crate::state::BrokerState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Tri-state schema visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Unset,
    Visible,
    Hidden,
}

impl Visibility {
    /// Resolve the flag of a node; unset counts as visible.
    pub fn is_visible(self) -> bool {
        self != Visibility::Hidden
    }

    /// Combine an outer flag with an inner one.
    pub fn merge(self, delta: Visibility) -> Visibility {
        if self == Visibility::Hidden || delta == Visibility::Hidden {
            Visibility::Hidden
        } else {
            Visibility::Visible
        }
    }
}

impl From<bool> for Visibility {
    fn from(visible: bool) -> Self {
        if visible {
            Visibility::Visible
        } else {
            Visibility::Hidden
        }
    }
}

impl From<Option<bool>> for Visibility {
    fn from(visible: Option<bool>) -> Self {
        visible.map(Visibility::from).unwrap_or_default()
    }
}

/// Configuration carried by a hierarchy node or a registered endpoint.
///
/// Cloning shares the producer container and the state pointer.
#[derive(Clone, Default)]
pub struct ConfigNode {
    pub prefix: String,
    pub include_in_schema: Visibility,
    pub middlewares: Vec<Arc<dyn BrokerMiddleware>>,
    pub dependencies: Vec<Arc<dyn Dependency>>,
    pub parser: Option<ParserFn>,
    pub decoder: Option<DecoderFn>,
    pub graceful_timeout: Option<Duration>,
    pub extra_context: BTreeMap<String, Value>,
    pub producer: Arc<ProducerContainer>,
    pub state: Pointer<BrokerState>,
}

impl ConfigNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node holding only the given shared references.
    pub fn with_shared(producer: Arc<ProducerContainer>, state: Pointer<BrokerState>) -> Self {
        Self {
            producer,
            state,
            ..Self::default()
        }
    }

    /// Compose `self` (outer) with `delta` (inner) into a new node.
    pub fn merge(&self, delta: &ConfigNode) -> ConfigNode {
        let mut extra_context = delta.extra_context.clone();
        extra_context.extend(
            self.extra_context
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        ConfigNode {
            prefix: format!("{}{}", self.prefix, delta.prefix),
            include_in_schema: self.include_in_schema.merge(delta.include_in_schema),
            middlewares: self
                .middlewares
                .iter()
                .chain(&delta.middlewares)
                .cloned()
                .collect(),
            dependencies: self
                .dependencies
                .iter()
                .chain(&delta.dependencies)
                .cloned()
                .collect(),
            parser: self.parser.clone().or_else(|| delta.parser.clone()),
            decoder: self.decoder.clone().or_else(|| delta.decoder.clone()),
            graceful_timeout: self.graceful_timeout,
            extra_context,
            producer: Arc::clone(&self.producer),
            state: self.state.clone(),
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn include_in_schema(mut self, visibility: impl Into<Visibility>) -> Self {
        self.include_in_schema = visibility.into();
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn BrokerMiddleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn middlewares(
        mut self,
        middlewares: impl IntoIterator<Item = Arc<dyn BrokerMiddleware>>,
    ) -> Self {
        self.middlewares.extend(middlewares);
        self
    }

    pub fn dependency(mut self, dependency: Arc<dyn Dependency>) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn dependencies(
        mut self,
        dependencies: impl IntoIterator<Item = Arc<dyn Dependency>>,
    ) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn parser(mut self, parser: ParserFn) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn decoder(mut self, decoder: DecoderFn) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn graceful_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_timeout = Some(timeout);
        self
    }

    pub fn extra_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_context.insert(key.into(), value.into());
        self
    }

    /// Append a middleware in place; it runs innermost of the current list.
    pub fn add_middleware(&mut self, middleware: Arc<dyn BrokerMiddleware>) {
        self.middlewares.push(middleware);
    }
}

impl fmt::Debug for ConfigNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigNode")
            .field("prefix", &self.prefix)
            .field("include_in_schema", &self.include_in_schema)
            .field(
                "middlewares",
                &self.middlewares.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field(
                "dependencies",
                &self.dependencies.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .field("parser", &self.parser.is_some())
            .field("decoder", &self.decoder.is_some())
            .field("graceful_timeout", &self.graceful_timeout)
            .field("extra_context", &self.extra_context)
            .field("producer", &self.producer)
            .finish()
    }
}
