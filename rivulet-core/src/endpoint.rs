//! Endpoint capabilities shared by subscribers and publishers.
//!
//! Registration, schema description and lifecycle are separate traits so a
//! concrete endpoint composes only what it supports.

use crate::config::ConfigNode;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;

/// Lifecycle of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    /// Built, no config assigned.
    Declared,
    /// Holds a merged config.
    Registered,
    Started,
    Closed,
}

/// Receives merged configuration at mount time.
pub trait Registrable: Send + Sync {
    /// Assign `outer`, or merge it onto the config already assigned.
    fn register(&self, outer: &ConfigNode);

    /// The merged config, if registered.
    fn outer_config(&self) -> Option<ConfigNode>;

    fn is_registered(&self) -> bool {
        self.outer_config().is_some()
    }

    fn lifecycle(&self) -> EndpointState;
}

/// Schema reader view of an endpoint.
pub trait Describable {
    /// `None` when the endpoint is hidden from schemas or not registered.
    fn describe(&self) -> Option<EndpointSpec>;
}

/// Start/stop control driven by the broker.
#[async_trait]
pub trait Runnable: Send + Sync {
    async fn start(&self) -> Result<()>;

    /// Stop, bounded by the endpoint's graceful timeout.
    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Subscriber,
    Publisher,
}

/// Serializable description of a visible endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSpec {
    pub kind: EndpointKind,
    pub name: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Config slot and lifecycle flag embedded by concrete endpoints.
#[derive(Debug)]
pub(crate) struct EndpointCore {
    config: RwLock<Option<ConfigNode>>,
    state: RwLock<EndpointState>,
}

impl EndpointCore {
    pub(crate) fn new() -> Self {
        Self {
            config: RwLock::new(None),
            state: RwLock::new(EndpointState::Declared),
        }
    }

    pub(crate) fn register(&self, outer: &ConfigNode) {
        let mut config = self.config.write();
        *config = Some(match config.as_ref() {
            Some(current) => outer.merge(current),
            None => outer.clone(),
        });

        let mut state = self.state.write();
        if *state == EndpointState::Declared {
            *state = EndpointState::Registered;
        }
    }

    pub(crate) fn config(&self) -> Option<ConfigNode> {
        self.config.read().clone()
    }

    pub(crate) fn state(&self) -> EndpointState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: EndpointState) {
        *self.state.write() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_merges_onto_existing_config() {
        let core = EndpointCore::new();
        assert_eq!(core.state(), EndpointState::Declared);
        assert!(core.config().is_none());

        core.register(&ConfigNode::new().prefix("5."));
        core.register(&ConfigNode::new().prefix("4."));
        core.register(&ConfigNode::new().prefix("1."));

        assert_eq!(core.config().unwrap().prefix, "1.4.5.");
        assert_eq!(core.state(), EndpointState::Registered);
    }

    #[test]
    fn test_register_keeps_started_state() {
        let core = EndpointCore::new();
        core.register(&ConfigNode::new());
        core.set_state(EndpointState::Started);
        core.register(&ConfigNode::new());
        assert_eq!(core.state(), EndpointState::Started);
    }
}
