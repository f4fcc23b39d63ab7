//! Error types for broker, router and endpoint operations.

use thiserror::Error;

/// Boxed error produced by a transport collaborator.
pub type TransportSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while composing, connecting or running a broker.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Invalid endpoint option combination, detected before any connection.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Shared broker state used before it exists.
    #[error("Incorrect state: {0}")]
    IncorrectState(String),

    /// Error reported by the transport collaborator, passed through unchanged.
    #[error("Transport error: {0}")]
    Transport(#[source] TransportSource),

    /// A subscriber failed to start.
    #[error("Subscriber `{subscriber}` failed to start: {source}")]
    Startup {
        subscriber: String,
        #[source]
        source: Box<BrokerError>,
    },

    /// Producer or channel is closed.
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A message handler, dependency or middleware rejected a message.
    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// Wrap a transport collaborator's error.
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BrokerError::Transport(Box::new(error))
    }

    /// Wrap a subscriber start failure.
    pub fn startup(subscriber: impl Into<String>, source: BrokerError) -> Self {
        BrokerError::Startup {
            subscriber: subscriber.into(),
            source: Box::new(source),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, BrokerError::Configuration(_))
    }

    pub fn is_incorrect_state(&self) -> bool {
        matches!(self, BrokerError::IncorrectState(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, BrokerError::Transport(_))
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_transport_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = BrokerError::transport(io);

        assert!(err.is_transport());
        assert_eq!(err.to_string(), "Transport error: refused");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_startup_error_names_subscriber() {
        let err = BrokerError::startup("on_order", BrokerError::ChannelClosed("gone".into()));
        assert_eq!(
            err.to_string(),
            "Subscriber `on_order` failed to start: Channel closed: gone"
        );
    }
}
