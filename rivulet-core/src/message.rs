//! Message envelope passed between transports, middlewares and handlers.

use crate::error::{BrokerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// A message sent to or received from a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier
    pub id: String,
    /// Subject/topic/queue the message is addressed to
    pub subject: String,
    /// Raw payload
    pub payload: Vec<u8>,
    /// Message headers/properties
    pub headers: HashMap<String, String>,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Correlation ID for request-response patterns
    pub correlation_id: Option<String>,
    /// Reply-to address
    pub reply_to: Option<String>,
    /// Content type (e.g. "application/json")
    pub content_type: Option<String>,
    /// Transport delivery tag, set on consumed messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_tag: Option<u64>,
    /// Body produced by the subscriber's decoder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded: Option<serde_json::Value>,
}

impl Message {
    /// Create a new message with the given payload.
    pub fn new<T: Into<Vec<u8>>>(subject: impl Into<String>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject: subject.into(),
            payload: payload.into(),
            headers: HashMap::new(),
            timestamp: Utc::now(),
            correlation_id: None,
            reply_to: None,
            content_type: None,
            delivery_tag: None,
            decoded: None,
        }
    }

    /// Create a message from a JSON-serializable value.
    pub fn json<T: Serialize>(subject: impl Into<String>, value: &T) -> Result<Self> {
        let payload =
            serde_json::to_vec(value).map_err(|e| BrokerError::Serialization(e.to_string()))?;
        Ok(Self::new(subject, payload).with_content_type("application/json"))
    }

    /// Parse the payload as JSON.
    pub fn parse_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| BrokerError::Deserialization(e.to_string()))
    }

    /// Get the payload as a UTF-8 string.
    pub fn payload_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload).map_err(|e| BrokerError::Deserialization(e.to_string()))
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Whether the content type marks a JSON payload.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message {{ id: {}, subject: {}, size: {} bytes }}",
            self.id,
            self.subject,
            self.payload.len()
        )
    }
}
