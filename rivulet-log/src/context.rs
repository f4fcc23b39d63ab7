//! Key/value context attached to broker log events.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Ordered key/value pairs describing where a log event came from.
///
/// Keys are kept sorted so rendered output is stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LogContext(BTreeMap<String, String>);

impl LogContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pair, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a pair.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Copy of this context without `key`.
    pub fn without(&self, key: &str) -> Self {
        let mut copy = self.clone();
        copy.remove(key);
        copy
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LogContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_key_ordered() {
        let ctx = LogContext::new()
            .with("subject", "orders")
            .with("message_id", "42");
        assert_eq!(ctx.to_string(), "message_id=42 subject=orders");
    }

    #[test]
    fn test_without_leaves_original() {
        let ctx = LogContext::new()
            .with("subject", "orders")
            .with("message_id", "");
        let stripped = ctx.without("message_id");

        assert!(!stripped.contains_key("message_id"));
        assert!(ctx.contains_key("message_id"));
        assert_eq!(stripped.len(), 1);
    }

    #[test]
    fn test_serializes_as_map() {
        let ctx: LogContext = [("subject", "a.b")].into_iter().collect();
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json, serde_json::json!({"subject": "a.b"}));
    }
}
