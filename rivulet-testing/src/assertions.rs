// Test assertions for published messages and middleware ordering

use crate::recorder::CallLog;
use rivulet_core::{MemoryTransport, Message};
use serde::de::DeserializeOwned;

/// Assert that exactly `expected` messages were published to `subject`,
/// returning them.
pub fn assert_published(transport: &MemoryTransport, subject: &str, expected: usize) -> Vec<Message> {
    let messages = transport.published_to(subject);
    assert_eq!(
        messages.len(),
        expected,
        "Expected {} message(s) on '{}', got {}. Published subjects: {:?}",
        expected,
        subject,
        messages.len(),
        transport
            .published()
            .iter()
            .map(|m| m.subject.clone())
            .collect::<Vec<_>>()
    );
    messages
}

/// Assert that the last message on `subject` carries `expected` as JSON.
pub fn assert_published_json<T>(transport: &MemoryTransport, subject: &str, expected: &T)
where
    T: DeserializeOwned + PartialEq + std::fmt::Debug,
{
    let messages = transport.published_to(subject);
    let last = messages
        .last()
        .unwrap_or_else(|| panic!("Nothing was published to '{}'", subject));
    let actual: T = last
        .parse_json()
        .unwrap_or_else(|e| panic!("Payload on '{}' is not the expected JSON: {}", subject, e));
    assert_eq!(actual, *expected, "JSON payloads on '{}' do not match", subject);
}

/// Assert the order in which middlewares ran for one direction
/// (`"consume"` or `"publish"`).
pub fn assert_middleware_order(log: &CallLog, direction: &str, expected: &[&str]) {
    let actual = log.labels_for(direction);
    assert_eq!(
        actual, expected,
        "Unexpected {} middleware order (full log: {:?})",
        direction,
        log.entries()
    );
}

/// Assert that `message_id` was acknowledged.
pub fn assert_acked(transport: &MemoryTransport, message_id: &str) {
    let acked = transport.acked();
    assert!(
        acked.iter().any(|id| id == message_id),
        "Expected message {} to be acked. Acked: {:?}",
        message_id,
        acked
    );
}

/// Assert that `message_id` was rejected.
pub fn assert_nacked(transport: &MemoryTransport, message_id: &str) {
    let nacked = transport.nacked();
    assert!(
        nacked.iter().any(|id| id == message_id),
        "Expected message {} to be nacked. Nacked: {:?}",
        message_id,
        nacked
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_published_returns_messages() {
        let transport = MemoryTransport::new();
        transport.inject(Message::new("orders", "a"));
        transport.inject(Message::new("payments", "b"));

        let messages = assert_published(&transport, "orders", 1);
        assert_eq!(messages[0].payload, b"a");
    }

    #[test]
    #[should_panic(expected = "Expected 2 message(s) on 'orders'")]
    fn test_assert_published_count_mismatch() {
        let transport = MemoryTransport::new();
        transport.inject(Message::new("orders", "a"));
        assert_published(&transport, "orders", 2);
    }

    #[test]
    fn test_assert_published_json() {
        let transport = MemoryTransport::new();
        transport.inject(Message::json("orders", &serde_json::json!({"id": 7})).unwrap());
        assert_published_json(&transport, "orders", &serde_json::json!({"id": 7}));
    }

    #[test]
    #[should_panic(expected = "Unexpected consume middleware order")]
    fn test_middleware_order_mismatch() {
        let log = CallLog::new();
        log.push("b:consume");
        log.push("a:consume");
        assert_middleware_order(&log, "consume", &["a", "b"]);
    }
}
