// Recording collaborators for ordering and delivery assertions

use async_trait::async_trait;
use parking_lot::Mutex;
use rivulet_core::{
    BrokerError, BrokerMiddleware, ContextRepo, Level, LogContext, Message, MessageHandler, Next,
    Result,
};
use rivulet_log::BrokerLogger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Shared, append-only list of call labels.
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Entries ending with `:{suffix}`, with the suffix removed.
    pub fn labels_for(&self, suffix: &str) -> Vec<String> {
        let tail = format!(":{}", suffix);
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| entry.strip_suffix(&tail).map(str::to_string))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Middleware writing `name:consume` / `name:publish` before passing on.
pub struct RecordingMiddleware {
    name: String,
    log: CallLog,
}

impl RecordingMiddleware {
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
        }
    }

    pub fn shared(name: impl Into<String>, log: &CallLog) -> Arc<dyn BrokerMiddleware> {
        Arc::new(Self::new(name, log))
    }
}

#[async_trait]
impl BrokerMiddleware for RecordingMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_consume(&self, message: Message, next: Next) -> Result<()> {
        self.log.push(format!("{}:consume", self.name));
        next(message).await
    }

    async fn on_publish(&self, message: Message, next: Next) -> Result<()> {
        self.log.push(format!("{}:publish", self.name));
        next(message).await
    }
}

#[derive(Default)]
struct Received {
    messages: Mutex<Vec<Message>>,
    notify: Notify,
}

/// Handler keeping every message it receives.
///
/// Clones share the received list, so keep one clone for assertions and
/// hand the other to `subscriber()`.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    received: Arc<Received>,
    log: Option<CallLog>,
    failure: Option<String>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write `handler` into `log` on every call.
    pub fn with_log(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    /// Record, then reject every message with `reason`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    pub fn messages(&self) -> Vec<Message> {
        self.received.messages.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.received.messages.lock().len()
    }

    /// Wait until at least `count` messages arrived; `false` on timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.received.notify.notified();
            if self.count() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.count() >= count;
            }
        }
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: Message, _context: ContextRepo) -> Result<()> {
        if let Some(log) = &self.log {
            log.push("handler");
        }
        self.received.messages.lock().push(message);
        self.received.notify.notify_waiters();

        match &self.failure {
            Some(reason) => Err(BrokerError::Handler(reason.clone())),
            None => Ok(()),
        }
    }
}

/// One line written to a [`RecordingLogger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: Level,
    pub message: String,
    pub context: LogContext,
}

/// Broker logger that keeps every line in memory.
#[derive(Clone, Default)]
pub struct RecordingLogger {
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().clone()
    }

    /// Whether a line at `level` contains `fragment`.
    pub fn contains(&self, level: Level, fragment: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|line| line.level == level && line.message.contains(fragment))
    }
}

impl BrokerLogger for RecordingLogger {
    fn log(&self, level: Level, message: &str, context: &LogContext) {
        self.lines.lock().push(LogLine {
            level,
            message: message.to_string(),
            context: context.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_returns_after_delivery() {
        let handler = RecordingHandler::new();
        let sender = handler.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sender
                .handle(Message::new("orders", "x"), ContextRepo::default())
                .await
                .unwrap();
        });

        assert!(handler.wait_for(1, Duration::from_secs(2)).await);
        assert_eq!(handler.messages()[0].subject, "orders");
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let handler = RecordingHandler::new();
        assert!(!handler.wait_for(1, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_failing_handler_still_records() {
        let log = CallLog::new();
        let handler = RecordingHandler::new().with_log(&log).failing("boom");

        let err = handler
            .handle(Message::new("orders", "x"), ContextRepo::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::Handler(ref reason) if reason == "boom"));
        assert_eq!(handler.count(), 1);
        assert_eq!(log.entries(), ["handler"]);
    }

    #[test]
    fn test_labels_for_direction() {
        let log = CallLog::new();
        log.push("a:consume");
        log.push("b:publish");
        log.push("handler");
        log.push("c:consume");

        assert_eq!(log.labels_for("consume"), ["a", "c"]);
        assert_eq!(log.labels_for("publish"), ["b"]);
    }
}
