//! Broker logger collaborator.
//!
//! A broker owns exactly one [`LoggerState`]. Its subscribers register their
//! log context with the [`ParamsStorage`] before the broker starts, which lets
//! the state pad context columns so log lines from different subscribers line
//! up.

use crate::{Level, LogContext};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Sink for broker log events.
pub trait BrokerLogger: Send + Sync {
    /// Emit one event. `message` is already rendered with its context prefix.
    fn log(&self, level: Level, message: &str, context: &LogContext);
}

/// Logger that forwards events to `tracing` under the `rivulet` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl BrokerLogger for TracingLogger {
    fn log(&self, level: Level, message: &str, context: &LogContext) {
        match level {
            Level::Trace => tracing::trace!(target: "rivulet", context = %context, "{}", message),
            Level::Debug => tracing::debug!(target: "rivulet", context = %context, "{}", message),
            Level::Info => tracing::info!(target: "rivulet", context = %context, "{}", message),
            Level::Warn => tracing::warn!(target: "rivulet", context = %context, "{}", message),
            Level::Error => tracing::error!(target: "rivulet", context = %context, "{}", message),
            Level::Off => {}
        }
    }
}

/// Logger that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl BrokerLogger for NullLogger {
    fn log(&self, _level: Level, _message: &str, _context: &LogContext) {}
}

/// Registry of subscriber log contexts.
///
/// Tracks the widest value seen per key so rendered contexts are aligned.
#[derive(Debug, Default)]
pub struct ParamsStorage {
    widths: RwLock<BTreeMap<String, usize>>,
    registered: AtomicUsize,
}

impl ParamsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscriber's context.
    pub fn register_subscriber(&self, context: &LogContext) {
        let mut widths = self.widths.write();
        for (key, value) in context.iter() {
            let width = widths.entry(key.to_string()).or_insert(0);
            *width = (*width).max(value.chars().count());
        }
        self.registered.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of contexts registered so far.
    pub fn registered_count(&self) -> usize {
        self.registered.load(Ordering::SeqCst)
    }

    /// Widest value registered under `key`.
    pub fn width(&self, key: &str) -> Option<usize> {
        self.widths.read().get(key).copied()
    }

    /// Render the values of `context` as padded columns joined by ` | `.
    ///
    /// Only keys that were registered are rendered, in key order.
    pub fn render(&self, context: &LogContext) -> String {
        let widths = self.widths.read();
        widths
            .iter()
            .map(|(key, width)| {
                let value = context.get(key).unwrap_or("");
                format!("{:<width$}", value, width = *width)
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Logger state shared by a broker and every endpoint mounted under it.
pub struct LoggerState {
    logger: Option<Arc<dyn BrokerLogger>>,
    level: Level,
    params: ParamsStorage,
    ready: AtomicBool,
}

impl LoggerState {
    /// Create a state emitting through `logger` at `level` and above.
    pub fn new(logger: Arc<dyn BrokerLogger>, level: Level) -> Self {
        Self {
            logger: Some(logger),
            level,
            params: ParamsStorage::new(),
            ready: AtomicBool::new(false),
        }
    }

    /// A state that never emits.
    pub fn disabled() -> Self {
        Self {
            logger: None,
            level: Level::Off,
            params: ParamsStorage::new(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        self.logger.is_some() && level != Level::Off && level >= self.level
    }

    pub fn params(&self) -> &ParamsStorage {
        &self.params
    }

    /// Mark setup complete. Returns `true` only for the first call.
    pub fn setup(&self) -> bool {
        !self.ready.swap(true, Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Log `message` with `context`, prefixed by the aligned context columns.
    pub fn log(&self, level: Level, message: &str, context: &LogContext) {
        if !self.is_enabled(level) {
            return;
        }
        let Some(logger) = &self.logger else {
            return;
        };

        let columns = self.params.render(context);
        if columns.trim().is_empty() {
            logger.log(level, message, context);
        } else {
            logger.log(level, &format!("{} - {}", columns, message), context);
        }
    }
}

impl Default for LoggerState {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogger), Level::Info)
    }
}

impl fmt::Debug for LoggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerState")
            .field("enabled", &self.logger.is_some())
            .field("level", &self.level)
            .field("registered", &self.params.registered_count())
            .field("ready", &self.is_ready())
            .finish()
    }
}
