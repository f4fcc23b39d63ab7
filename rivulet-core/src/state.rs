//! Connection state shared by a broker and everything mounted under it.

use crate::di::DiState;
use crate::error::{BrokerError, Result};
use crate::transport::Channel;
use parking_lot::RwLock;
use rivulet_log::LoggerState;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle phase of a [`BrokerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No owning broker yet.
    Unattached,
    /// Owned by a broker that has not connected.
    AttachedUnconnected,
    /// The broker completed at least one handshake.
    Connected,
}

/// State reachable from every node through its `Pointer<BrokerState>`.
pub enum BrokerState {
    /// Placeholder held by nodes that are not mounted under a broker.
    Empty { error_msg: String },
    /// Real state installed by a broker.
    Attached(AttachedState),
}

pub struct AttachedState {
    di: DiState,
    logger: LoggerState,
    connected: AtomicBool,
    channel: RwLock<Option<Arc<dyn Channel>>>,
}

impl BrokerState {
    /// Placeholder whose every access fails with `error_msg`.
    pub fn empty(error_msg: impl Into<String>) -> Self {
        BrokerState::Empty {
            error_msg: error_msg.into(),
        }
    }

    pub fn attached(di: DiState, logger: LoggerState) -> Self {
        BrokerState::Attached(AttachedState {
            di,
            logger,
            connected: AtomicBool::new(false),
            channel: RwLock::new(None),
        })
    }

    fn live(&self) -> Result<&AttachedState> {
        match self {
            BrokerState::Attached(state) => Ok(state),
            BrokerState::Empty { error_msg } => Err(BrokerError::IncorrectState(error_msg.clone())),
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        match self {
            BrokerState::Empty { .. } => ConnectionPhase::Unattached,
            BrokerState::Attached(state) if state.connected.load(Ordering::SeqCst) => {
                ConnectionPhase::Connected
            }
            BrokerState::Attached(_) => ConnectionPhase::AttachedUnconnected,
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(self, BrokerState::Attached(_))
    }

    /// Whether a handshake ever succeeded. Never resets.
    pub fn is_connected(&self) -> bool {
        self.phase() == ConnectionPhase::Connected
    }

    pub fn di(&self) -> Result<&DiState> {
        Ok(&self.live()?.di)
    }

    pub fn logger(&self) -> Result<&LoggerState> {
        Ok(&self.live()?.logger)
    }

    /// Record a successful handshake and install its channel.
    pub fn mark_connected(&self, channel: Arc<dyn Channel>) -> Result<()> {
        let state = self.live()?;
        *state.channel.write() = Some(channel);
        state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Drop the channel of a closed connection.
    pub fn detach_channel(&self) {
        if let BrokerState::Attached(state) = self {
            state.channel.write().take();
        }
    }

    /// Channel of the current connection.
    pub fn channel(&self) -> Result<Arc<dyn Channel>> {
        self.live()?
            .channel
            .read()
            .clone()
            .ok_or_else(|| BrokerError::IncorrectState("broker is not connected".into()))
    }
}

impl Default for BrokerState {
    fn default() -> Self {
        BrokerState::empty("node is not attached to a broker")
    }
}

impl fmt::Debug for BrokerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerState::Empty { error_msg } => f
                .debug_struct("Empty")
                .field("error_msg", error_msg)
                .finish(),
            BrokerState::Attached(state) => f
                .debug_struct("Attached")
                .field("di", &state.di)
                .field("logger", &state.logger)
                .field("phase", &self.phase())
                .finish(),
        }
    }
}
