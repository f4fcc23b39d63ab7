// Core library for the Rivulet messaging framework
// Router composition, shared broker state and the connection lifecycle

pub mod broker;
pub mod config;
pub mod di;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod memory;
pub mod message;
pub mod middleware;
pub mod pointer;
pub mod producer;
pub mod publisher;
pub mod registry;
pub mod router;
pub mod state;
pub mod subscriber;
pub mod transport;

// Re-export commonly used types
pub use broker::*;
pub use config::*;
pub use di::*;
pub use endpoint::{
    Describable, EndpointKind, EndpointSpec, EndpointState, Registrable, Runnable,
};
pub use error::*;
pub use handler::*;
pub use memory::*;
pub use message::*;
pub use middleware::*;
pub use pointer::*;
pub use producer::*;
pub use publisher::*;
pub use registry::*;
pub use router::*;
pub use state::*;
pub use subscriber::*;
pub use transport::*;

pub use rivulet_log::{BrokerLogger, Level, LogContext, LoggerState};
