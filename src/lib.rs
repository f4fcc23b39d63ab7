// Rivulet - a typed message-broker framework for Rust
//
// Brokers and routers form a hierarchy; configuration (prefixes, middlewares,
// dependencies, visibility, timeouts) composes down the hierarchy, and every
// endpoint shares the broker's connection lifecycle.

// Re-export core functionality
pub use rivulet_core::*;

// Logging setup and macros
pub use rivulet_log as log;

// Re-export optional crates
#[cfg(feature = "config")]
pub use rivulet_config;

#[cfg(feature = "testing")]
pub use rivulet_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        AckPolicy,
        Broker,
        BrokerError,
        BrokerMiddleware,
        BrokerOptions,
        ContextRepo,
        Describable,
        IncludeOptions,
        // In-process transport
        MemoryTransport,
        Message,
        MessageHandler,
        Next,
        Publisher,
        PublisherOptions,
        Registrable,
        Registrar,
        Result,
        Router,
        Runnable,
        Subscriber,
        SubscriberOptions,
        Transport,
        Visibility,
        handler_fn,
    };

    #[cfg(feature = "config")]
    pub use rivulet_config::{BrokerSettings, SettingsLoader};
}
