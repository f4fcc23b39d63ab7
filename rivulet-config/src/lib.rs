// Settings management for Rivulet brokers
// Files (JSON, TOML, .env) and RIVULET_* environment variables

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::{DEFAULT_ENV_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{BrokerSettings, SettingsLoader};
pub use validation::{ConfigValidator, Validate};
