// Error types for settings loading

use rivulet_core::BrokerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Load(String),

    #[error("Failed to parse settings: {0}")]
    Parse(String),

    #[error("Invalid setting `{field}`: {reason}")]
    Validation { field: String, reason: String },

    #[error("Settings do not match the expected shape: {0}")]
    Deserialization(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

impl ConfigError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for BrokerError {
    fn from(error: ConfigError) -> Self {
        BrokerError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
