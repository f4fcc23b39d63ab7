// Settings validation

use crate::{ConfigError, Result};

/// Types that can check their own values.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable validation rules.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::validation(field, "must not be empty"));
        }
        Ok(())
    }

    pub fn in_range<T: PartialOrd + std::fmt::Display>(
        value: T,
        min: T,
        max: T,
        field: &str,
    ) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::validation(
                field,
                format!("{} is outside {}..={}", value, min, max),
            ));
        }
        Ok(())
    }

    /// Subjects and prefixes travel verbatim to the transport.
    pub fn no_whitespace(value: &str, field: &str) -> Result<()> {
        if value.chars().any(char::is_whitespace) {
            return Err(ConfigError::validation(field, "must not contain whitespace"));
        }
        Ok(())
    }

    /// `scheme://rest` with a non-empty scheme and rest.
    pub fn is_url(value: &str, field: &str) -> Result<()> {
        let valid = match value.split_once("://") {
            Some((scheme, rest)) => {
                !rest.is_empty()
                    && scheme
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_ascii_alphabetic())
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
            }
            None => false,
        };
        if !valid {
            return Err(ConfigError::validation(field, "must be a `scheme://` URL"));
        }
        Ok(())
    }
}
