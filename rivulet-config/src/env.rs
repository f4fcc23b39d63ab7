// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::BTreeMap;
use std::env;

/// Default prefix of Rivulet environment variables.
pub const DEFAULT_ENV_PREFIX: &str = "RIVULET";

/// Collects prefixed environment variables as lowercase setting keys.
///
/// With the `RIVULET` prefix, `RIVULET_GRACEFUL_TIMEOUT_MS` becomes
/// `graceful_timeout_ms`. Variables without the prefix are ignored.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Load from the process environment.
    pub fn load(&self) -> BTreeMap<String, String> {
        self.load_from(env::vars())
    }

    /// Load from an explicit set of variables.
    pub fn load_from<I, K, V>(&self, vars: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        vars.into_iter()
            .filter_map(|(key, value)| {
                self.strip(key.as_ref())
                    .map(|field| (field, value.into()))
            })
            .collect()
    }

    /// Setting key for a variable name, if it carries the prefix.
    pub fn strip(&self, key: &str) -> Option<String> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix('_')?;
        (!rest.is_empty()).then(|| rest.to_lowercase())
    }

    /// Read one prefixed variable from the process environment.
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(self.var_name(key)).map_err(ConfigError::Env)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }

    /// Full variable name for a setting key.
    pub fn var_name(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key.to_uppercase())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(DEFAULT_ENV_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // std::env::set_var is unsafe in edition 2024, so these tests feed
    // variables through load_from instead of mutating the process.

    #[test]
    fn test_load_from_strips_prefix() {
        let loader = EnvLoader::default();
        let vars = loader.load_from([
            ("RIVULET_PREFIX", "shop."),
            ("RIVULET_GRACEFUL_TIMEOUT_MS", "250"),
            ("RIVULETX_IGNORED", "1"),
            ("RIVULET_", "empty"),
            ("PATH", "/usr/bin"),
        ]);

        assert_eq!(vars.len(), 2);
        assert_eq!(vars["prefix"], "shop.");
        assert_eq!(vars["graceful_timeout_ms"], "250");
    }

    #[test]
    fn test_custom_prefix() {
        let loader = EnvLoader::new("SHOP");
        assert_eq!(loader.var_name("url"), "SHOP_URL");
        assert_eq!(loader.strip("SHOP_URL").as_deref(), Some("url"));
        assert_eq!(loader.strip("RIVULET_URL"), None);
    }

    #[test]
    fn test_missing_var() {
        let loader = EnvLoader::new("RIVULET_TEST_MISSING");
        assert!(loader.load_var("NOPE_67890").is_err());
        assert_eq!(loader.load_var_or("NOPE_67890", "fallback"), "fallback");
    }
}
