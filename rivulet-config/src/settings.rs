//! Typed broker settings and the layered loader producing them.
//!
//! Layers apply in order, later ones winning: settings file, `.env` file,
//! process environment. Nested tables (`extra_context`) merge key by key.

use crate::env::{DEFAULT_ENV_PREFIX, EnvLoader};
use crate::loader::{ConfigLoader, FileFormat};
use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, Result};
use rivulet_core::{BrokerOptions, Level};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};

const MAX_GRACEFUL_TIMEOUT_MS: u64 = 60 * 60 * 1000;
const CONTEXT_ENV_PREFIX: &str = "context_";

/// Broker settings as read from files and the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Transport address, handed to whoever builds the transport.
    pub url: Option<String>,
    pub prefix: String,
    pub include_in_schema: Option<bool>,
    pub graceful_timeout_ms: Option<u64>,
    pub description: Option<String>,
    pub log_level: String,
    pub extra_context: BTreeMap<String, Value>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: None,
            prefix: String::new(),
            include_in_schema: None,
            graceful_timeout_ms: None,
            description: None,
            log_level: "info".to_string(),
            extra_context: BTreeMap::new(),
        }
    }
}

impl BrokerSettings {
    /// Load with the default layers: `.env` in the working directory if
    /// present, then `RIVULET_*` variables.
    pub fn from_env() -> Result<Self> {
        SettingsLoader::new().dotenv_if_exists(".env").load()
    }

    pub fn graceful_timeout(&self) -> Option<Duration> {
        self.graceful_timeout_ms.map(Duration::from_millis)
    }

    pub fn level(&self) -> Result<Level> {
        Level::parse(&self.log_level).ok_or_else(|| {
            ConfigError::validation("log_level", format!("unknown level `{}`", self.log_level))
        })
    }

    /// Validate and convert into broker construction options.
    pub fn to_options(&self) -> Result<BrokerOptions> {
        self.validate()?;

        let mut options = BrokerOptions::new()
            .prefix(self.prefix.clone())
            .include_in_schema(self.include_in_schema)
            .log_level(self.level()?);
        if let Some(timeout) = self.graceful_timeout() {
            options = options.graceful_timeout(timeout);
        }
        if let Some(description) = &self.description {
            options = options.description(description.clone());
        }
        for (key, value) in &self.extra_context {
            options = options.extra_context(key.clone(), value.clone());
        }
        Ok(options)
    }
}

impl Validate for BrokerSettings {
    fn validate(&self) -> Result<()> {
        if let Some(url) = &self.url {
            ConfigValidator::is_url(url, "url")?;
        }
        ConfigValidator::no_whitespace(&self.prefix, "prefix")?;
        if let Some(timeout) = self.graceful_timeout_ms {
            ConfigValidator::in_range(timeout, 1, MAX_GRACEFUL_TIMEOUT_MS, "graceful_timeout_ms")?;
        }
        self.level()?;
        for key in self.extra_context.keys() {
            ConfigValidator::not_empty(key, "extra_context")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum EnvSource {
    Process,
    Fixed(Vec<(String, String)>),
    Disabled,
}

/// Builds [`BrokerSettings`] from layered sources.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    dotenv: Option<(PathBuf, bool)>,
    env: EnvSource,
    env_loader: EnvLoader,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self {
            file: None,
            dotenv: None,
            env: EnvSource::Process,
            env_loader: EnvLoader::new(DEFAULT_ENV_PREFIX),
        }
    }
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON, TOML or `.env` settings file, detected by name.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// `.env` file that must exist.
    pub fn dotenv(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotenv = Some((path.into(), true));
        self
    }

    /// `.env` file read only when present.
    pub fn dotenv_if_exists(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotenv = Some((path.into(), false));
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_loader = EnvLoader::new(prefix);
        self
    }

    /// Use these variables instead of the process environment.
    pub fn env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = EnvSource::Fixed(
            vars.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env = EnvSource::Disabled;
        self
    }

    pub fn load(&self) -> Result<BrokerSettings> {
        let mut merged = Map::new();

        if let Some(path) = &self.file {
            let loader = ConfigLoader::auto(path)?;
            let layer = loader.load_file(path)?;
            let layer = match (loader.format(), layer) {
                (FileFormat::Env, Value::Object(vars)) => self.env_layer(
                    vars.into_iter()
                        .filter_map(|(key, value)| value.as_str().map(|v| (key, v.to_string()))),
                )?,
                (_, Value::Object(map)) => map,
                _ => Map::new(),
            };
            debug!(path = %path.display(), keys = layer.len(), "Loaded settings file");
            deep_merge(&mut merged, layer);
        }

        if let Some((path, required)) = &self.dotenv {
            if let Some(vars) = read_dotenv(path, *required)? {
                deep_merge(&mut merged, self.env_layer(vars)?);
            }
        }

        let env_vars = match &self.env {
            EnvSource::Process => Some(std::env::vars().collect::<Vec<_>>()),
            EnvSource::Fixed(vars) => Some(vars.clone()),
            EnvSource::Disabled => None,
        };
        if let Some(vars) = env_vars {
            deep_merge(&mut merged, self.env_layer(vars)?);
        }

        let settings: BrokerSettings = serde_json::from_value(Value::Object(merged))
            .map_err(|e| ConfigError::Deserialization(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Shape prefixed variables like a settings file.
    fn env_layer<I>(&self, vars: I) -> Result<Map<String, Value>>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut layer = Map::new();
        for (field, raw) in self.env_loader.load_from(vars) {
            let value = match field.as_str() {
                "url" | "prefix" | "description" | "log_level" => Value::String(raw),
                "include_in_schema" => Value::Bool(parse_bool(&field, &raw)?),
                "graceful_timeout_ms" => Value::from(raw.trim().parse::<u64>().map_err(|_| {
                    ConfigError::validation(&field, format!("`{}` is not a number", raw))
                })?),
                _ => {
                    if let Some(key) = field.strip_prefix(CONTEXT_ENV_PREFIX) {
                        let context = layer
                            .entry("extra_context")
                            .or_insert_with(|| Value::Object(Map::new()));
                        if let Value::Object(context) = context {
                            context.insert(key.to_string(), Value::String(raw));
                        }
                    } else {
                        trace!(field = %field, "Ignoring unknown setting variable");
                    }
                    continue;
                }
            };
            layer.insert(field, value);
        }
        Ok(layer)
    }
}

fn read_dotenv(path: &Path, required: bool) -> Result<Option<Vec<(String, String)>>> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if !required && e.not_found() => return Ok(None),
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
    };

    let vars = iter
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), vars = vars.len(), "Loaded dotenv file");
    Ok(Some(vars))
}

fn parse_bool(field: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::validation(
            field,
            format!("`{}` is not a boolean", raw),
        )),
    }
}

fn deep_merge(base: &mut Map<String, Value>, layer: Map<String, Value>) {
    for (key, value) in layer {
        match value {
            Value::Object(incoming) if base.get(&key).is_some_and(Value::is_object) => {
                if let Some(Value::Object(existing)) = base.get_mut(&key) {
                    deep_merge(existing, incoming);
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}
