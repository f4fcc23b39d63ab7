// Dependency injection collaborator

use crate::error::{BrokerError, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// Marker for types that can be stored in a [`Container`].
pub trait Provider: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Provider for T {}

/// Type-keyed provider registry.
#[derive(Clone, Default)]
pub struct Container {
    providers: Arc<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider instance, replacing any previous one of that type.
    pub fn register<T: Provider>(&self, instance: T) {
        self.register_arc(Arc::new(instance));
    }

    pub fn register_arc<T: Provider>(&self, instance: Arc<T>) {
        let type_name = std::any::type_name::<T>();
        self.providers.write().insert(TypeId::of::<T>(), instance);
        debug!(provider = type_name, "Provider registered");
    }

    /// Register a provider using a factory function
    pub fn register_factory<T: Provider, F>(&self, factory: F)
    where
        F: FnOnce() -> T,
    {
        self.register(factory());
    }

    /// Resolve a provider by type
    pub fn resolve<T: Provider>(&self) -> Result<Arc<T>> {
        let type_name = std::any::type_name::<T>();
        trace!(provider = type_name, "Resolving provider");

        self.providers
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|any| any.clone().downcast::<T>().ok())
            .ok_or_else(|| BrokerError::ProviderNotFound(type_name.to_string()))
    }

    pub fn has<T: Provider>(&self) -> bool {
        self.providers.read().contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.providers.write().clear();
    }
}

/// Key/value context shared by a broker.
///
/// Global values live behind a shared lock; a scope layers message-local
/// values on top without touching the globals.
#[derive(Clone, Default)]
pub struct ContextRepo {
    global: Arc<RwLock<HashMap<String, Value>>>,
    local: HashMap<String, Value>,
}

impl ContextRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a global value, visible to every scope.
    pub fn set_global(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.global.write().insert(key.into(), value.into());
    }

    pub fn remove_global(&self, key: &str) -> Option<Value> {
        self.global.write().remove(key)
    }

    /// Set a value in this scope only.
    pub fn set_local(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.local.insert(key.into(), value.into());
    }

    /// Look up `key`, local values first.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.local
            .get(key)
            .cloned()
            .or_else(|| self.global.read().get(key).cloned())
    }

    /// Look up `key` and deserialize it.
    pub fn resolve<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .get(key)
            .ok_or_else(|| BrokerError::ProviderNotFound(format!("context key `{}`", key)))?;
        serde_json::from_value(value).map_err(|e| BrokerError::Deserialization(e.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.local.contains_key(key) || self.global.read().contains_key(key)
    }

    /// A child scope sharing the globals, with `extras` layered over the
    /// current local values.
    pub fn scope(&self, extras: &BTreeMap<String, Value>) -> ContextRepo {
        let mut local = self.local.clone();
        for (key, value) in extras {
            local.insert(key.clone(), value.clone());
        }
        ContextRepo {
            global: Arc::clone(&self.global),
            local,
        }
    }
}

impl std::fmt::Debug for ContextRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRepo")
            .field("global", &self.global.read().len())
            .field("local", &self.local)
            .finish()
    }
}

/// DI state owned by a broker.
#[derive(Clone, Default)]
pub struct DiState {
    pub provider: Container,
    pub context: ContextRepo,
}

impl DiState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for DiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiState")
            .field("providers", &self.provider.len())
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Database {
        url: String,
    }

    #[test]
    fn test_container_register_and_resolve() {
        let container = Container::new();
        container.register(Database {
            url: "memory://".into(),
        });

        let db = container.resolve::<Database>().unwrap();
        assert_eq!(db.url, "memory://");
        assert!(container.has::<Database>());
    }

    #[test]
    fn test_container_missing_provider() {
        let container = Container::new();
        assert!(matches!(
            container.resolve::<Database>(),
            Err(BrokerError::ProviderNotFound(_))
        ));
    }

    #[test]
    fn test_scope_layers_over_globals() {
        let repo = ContextRepo::new();
        repo.set_global("region", "eu");
        repo.set_global("tenant", "acme");

        let mut extras = BTreeMap::new();
        extras.insert("tenant".to_string(), json!("globex"));
        let scoped = repo.scope(&extras);

        assert_eq!(scoped.get("tenant"), Some(json!("globex")));
        assert_eq!(scoped.get("region"), Some(json!("eu")));
        assert_eq!(repo.get("tenant"), Some(json!("acme")));

        repo.set_global("late", 1);
        assert_eq!(scoped.resolve::<u32>("late").unwrap(), 1);
    }
}
