//! Named session providers.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::provider::MemoryProvider;

/// Mapping from provider name to provider, filled once at startup.
///
/// Each name can be registered at most once.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<MemoryProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Arc<MemoryProvider>,
    ) -> Result<()> {
        let name = name.into();
        if self.providers.contains_key(&name) {
            return Err(Error::DuplicateProvider(name));
        }
        debug!(
            provider = %name,
            persistent = provider.is_persistent(),
            "Registered session provider"
        );
        self.providers.insert(name, provider);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<MemoryProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn provider() -> Arc<MemoryProvider> {
        Arc::new(MemoryProvider::in_memory(Duration::from_secs(60)).unwrap())
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ProviderRegistry::new();
        let memory = provider();
        registry.register("memory", Arc::clone(&memory)).unwrap();

        let found = registry.lookup("memory").unwrap();
        assert!(Arc::ptr_eq(&found, &memory));
        assert!(registry.lookup("redis").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ProviderRegistry::new();
        let first = provider();
        registry.register("memory", Arc::clone(&first)).unwrap();

        let err = registry.register("memory", provider()).unwrap_err();
        assert!(matches!(err, Error::DuplicateProvider(ref name) if name == "memory"));

        // First registration wins
        assert!(Arc::ptr_eq(&registry.lookup("memory").unwrap(), &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        registry.register("memory", provider()).unwrap();
        registry.register("file", provider()).unwrap();
        assert_eq!(registry.names(), vec!["file", "memory"]);
    }
}
