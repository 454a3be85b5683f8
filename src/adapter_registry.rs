use crate::adapter::AdapterFactory;
use dashmap::DashMap;
use tracing::debug;

/// Maps engine-type strings ("postgres", "sqlite", ...) to adapter
/// factories. Keys are normalized case-insensitively; registering the same
/// engine twice keeps the last factory.
#[derive(Default)]
pub struct AdapterRegistry {
    factories: DashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(engine: &str) -> String {
        engine.trim().to_ascii_lowercase()
    }

    pub fn register(&self, engine: &str, factory: AdapterFactory) {
        let key = Self::normalize(engine);
        if self.factories.insert(key.clone(), factory).is_some() {
            debug!("Adapter factory for '{}' replaced", key);
        } else {
            debug!("Adapter factory for '{}' registered", key);
        }
    }

    pub fn resolve(&self, engine: &str) -> Option<AdapterFactory> {
        self.factories
            .get(&Self::normalize(engine))
            .map(|entry| entry.value().clone())
    }

    pub fn engines(&self) -> Vec<String> {
        let mut engines: Vec<String> = self
            .factories
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        engines.sort();
        engines
    }
}
