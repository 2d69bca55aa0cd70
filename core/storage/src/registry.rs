//! Backend registry for resolving storage backends from configuration.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use weavegate_common::{Error, Result};

use crate::backend::StorageBackend;
use crate::memory::MemoryBackend;

/// Factory function type for creating backends.
pub type BackendFactory = Box<dyn Fn(Value) -> Result<Arc<dyn StorageBackend>> + Send + Sync>;

/// Registry for storage backend factories.
///
/// Backends are resolved by name with a JSON configuration, which lets a
/// publisher be assembled entirely from a config file.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory.
    ///
    /// # Preconditions
    /// - `name` must be unique within the registry
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: BackendFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::Config(format!(
                "Backend '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a backend by name and configuration.
    ///
    /// # Errors
    /// - Backend not registered
    /// - Configuration invalid for the backend
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn StorageBackend>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::Config(format!("Backend '{}' is not registered", name)))?;
        factory(config)
    }

    /// Get list of registered backend names, sorted.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend is registered.
    pub fn has_backend(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn create_memory_backend(config: Value) -> Result<Arc<dyn StorageBackend>> {
    let kind = config
        .get("kind")
        .and_then(|v| v.as_str())
        .unwrap_or("arweave");
    let backend = match kind {
        "arweave" => MemoryBackend::permanent(),
        "ipfs" => MemoryBackend::pinned(),
        other => {
            return Err(Error::Config(format!(
                "Memory backend kind must be 'arweave' or 'ipfs', got '{}'",
                other
            )))
        }
    };
    Ok(Arc::new(backend))
}

/// Create a registry with the built-in backends.
///
/// - `memory`: in-process stand-in, `{"kind": "arweave" | "ipfs"}`
/// - `arweave`: permanent store via a bundler
/// - `ipfs`: pinned store via a Kubo RPC API
pub fn create_default_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();

    // Names are distinct, so these inserts cannot collide.
    registry
        .factories
        .insert("memory".to_string(), Box::new(create_memory_backend));
    registry.factories.insert(
        "arweave".to_string(),
        Box::new(crate::arweave::create_arweave_backend),
    );
    registry
        .factories
        .insert("ipfs".to_string(), Box::new(crate::ipfs::create_ipfs_backend));

    registry
}
