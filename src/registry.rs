//! # Property Registry
//!
//! Process-wide layered property registry and the change-handler seam.
//!
//! Lookups consult an ordered list of sources in fixed priority order:
//!
//! 1. explicit process-level overrides (backed by environment variables)
//! 2. the remote-managed source written by the synchronization engine
//! 3. the local source merged in at `init`
//!
//! The managed source may be read concurrently by unrelated readers while a
//! live update batch is being applied, so each layer carries its own lock at
//! a finer grain than the context lock that serializes the entry points.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Layered key/value registry exposed to downstream readers.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    overrides: RwLock<HashMap<String, String>>,
    managed: RwLock<HashMap<String, String>>,
    local: RwLock<HashMap<String, String>>,
}

impl PropertyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a key through the layered sources.
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.override_value(key) {
            return Some(value);
        }
        if let Some(value) = self.managed.read().expect("managed lock poisoned").get(key) {
            return Some(value.clone());
        }
        self.local
            .read()
            .expect("local lock poisoned")
            .get(key)
            .cloned()
    }

    /// Resolve a key against the process-level override store only.
    ///
    /// Explicit overrides win; otherwise the environment is consulted, first
    /// under the literal key and then under the conventional
    /// `SCREAMING_SNAKE` translation (`db.password` -> `DB_PASSWORD`).
    pub fn override_value(&self, key: &str) -> Option<String> {
        if let Some(value) = self
            .overrides
            .read()
            .expect("override lock poisoned")
            .get(key)
        {
            return Some(value.clone());
        }
        if let Ok(value) = std::env::var(key) {
            return Some(value);
        }
        let translated: String = key
            .chars()
            .map(|c| match c {
                '.' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        std::env::var(translated).ok()
    }

    /// Install an explicit process-level override.
    pub fn set_override(&self, key: &str, value: &str) {
        self.overrides
            .write()
            .expect("override lock poisoned")
            .insert(key.to_string(), value.to_string());
    }

    /// Write a key into the remote-managed source, returning the previously
    /// visible value (from any layer) for change logging.
    pub fn put_managed(&self, key: &str, value: &str) -> Option<String> {
        let previous = self.get(key);
        self.managed
            .write()
            .expect("managed lock poisoned")
            .insert(key.to_string(), value.to_string());
        previous
    }

    /// Write a key into the local source.
    pub fn put_local(&self, key: &str, value: &str) {
        self.local
            .write()
            .expect("local lock poisoned")
            .insert(key.to_string(), value.to_string());
    }

    /// Merge a whole map into the local source (`init`-time load).
    pub fn merge_local(&self, properties: &HashMap<String, String>) {
        let mut local = self.local.write().expect("local lock poisoned");
        for (key, value) in properties {
            local.insert(key.clone(), value.clone());
        }
    }

    /// Snapshot of the local source, the working set handed to the merge
    /// engine before remote properties are layered in.
    #[must_use]
    pub fn local_snapshot(&self) -> HashMap<String, String> {
        self.local.read().expect("local lock poisoned").clone()
    }
}

/// A change-handler notified after every applied update batch.
///
/// Handlers run after the store mutation; a failing handler is logged and
/// neither rolls back the mutation nor prevents sibling handlers from running.
pub trait ConfigChangeHandler: Send + Sync {
    /// Stable name used in dispatch logging.
    fn name(&self) -> &str;

    fn on_config_changed(&self, batch: &HashMap<String, String>) -> anyhow::Result<()>;
}

/// Discovery seam for change handlers.
///
/// The host process performs discovery once (however its wiring works) and the
/// context caches the returned set on the first delivered batch; subsequent
/// batches reuse the cached set in the same order.
pub trait HandlerProvider: Send + Sync {
    fn discover(&self) -> Vec<Arc<dyn ConfigChangeHandler>>;
}

/// Handler provider backed by a plain list handed over by the host.
#[derive(Default)]
pub struct StaticHandlerProvider {
    handlers: Vec<Arc<dyn ConfigChangeHandler>>,
}

impl StaticHandlerProvider {
    #[must_use]
    pub fn new(handlers: Vec<Arc<dyn ConfigChangeHandler>>) -> Self {
        Self { handlers }
    }
}

impl HandlerProvider for StaticHandlerProvider {
    fn discover(&self) -> Vec<Arc<dyn ConfigChangeHandler>> {
        self.handlers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_priority_override_beats_managed_beats_local() {
        let registry = PropertyRegistry::new();
        registry.put_local("db.host", "local-host");
        assert_eq!(registry.get("db.host").as_deref(), Some("local-host"));

        registry.put_managed("db.host", "remote-host");
        assert_eq!(registry.get("db.host").as_deref(), Some("remote-host"));

        registry.set_override("db.host", "forced-host");
        assert_eq!(registry.get("db.host").as_deref(), Some("forced-host"));
    }

    #[test]
    fn test_put_managed_reports_previous_value() {
        let registry = PropertyRegistry::new();
        registry.put_local("timeout", "30");
        assert_eq!(registry.put_managed("timeout", "60").as_deref(), Some("30"));
        assert_eq!(registry.put_managed("timeout", "90").as_deref(), Some("60"));
        assert_eq!(registry.put_managed("fresh", "1"), None);
    }

    #[test]
    fn test_env_var_fallback_uses_translated_key() {
        let registry = PropertyRegistry::new();
        // Set a uniquely named variable to avoid clashing with the host env.
        std::env::set_var("CFGCLIENT_TEST_VALUE", "from-env");
        assert_eq!(
            registry.override_value("cfgclient.test.value").as_deref(),
            Some("from-env")
        );
        std::env::remove_var("CFGCLIENT_TEST_VALUE");
    }

    #[test]
    fn test_local_snapshot_is_isolated_from_later_writes() {
        let registry = PropertyRegistry::new();
        registry.put_local("a", "1");
        let snapshot = registry.local_snapshot();
        registry.put_local("b", "2");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("a").map(String::as_str), Some("1"));
    }
}
