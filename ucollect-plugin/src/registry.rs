use std::collections::HashMap;

use crate::plugin::Plugin;

/// A plugin factory: constructs a fresh instance ready for
/// `PluginInstance::new`.
pub type PluginFactory = fn() -> Box<dyn Plugin>;

/// Built once at startup from the statically linked plugin set, immutable
/// thereafter. Stands in for the original's `dlopen`-by-path plugin
/// loading (see the pluglib resolver's own note on replacing dynamic
/// linking) — the configurator looks plugins up here by name instead of
/// loading a `.so` from a configured path.
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, factory: PluginFactory) {
        tracing::debug!(plugin = name, "registered plugin factory");
        self.factories.insert(name.to_string(), factory);
    }

    pub fn get(&self, name: &str) -> Option<PluginFactory> {
        self.factories.get(name).copied()
    }

    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
