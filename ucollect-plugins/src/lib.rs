//! Built-in plugins that exercise the plugin-host contract end to end.
//! Ported from `src/plugins/count` and `src/plugins/badconf` in the
//! original source; everything beyond these two is out of scope (a real
//! deployment registers its own plugin crates the same way).

mod plugins {
    pub mod badconf;
    pub mod count;
}

pub use plugins::badconf::BadconfPlugin;
pub use plugins::count::CountPlugin;

use ucollect_plugin::PluginRegistry;

/// Register every built-in plugin under its canonical name.
pub fn register_builtin(registry: &mut PluginRegistry) {
    registry.register("Count", || Box::new(CountPlugin::new()));
    registry.register("Badconf", || Box::new(BadconfPlugin::new()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_plugins_are_registered_under_their_names() {
        let mut registry = PluginRegistry::new();
        register_builtin(&mut registry);
        assert!(registry.get("Count").is_some());
        assert!(registry.get("Badconf").is_some());
        assert_eq!(registry.len(), 2);
    }
}
