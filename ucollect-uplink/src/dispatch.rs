//! Demultiplexes incoming `R` (plugin-routed data) frames by plugin name,
//! without this crate depending on `ucollect-plugin` directly — the
//! reactor implements this trait against its real plugin table, the same
//! layering `ucollect-plugin`'s own `PluginHost` trait uses to keep the
//! reactor out of lower-level crates.

use crate::manifest::PluginManifestEntry;

pub trait PluginDispatch {
    /// Deliver `data` to the named plugin's `uplink_data` callback.
    /// Returns `false` if no such plugin exists or it isn't currently
    /// active — the caller replies with an `E`/`P` error frame in that
    /// case.
    fn send_to_plugin(&mut self, name: &str, data: &[u8]) -> bool;

    /// Current manifest entries for every registered plugin, in a stable
    /// order (sent as the `V` frame).
    fn manifest(&self) -> Vec<PluginManifestEntry>;
}

#[cfg(test)]
pub(crate) struct RecordingDispatch {
    pub active: std::collections::HashSet<String>,
    pub received: Vec<(String, Vec<u8>)>,
}

#[cfg(test)]
impl PluginDispatch for RecordingDispatch {
    fn send_to_plugin(&mut self, name: &str, data: &[u8]) -> bool {
        if !self.active.contains(name) {
            return false;
        }
        self.received.push((name.to_string(), data.to_vec()));
        true
    }

    fn manifest(&self) -> Vec<PluginManifestEntry> {
        Vec::new()
    }
}
